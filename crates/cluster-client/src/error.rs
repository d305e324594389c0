//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes control plane
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API error on a passthrough call
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The control plane could not be reached while listing
    #[error("Control plane unreachable: {0}")]
    Connectivity(String),

    /// The watch stream failed mid-flight
    #[error("Watch stream error: {0}")]
    Stream(String),

    /// The control plane delivered something that is not a pod
    #[error("Unexpected object on pod watch: {0}")]
    UnexpectedObject(String),
}
