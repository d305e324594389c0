//! ClusterClient trait for mocking
//!
//! This trait abstracts the control-plane client so the watch engine can be
//! driven by the real kube-backed client or by a scripted mock in tests.

use crate::error::ClusterError;
use crate::models::{NamespaceScope, WatchNotification, WorkloadRecord};
use futures::stream::BoxStream;

/// Informer-style pod watch: `Resync`, listed objects, `Synced`, then deltas.
pub type WatchStream = BoxStream<'static, Result<WatchNotification, ClusterError>>;

/// Trait for Kubernetes control-plane operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    /// List every pod in scope.
    ///
    /// Transport failures surface as [`ClusterError::Connectivity`].
    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<WorkloadRecord>, ClusterError>;

    /// Open an indefinite watch on pods in scope.
    ///
    /// The stream runs until dropped. An `Err` item is terminal for the
    /// consumer; [`ClusterError::UnexpectedObject`] marks a broken contract.
    fn watch_pods(&self, scope: &NamespaceScope) -> WatchStream;

    /// Names of all namespaces in the cluster.
    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError>;

    /// Delete one pod by name.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}
