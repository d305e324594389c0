//! Watch engine error types.

use cluster_client::ClusterError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a subscriber's event stream stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The session was stopped on request or its watch closed normally.
    Stopped,
    /// The subscriber was unsubscribed.
    Detached,
    /// The session failed; the message is the underlying error.
    Failed(String),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Stopped => f.write_str("session stopped"),
            SessionEnd::Detached => f.write_str("subscription detached"),
            SessionEnd::Failed(reason) => write!(f, "session failed: {}", reason),
        }
    }
}

/// Errors that can occur in a watch session.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The control plane could not be reached for the initial list
    #[error("Control plane unreachable: {0}")]
    Connectivity(#[source] ClusterError),

    /// The watch did not confirm its initial sync in time
    #[error("Initial sync did not complete within {0:?}")]
    SyncTimeout(Duration),

    /// The collaborator broke its contract (e.g. a non-pod object)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The watch stream failed after it was established
    #[error("Watch stream failed: {0}")]
    Stream(String),

    /// The cache is not yet authoritative
    #[error("Pod cache not yet synced")]
    NotSynced,

    /// The session has already ended
    #[error("{0}")]
    SessionEnded(SessionEnd),

    /// The watcher task panicked or was aborted
    #[error("Watcher task failed: {0}")]
    TaskFailed(String),
}

impl WatchError {
    /// Classify an error item read from the watch stream.
    pub(crate) fn from_stream(error: ClusterError) -> Self {
        match error {
            ClusterError::UnexpectedObject(detail) => WatchError::InvariantViolation(detail),
            other => WatchError::Stream(other.to_string()),
        }
    }

    /// The end signal subscribers see when a session fails with this error.
    pub(crate) fn to_session_end(&self) -> SessionEnd {
        match self {
            WatchError::SessionEnded(end) => end.clone(),
            other => SessionEnd::Failed(other.to_string()),
        }
    }
}
