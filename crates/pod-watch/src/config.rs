//! Session configuration and the context threaded through constructors.

use cluster_client::ClusterClientTrait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on the initial list+sync phase.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-subscriber queue capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Default grace period before a session nobody uses is stopped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Tunables for a watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub sync_timeout: Duration,
    pub subscriber_capacity: usize,
    /// How long a session may go without handles or subscribers before the
    /// hub stops it.
    pub idle_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// The control-plane handle plus configuration, shared by every session.
#[derive(Clone)]
pub struct WatchContext {
    pub client: Arc<dyn ClusterClientTrait>,
    pub config: WatchConfig,
}

impl WatchContext {
    pub fn new(client: Arc<dyn ClusterClientTrait>, config: WatchConfig) -> Self {
        Self { client, config }
    }
}

impl fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
