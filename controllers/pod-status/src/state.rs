//! Shared handler state.

use crate::config::ServerConfig;
use crate::error::ServerError;
use cluster_client::{ClusterClientTrait, NamespaceScope};
use pod_watch::{WatchHub, WatchSession};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<WatchHub>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(hub: Arc<WatchHub>, config: ServerConfig) -> Self {
        Self {
            hub,
            config: Arc::new(config),
        }
    }

    pub fn client(&self) -> &Arc<dyn ClusterClientTrait> {
        &self.hub.context().client
    }

    /// The shared session for `scope`, once its cache is synced.
    pub async fn synced_session(
        &self,
        scope: &NamespaceScope,
    ) -> Result<Arc<WatchSession>, ServerError> {
        let session = self.hub.session(scope);
        session.wait_until_watching().await?;
        Ok(session)
    }
}
