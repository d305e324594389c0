//! Shared sessions keyed by namespace scope.
//!
//! Every consumer of the same scope shares one watcher. A session that has
//! ended is replaced by a fresh one on the next request, and a session that
//! nobody holds or subscribes to is stopped once its idle timeout passes.

use crate::config::WatchContext;
use crate::session::WatchSession;
use cluster_client::NamespaceScope;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Smallest period between idle sweeps.
const MIN_REAP_PERIOD: Duration = Duration::from_millis(10);

/// Owner of every running [`WatchSession`], one per namespace scope.
#[derive(Debug)]
pub struct WatchHub {
    ctx: WatchContext,
    sessions: Mutex<HashMap<NamespaceScope, Arc<WatchSession>>>,
    closed: CancellationToken,
}

impl WatchHub {
    pub fn new(ctx: WatchContext) -> Self {
        Self {
            ctx,
            sessions: Mutex::new(HashMap::new()),
            closed: CancellationToken::new(),
        }
    }

    pub fn context(&self) -> &WatchContext {
        &self.ctx
    }

    /// The live session for `scope`, starting one if there is none.
    pub fn session(&self, scope: &NamespaceScope) -> Arc<WatchSession> {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get(scope) {
            if !session.is_ended() {
                session.touch();
                return Arc::clone(session);
            }
            debug!("Session for {} has ended, starting a new one", scope);
        }
        let session = WatchSession::start(self.ctx.clone(), scope.clone());
        sessions.insert(scope.clone(), Arc::clone(&session));
        session
    }

    /// Scopes with a session that is still running.
    pub fn active_scopes(&self) -> Vec<NamespaceScope> {
        self.sessions
            .lock()
            .iter()
            .filter(|(_, session)| !session.is_ended())
            .map(|(scope, _)| scope.clone())
            .collect()
    }

    /// Forget ended sessions and stop the ones nobody has held or
    /// subscribed to for longer than the idle timeout. Returns how many
    /// sessions were removed.
    pub fn reap_idle(&self) -> usize {
        let idle_timeout = self.ctx.config.idle_timeout;
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|scope, session| {
            if session.is_ended() {
                debug!("Dropping ended session for {}", scope);
                return false;
            }
            // the map itself holds one reference
            if Arc::strong_count(session) > 1 || session.subscriber_count() > 0 {
                session.touch();
                return true;
            }
            if session.idle_for() >= idle_timeout {
                info!("Stopping idle pod watch for {}", scope);
                session.stop();
                return false;
            }
            true
        });
        before - sessions.len()
    }

    /// Sweep idle sessions in the background until [`shutdown`](Self::shutdown).
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let hub = Arc::downgrade(self);
        let closed = self.closed.clone();
        let period = (self.ctx.config.idle_timeout / 2).max(MIN_REAP_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(hub) = hub.upgrade() else { break };
                        let reaped = hub.reap_idle();
                        if reaped > 0 {
                            debug!("Removed {} watch sessions", reaped);
                        }
                    }
                }
            }
        })
    }

    /// Stop every session and wait for the watchers to finish.
    pub async fn shutdown(&self) {
        self.closed.cancel();
        let sessions: Vec<Arc<WatchSession>> =
            self.sessions.lock().drain().map(|(_, s)| s).collect();
        info!("Stopping {} watch sessions", sessions.len());
        for session in &sessions {
            session.stop();
        }
        for session in sessions {
            if let Err(e) = session.join().await {
                warn!("Session for {} ended with error: {}", session.scope(), e);
            }
        }
    }
}
