//! List-then-watch driver.
//!
//! A [`ResourceWatcher`] moves through
//! `Initializing -> Syncing -> Synced -> Watching -> Stopped`. While
//! syncing it fills the cache silently from a full list and the opening
//! bracket of the watch stream; only once the cache is authoritative does
//! it start publishing events.

use crate::broadcaster::EventBroadcaster;
use crate::cache::ResourceCache;
use crate::config::WatchContext;
use crate::error::{SessionEnd, WatchError};
use crate::event::Event;
use cluster_client::{NamespaceScope, WatchNotification, WatchStream, WorkloadId};
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of one watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Initializing,
    Syncing,
    Synced,
    Watching,
    Stopped,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatcherState::Initializing => "initializing",
            WatcherState::Syncing => "syncing",
            WatcherState::Synced => "synced",
            WatcherState::Watching => "watching",
            WatcherState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Drives one list+watch session into a cache and a broadcaster.
#[derive(Debug)]
pub struct ResourceWatcher {
    ctx: WatchContext,
    scope: NamespaceScope,
    cache: Arc<RwLock<ResourceCache>>,
    broadcaster: Arc<EventBroadcaster>,
    state: watch::Sender<WatcherState>,
    stop: CancellationToken,
    /// Identities seen since the last `Resync`, while a re-list is open.
    relist: Option<HashSet<WorkloadId>>,
}

impl ResourceWatcher {
    /// Creates a watcher in `Initializing`. The returned receiver follows
    /// its state.
    pub fn new(
        ctx: WatchContext,
        scope: NamespaceScope,
        cache: Arc<RwLock<ResourceCache>>,
        broadcaster: Arc<EventBroadcaster>,
        stop: CancellationToken,
    ) -> (Self, watch::Receiver<WatcherState>) {
        let (state, state_rx) = watch::channel(WatcherState::Initializing);
        let watcher = Self {
            ctx,
            scope,
            cache,
            broadcaster,
            state,
            stop,
            relist: None,
        };
        (watcher, state_rx)
    }

    /// Run the whole lifecycle. Always ends in `Stopped` with the
    /// broadcaster closed; the error, if any, is returned once.
    pub async fn run(mut self) -> Result<(), WatchError> {
        let result = self.drive().await;
        let end = match &result {
            Ok(()) => {
                info!("Pod watch for {} stopped", self.scope);
                SessionEnd::Stopped
            }
            Err(e @ WatchError::InvariantViolation(_)) => {
                error!(
                    "Pod watch for {} aborted, control plane delivered a non-pod object: {}",
                    self.scope, e
                );
                e.to_session_end()
            }
            Err(e) => {
                error!("Pod watch for {} failed: {}", self.scope, e);
                e.to_session_end()
            }
        };
        self.broadcaster.close(end);
        self.set_state(WatcherState::Stopped);
        result
    }

    async fn drive(&mut self) -> Result<(), WatchError> {
        self.set_state(WatcherState::Syncing);
        let stop = self.stop.clone();
        let timeout = self.ctx.config.sync_timeout;

        let stream = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                info!("Stop requested before initial sync");
                return Ok(());
            }
            synced = tokio::time::timeout(timeout, self.sync()) => match synced {
                Ok(stream) => stream?,
                Err(_) => return Err(WatchError::SyncTimeout(timeout)),
            },
        };

        let count = {
            let mut cache = self.cache.write();
            cache.mark_synced();
            cache.len()
        };
        info!("Pod cache for {} synced with {} pods", self.scope, count);
        self.set_state(WatcherState::Synced);

        self.set_state(WatcherState::Watching);
        self.watch(stream).await
    }

    /// List, then consume the watch until its first `Synced` marker.
    async fn sync(&mut self) -> Result<WatchStream, WatchError> {
        let records = self
            .ctx
            .client
            .list_pods(&self.scope)
            .await
            .map_err(WatchError::Connectivity)?;
        info!("There are {} pods in {}", records.len(), self.scope);
        {
            let mut cache = self.cache.write();
            for record in records {
                cache.apply_add(record);
            }
        }

        let mut stream = self.ctx.client.watch_pods(&self.scope);
        loop {
            match stream.next().await {
                Some(Ok(WatchNotification::Synced)) => {
                    self.apply(WatchNotification::Synced, false);
                    return Ok(stream);
                }
                Some(Ok(notification)) => self.apply(notification, false),
                Some(Err(e)) => return Err(WatchError::from_stream(e)),
                None => {
                    return Err(WatchError::Stream(
                        "watch closed before initial sync".to_string(),
                    ));
                }
            }
        }
    }

    async fn watch(&mut self, mut stream: WatchStream) -> Result<(), WatchError> {
        let stop = self.stop.clone();
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    debug!("Stop requested, releasing pod watch");
                    return Ok(());
                }
                item = stream.next() => match item {
                    Some(Ok(notification)) => self.apply(notification, true),
                    Some(Err(e)) => return Err(WatchError::from_stream(e)),
                    None => {
                        warn!("Pod watch for {} closed by the control plane", self.scope);
                        return Err(WatchError::Stream("watch stream closed".to_string()));
                    }
                },
            }
        }
    }

    /// Apply one notification to the cache, publishing the resulting events
    /// while still holding the write lock so subscribers joining with a
    /// snapshot see neither gaps nor duplicates.
    fn apply(&mut self, notification: WatchNotification, publish: bool) {
        let mut cache = self.cache.write();
        let events: Vec<Event> = match notification {
            WatchNotification::Resync => {
                debug!("Re-list started for {}", self.scope);
                self.relist = Some(HashSet::new());
                Vec::new()
            }
            WatchNotification::Applied { kind, record } => {
                trace!("Pod {} applied ({:?})", record.id, kind);
                if let Some(seen) = self.relist.as_mut() {
                    seen.insert(record.id.clone());
                }
                cache.upsert(record).into_iter().collect()
            }
            WatchNotification::Deleted(record) => {
                if let Some(seen) = self.relist.as_mut() {
                    seen.remove(&record.id);
                }
                let event = cache.apply_delete(&record);
                if event.is_none() {
                    debug!("Ignoring delete for untracked pod {}", record.id);
                }
                event.into_iter().collect()
            }
            WatchNotification::Synced => match self.relist.take() {
                Some(seen) => {
                    let pruned = cache.retain(&seen);
                    debug!(
                        "Re-list done for {}: {} pods, {} pruned",
                        self.scope,
                        seen.len(),
                        pruned.len()
                    );
                    pruned
                }
                None => Vec::new(),
            },
        };

        if publish {
            for event in &events {
                trace!("Publishing {:?} {} -> {}", event.action, event.id, event.status);
                self.broadcaster.publish(event);
            }
        }
    }

    fn set_state(&self, state: WatcherState) {
        debug!("Pod watch for {} is {}", self.scope, state);
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchConfig;
    use crate::event::EventAction;
    use cluster_client::{ClusterError, MockClusterClient, WorkloadRecord};
    use std::time::Duration;

    struct Harness {
        mock: MockClusterClient,
        cache: Arc<RwLock<ResourceCache>>,
        broadcaster: Arc<EventBroadcaster>,
        stop: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                mock: MockClusterClient::new(),
                cache: Arc::new(RwLock::new(ResourceCache::new())),
                broadcaster: Arc::new(EventBroadcaster::new(16)),
                stop: CancellationToken::new(),
            }
        }

        fn watcher(&self, sync_timeout: Duration) -> (ResourceWatcher, watch::Receiver<WatcherState>) {
            let ctx = WatchContext::new(
                Arc::new(self.mock.clone()),
                WatchConfig::default().with_sync_timeout(sync_timeout),
            );
            ResourceWatcher::new(
                ctx,
                NamespaceScope::All,
                Arc::clone(&self.cache),
                Arc::clone(&self.broadcaster),
                self.stop.clone(),
            )
        }
    }

    fn pod(name: &str, phase: &str) -> WorkloadRecord {
        WorkloadRecord::new(WorkloadId::new("default", name), phase)
    }

    async fn wait_for(rx: &mut watch::Receiver<WatcherState>, state: WatcherState) {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
            .await
            .expect("state reached in time")
            .expect("watcher alive");
    }

    #[tokio::test]
    async fn test_initial_sync_is_silent() {
        let h = Harness::new();
        h.mock.add_pod(pod("a", "Running"));
        let script = h.mock.script_watch();
        script.relist(vec![pod("a", "Running"), pod("b", "Pending")]);

        let mut sub = h.broadcaster.subscribe();
        let (watcher, mut state) = h.watcher(Duration::from_secs(2));
        let task = tokio::spawn(watcher.run());

        wait_for(&mut state, WatcherState::Watching).await;
        assert!(h.cache.read().is_synced());
        assert_eq!(h.cache.read().len(), 2);
        assert!(sub.try_recv().unwrap().is_none());

        h.stop.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(sub.try_recv().unwrap_err(), SessionEnd::Stopped);
    }

    #[tokio::test]
    async fn test_add_update_delete_in_order() {
        let h = Harness::new();
        let script = h.mock.script_watch();
        script.relist(Vec::new());

        let mut sub = h.broadcaster.subscribe();
        let (watcher, mut state) = h.watcher(Duration::from_secs(2));
        let task = tokio::spawn(watcher.run());
        wait_for(&mut state, WatcherState::Watching).await;

        script.send(WatchNotification::updated(pod("a", "Pending")));
        script.send(WatchNotification::updated(pod("a", "Running")));
        script.send(WatchNotification::Deleted(pod("a", "Running")));

        let mut actions = Vec::new();
        for _ in 0..3 {
            let ev = tokio::time::timeout(Duration::from_secs(2), sub.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(ev.id, WorkloadId::new("default", "a"));
            actions.push(ev.action);
        }
        assert_eq!(actions, vec![EventAction::Add, EventAction::Update, EventAction::Delete]);
        assert!(h.cache.read().is_empty());

        h.stop.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_sync_timeout_emits_nothing() {
        let h = Harness::new();
        h.mock.add_pod(pod("a", "Running"));
        let script = h.mock.script_watch();
        // never confirms sync
        script.send(WatchNotification::Resync);

        let mut sub = h.broadcaster.subscribe();
        let (watcher, state) = h.watcher(Duration::from_millis(50));
        let result = watcher.run().await;

        assert!(matches!(result, Err(WatchError::SyncTimeout(_))));
        assert_eq!(*state.borrow(), WatcherState::Stopped);
        assert!(!h.cache.read().is_synced());
        match sub.try_recv() {
            Err(SessionEnd::Failed(reason)) => assert!(reason.contains("Initial sync")),
            other => panic!("expected failure end, got {:?}", other),
        }
        assert!(h.broadcaster.subscribe().try_recv().is_err());
    }

    #[tokio::test]
    async fn test_list_failure_is_connectivity_error() {
        let h = Harness::new();
        h.mock.fail_list("dial tcp: connection refused");

        let (watcher, _state) = h.watcher(Duration::from_secs(2));
        let result = watcher.run().await;

        assert!(matches!(result, Err(WatchError::Connectivity(_))));
        assert_eq!(h.mock.watch_calls(), 0);
    }

    #[tokio::test]
    async fn test_unexpected_object_is_invariant_violation() {
        let h = Harness::new();
        let script = h.mock.script_watch();
        script.relist(Vec::new());

        let mut sub = h.broadcaster.subscribe();
        let (watcher, mut state) = h.watcher(Duration::from_secs(2));
        let task = tokio::spawn(watcher.run());
        wait_for(&mut state, WatcherState::Watching).await;

        script.fail(ClusterError::UnexpectedObject("got v1/Service".to_string()));

        let result = task.await.unwrap();
        assert!(matches!(result, Err(WatchError::InvariantViolation(_))));
        assert!(matches!(sub.recv().await, Err(SessionEnd::Failed(_))));
    }

    #[tokio::test]
    async fn test_stream_end_fails_session() {
        let h = Harness::new();
        let script = h.mock.script_watch();
        script.relist(Vec::new());

        let (watcher, mut state) = h.watcher(Duration::from_secs(2));
        let task = tokio::spawn(watcher.run());
        wait_for(&mut state, WatcherState::Watching).await;
        drop(script);

        let result = task.await.unwrap();
        assert!(matches!(result, Err(WatchError::Stream(_))));
    }

    #[tokio::test]
    async fn test_resync_dedupes_and_prunes() {
        let h = Harness::new();
        let script = h.mock.script_watch();
        script.relist(vec![pod("a", "Running"), pod("b", "Running"), pod("c", "Pending")]);

        let mut sub = h.broadcaster.subscribe();
        let (watcher, mut state) = h.watcher(Duration::from_secs(2));
        let task = tokio::spawn(watcher.run());
        wait_for(&mut state, WatcherState::Watching).await;

        // reconnect: a unchanged, b gone, c changed, d new
        script.relist(vec![pod("a", "Running"), pod("c", "Running"), pod("d", "Pending")]);
        // marker event so the test knows the re-list has been processed
        script.send(WatchNotification::updated(pod("z", "Running")));

        let mut seen = Vec::new();
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(2), sub.recv())
                .await
                .unwrap()
                .unwrap();
            if ev.id.name == "z" {
                break;
            }
            seen.push((ev.id.name.clone(), ev.action));
        }
        assert_eq!(
            seen,
            vec![
                ("c".to_string(), EventAction::Update),
                ("d".to_string(), EventAction::Add),
                ("b".to_string(), EventAction::Delete),
            ]
        );

        h.stop.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pod_created_between_list_and_watch_is_not_published() {
        let h = Harness::new();
        h.mock.add_pod(pod("a", "Running"));
        let script = h.mock.script_watch();
        script.relist(vec![pod("a", "Running"), pod("late", "Pending")]);

        let mut sub = h.broadcaster.subscribe();
        let (watcher, mut state) = h.watcher(Duration::from_secs(2));
        let task = tokio::spawn(watcher.run());
        wait_for(&mut state, WatcherState::Watching).await;

        assert!(h.cache.read().contains(&WorkloadId::new("default", "late")));
        assert!(sub.try_recv().unwrap().is_none());

        h.stop.cancel();
        task.await.unwrap().unwrap();
    }
}
