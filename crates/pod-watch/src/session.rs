//! One running list+watch per namespace scope.

use crate::broadcaster::{EventBroadcaster, Subscription, SubscriptionId};
use crate::cache::{LabelledRecord, ResourceCache, SummarizedRecord};
use crate::config::WatchContext;
use crate::error::{SessionEnd, WatchError};
use crate::watcher::{ResourceWatcher, WatcherState};
use cluster_client::NamespaceScope;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

/// A watcher task together with the cache and broadcaster it feeds.
///
/// Dropping the last handle stops the watcher.
#[derive(Debug)]
pub struct WatchSession {
    scope: NamespaceScope,
    cache: Arc<RwLock<ResourceCache>>,
    broadcaster: Arc<EventBroadcaster>,
    state: watch::Receiver<WatcherState>,
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<(), WatchError>>>>,
    last_used: Mutex<Instant>,
}

impl WatchSession {
    /// Spawn a watcher for `scope`. Must be called inside a Tokio runtime.
    pub fn start(ctx: WatchContext, scope: NamespaceScope) -> Arc<Self> {
        let cache = Arc::new(RwLock::new(ResourceCache::new()));
        let broadcaster = Arc::new(EventBroadcaster::new(ctx.config.subscriber_capacity));
        let stop = CancellationToken::new();

        let (watcher, state) = ResourceWatcher::new(
            ctx,
            scope.clone(),
            Arc::clone(&cache),
            Arc::clone(&broadcaster),
            stop.clone(),
        );
        let span = info_span!("watch_session", scope = %scope);
        let task = tokio::spawn(watcher.run().instrument(span));
        info!("Started pod watch session for {}", scope);

        Arc::new(Self {
            scope,
            cache,
            broadcaster,
            state,
            stop,
            task: Mutex::new(Some(task)),
            last_used: Mutex::new(Instant::now()),
        })
    }

    pub fn scope(&self) -> &NamespaceScope {
        &self.scope
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// True once the watcher has stopped, failed, or its task is gone.
    pub fn is_ended(&self) -> bool {
        if self.broadcaster.is_closed() || self.state() == WatcherState::Stopped {
            return true;
        }
        self.task
            .lock()
            .as_ref()
            .is_none_or(|task| task.is_finished())
    }

    /// Wait until the cache is synced and events are flowing.
    pub async fn wait_until_watching(&self) -> Result<(), WatchError> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| matches!(s, WatcherState::Watching | WatcherState::Stopped))
            .await
            .map(|s| *s);
        match reached {
            Ok(WatcherState::Watching) => Ok(()),
            _ => Err(WatchError::SessionEnded(self.end_reason())),
        }
    }

    /// Mark the session as in use now.
    pub fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    /// Time since the session was last handed out or seen with subscribers.
    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    /// Attach a subscriber that receives every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        self.touch();
        self.broadcaster.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.broadcaster.unsubscribe(id);
    }

    /// The current cache contents plus a subscription starting exactly
    /// after them.
    ///
    /// The watcher publishes while holding the cache write lock, so taking
    /// both under the read lock leaves no gap and no duplicate.
    pub fn subscribe_with_snapshot(
        &self,
    ) -> Result<(Vec<LabelledRecord>, Subscription), WatchError> {
        let cache = self.cache.read();
        self.check_ready(&cache)?;
        self.touch();
        let subscription = self.broadcaster.subscribe();
        Ok((cache.labelled_snapshot(), subscription))
    }

    /// Like [`subscribe_with_snapshot`](Self::subscribe_with_snapshot), with
    /// the READY and RESTARTS figures alongside each label.
    pub fn subscribe_with_summaries(
        &self,
    ) -> Result<(Vec<SummarizedRecord>, Subscription), WatchError> {
        let cache = self.cache.read();
        self.check_ready(&cache)?;
        self.touch();
        let subscription = self.broadcaster.subscribe();
        Ok((cache.summarized_snapshot(), subscription))
    }

    /// Every cached record with its label resolved now, sorted by identity.
    pub fn current_snapshot(&self) -> Result<Vec<LabelledRecord>, WatchError> {
        let cache = self.cache.read();
        self.check_ready(&cache)?;
        Ok(cache.labelled_snapshot())
    }

    /// Every cached record with its summary, sorted by identity.
    pub fn current_summaries(&self) -> Result<Vec<SummarizedRecord>, WatchError> {
        let cache = self.cache.read();
        self.check_ready(&cache)?;
        Ok(cache.summarized_snapshot())
    }

    fn check_ready(&self, cache: &ResourceCache) -> Result<(), WatchError> {
        if let Some(end) = self.broadcaster.end_reason() {
            return Err(WatchError::SessionEnded(end));
        }
        if !cache.is_synced() {
            return Err(WatchError::NotSynced);
        }
        Ok(())
    }

    /// Request the watcher to stop. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Wait for the watcher task and return how it ended.
    ///
    /// The outcome is reported to the first caller only; later calls
    /// return `Ok(())`.
    pub async fn join(&self) -> Result<(), WatchError> {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Watcher task for {} did not complete: {}", self.scope, e);
                let err = WatchError::TaskFailed(e.to_string());
                self.broadcaster.close(err.to_session_end());
                Err(err)
            }
        }
    }

    fn end_reason(&self) -> SessionEnd {
        self.broadcaster.end_reason().unwrap_or(SessionEnd::Stopped)
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchConfig;
    use crate::event::EventAction;
    use cluster_client::{MockClusterClient, WatchNotification, WorkloadId, WorkloadRecord};
    use std::time::Duration;

    fn pod(name: &str, phase: &str) -> WorkloadRecord {
        WorkloadRecord::new(WorkloadId::new("default", name), phase)
    }

    fn ctx(mock: &MockClusterClient, sync_timeout: Duration) -> WatchContext {
        WatchContext::new(
            Arc::new(mock.clone()),
            WatchConfig::default().with_sync_timeout(sync_timeout),
        )
    }

    async fn next_event(sub: &mut Subscription) -> crate::event::Event {
        tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("event in time")
            .expect("session alive")
    }

    #[tokio::test]
    async fn test_snapshot_not_available_before_sync() {
        let mock = MockClusterClient::new();
        // no script: the watch never confirms sync
        let session = WatchSession::start(ctx(&mock, Duration::from_secs(5)), NamespaceScope::All);

        assert!(matches!(session.current_snapshot(), Err(WatchError::NotSynced)));
        assert!(matches!(
            session.subscribe_with_snapshot(),
            Err(WatchError::NotSynced)
        ));

        session.stop();
        session.join().await.unwrap();
        assert!(session.is_ended());
    }

    #[tokio::test]
    async fn test_snapshot_then_events_without_gap() {
        let mock = MockClusterClient::new();
        mock.add_pod(pod("a", "Running"));
        let script = mock.script_watch();
        script.relist(vec![pod("a", "Running")]);

        let session = WatchSession::start(ctx(&mock, Duration::from_secs(2)), NamespaceScope::All);
        session.wait_until_watching().await.unwrap();

        let (snapshot, mut sub) = session.subscribe_with_snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1, "Running");

        script.send(WatchNotification::updated(pod("b", "Pending")));
        let ev = next_event(&mut sub).await;
        assert_eq!(ev.action, EventAction::Add);
        assert_eq!(ev.id.name, "b");

        let names: Vec<String> = session
            .current_snapshot()
            .unwrap()
            .into_iter()
            .map(|(record, _)| record.id.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        session.stop();
        session.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_ends_subscribers_and_snapshots() {
        let mock = MockClusterClient::new();
        let script = mock.script_watch();
        script.relist(Vec::new());

        let session = WatchSession::start(ctx(&mock, Duration::from_secs(2)), NamespaceScope::All);
        session.wait_until_watching().await.unwrap();
        let mut sub = session.subscribe();

        session.stop();
        session.join().await.unwrap();

        assert_eq!(sub.recv().await.unwrap_err(), SessionEnd::Stopped);
        assert!(matches!(
            session.current_snapshot(),
            Err(WatchError::SessionEnded(SessionEnd::Stopped))
        ));
        assert_eq!(session.state(), WatcherState::Stopped);
    }

    #[tokio::test]
    async fn test_sync_timeout_reported_to_waiters() {
        let mock = MockClusterClient::new();
        let session = WatchSession::start(
            ctx(&mock, Duration::from_millis(50)),
            NamespaceScope::Namespace("kube-system".into()),
        );

        let err = session.wait_until_watching().await.unwrap_err();
        assert!(matches!(err, WatchError::SessionEnded(SessionEnd::Failed(_))));
        assert!(matches!(session.join().await, Err(WatchError::SyncTimeout(_))));
        assert!(session.join().await.is_ok());
    }

    #[tokio::test]
    async fn test_summaries_carry_counts() {
        let mock = MockClusterClient::new();
        let script = mock.script_watch();
        script.relist(vec![pod("a", "Running")]);

        let session = WatchSession::start(ctx(&mock, Duration::from_secs(2)), NamespaceScope::All);
        session.wait_until_watching().await.unwrap();

        let (summaries, _sub) = session.subscribe_with_summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].1.status, "Running");
        assert_eq!(summaries[0].1.total, 0);
        assert_eq!(session.subscriber_count(), 1);
        assert_eq!(session.current_summaries().unwrap(), summaries);

        session.stop();
        session.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_resets_idle_clock() {
        let mock = MockClusterClient::new();
        let session = WatchSession::start(ctx(&mock, Duration::from_secs(5)), NamespaceScope::All);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(session.idle_for() >= Duration::from_millis(30));
        let _sub = session.subscribe();
        assert!(session.idle_for() < Duration::from_millis(30));

        session.stop();
        session.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribe_only_affects_one_subscriber() {
        let mock = MockClusterClient::new();
        let script = mock.script_watch();
        script.relist(Vec::new());

        let session = WatchSession::start(ctx(&mock, Duration::from_secs(2)), NamespaceScope::All);
        session.wait_until_watching().await.unwrap();
        let mut gone = session.subscribe();
        let mut kept = session.subscribe();

        session.unsubscribe(gone.id());
        script.send(WatchNotification::updated(pod("a", "Running")));

        assert_eq!(next_event(&mut kept).await.id.name, "a");
        assert_eq!(gone.recv().await.unwrap_err(), SessionEnd::Detached);

        session.stop();
        session.join().await.unwrap();
    }
}
