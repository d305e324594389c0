//! Event fan-out to subscribers.
//!
//! Each subscriber owns a bounded queue. Publishing never waits on a
//! subscriber: when a queue is full its oldest event is evicted and the
//! subscriber's dropped counter goes up. The broadcaster only keeps weak
//! references, so dropping a [`Subscription`] detaches it.

use crate::error::SessionEnd;
use crate::event::Event;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::debug;

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct SinkState {
    events: VecDeque<Event>,
    ended: Option<SessionEnd>,
}

#[derive(Debug)]
struct Sink {
    capacity: usize,
    state: Mutex<SinkState>,
    dropped: AtomicU64,
    notify: Notify,
}

impl Sink {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(SinkState::default()),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    fn push(&self, event: Event) {
        {
            let mut state = self.state.lock();
            if state.ended.is_some() {
                return;
            }
            if state.events.len() >= self.capacity {
                state.events.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            state.events.push_back(event);
        }
        self.notify.notify_one();
    }

    fn end(&self, end: SessionEnd) {
        {
            let mut state = self.state.lock();
            if state.ended.is_none() {
                state.ended = Some(end);
            }
        }
        self.notify.notify_one();
    }
}

/// Receiving side of one subscriber queue.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    sink: Arc<Sink>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Events evicted from this queue because the subscriber fell behind.
    pub fn dropped(&self) -> u64 {
        self.sink.dropped.load(Ordering::Relaxed)
    }

    /// Next queued event, if any, without waiting.
    ///
    /// Queued events are always drained before the end signal is reported.
    pub fn try_recv(&mut self) -> Result<Option<Event>, SessionEnd> {
        let mut state = self.sink.state.lock();
        if let Some(event) = state.events.pop_front() {
            return Ok(Some(event));
        }
        match &state.ended {
            Some(end) => Err(end.clone()),
            None => Ok(None),
        }
    }

    /// Wait for the next event, or for the session to end.
    pub async fn recv(&mut self) -> Result<Event, SessionEnd> {
        loop {
            if let Some(event) = self.try_recv()? {
                return Ok(event);
            }
            self.sink.notify.notified().await;
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    sinks: HashMap<SubscriptionId, Weak<Sink>>,
    next_id: u64,
    closed: Option<SessionEnd>,
}

/// Fan-out hub delivering every published event to all live subscribers.
#[derive(Debug)]
pub struct EventBroadcaster {
    capacity: usize,
    registry: Mutex<Registry>,
}

impl EventBroadcaster {
    /// `capacity` bounds each subscriber's queue (at least 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Register a new subscriber.
    ///
    /// After [`close`](Self::close) the subscription is born ended and
    /// reports the close reason immediately.
    pub fn subscribe(&self) -> Subscription {
        let sink = Arc::new(Sink::new(self.capacity));
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        match &registry.closed {
            Some(end) => sink.end(end.clone()),
            None => {
                registry.sinks.insert(id, Arc::downgrade(&sink));
                debug!("Subscriber {} attached ({} total)", id, registry.sinks.len());
            }
        }
        Subscription { id, sink }
    }

    /// Detach a subscriber. Unknown or already detached ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.registry.lock().sinks.remove(&id);
        if let Some(sink) = removed.and_then(|weak| weak.upgrade()) {
            sink.end(SessionEnd::Detached);
            debug!("Subscriber {} detached", id);
        }
    }

    /// Deliver an event to every live subscriber.
    pub fn publish(&self, event: &Event) {
        let mut registry = self.registry.lock();
        registry.sinks.retain(|id, weak| match weak.upgrade() {
            Some(sink) => {
                sink.push(event.clone());
                true
            }
            None => {
                debug!("Subscriber {} went away", id);
                false
            }
        });
    }

    /// End every subscription with `end` and refuse new ones. Idempotent;
    /// the first reason sticks.
    pub fn close(&self, end: SessionEnd) {
        let sinks = {
            let mut registry = self.registry.lock();
            if registry.closed.is_some() {
                return;
            }
            registry.closed = Some(end.clone());
            std::mem::take(&mut registry.sinks)
        };
        for sink in sinks.values().filter_map(Weak::upgrade) {
            sink.end(end.clone());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed.is_some()
    }

    pub fn end_reason(&self) -> Option<SessionEnd> {
        self.registry.lock().closed.clone()
    }

    /// Live subscribers. Subscriptions whose receiver was dropped are pruned
    /// here as well as on publish.
    pub fn subscriber_count(&self) -> usize {
        let mut registry = self.registry.lock();
        registry.sinks.retain(|_, weak| weak.strong_count() > 0);
        registry.sinks.len()
    }
}
