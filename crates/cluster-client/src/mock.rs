//! Mock ClusterClient for unit testing
//!
//! This module provides a mock implementation of ClusterClientTrait that can be used
//! in unit tests without requiring a running Kubernetes API server.
//! List results are served from an in-memory pod store; watch streams are
//! scripted by the test through [`WatchScript`] handles.

use crate::cluster_trait::{ClusterClientTrait, WatchStream};
use crate::error::ClusterError;
use crate::models::{NamespaceScope, WatchNotification, WorkloadRecord};
use futures::channel::mpsc;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type ScriptedItem = Result<WatchNotification, ClusterError>;

/// Mock ClusterClient for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    pods: Arc<Mutex<Vec<WorkloadRecord>>>,
    namespaces: Arc<Mutex<Vec<String>>>,
    list_error: Arc<Mutex<Option<String>>>,
    watches: Arc<Mutex<VecDeque<mpsc::UnboundedReceiver<ScriptedItem>>>>,
    deleted: Arc<Mutex<Vec<(String, String)>>>,
    list_calls: Arc<AtomicUsize>,
    watch_calls: Arc<AtomicUsize>,
}

/// Feeds one scripted watch stream.
///
/// Dropping the script ends the stream, which the consumer sees as the
/// control plane closing the watch.
#[derive(Clone)]
pub struct WatchScript {
    tx: mpsc::UnboundedSender<ScriptedItem>,
}

impl WatchScript {
    /// Push a notification onto the stream
    pub fn send(&self, notification: WatchNotification) {
        let _ = self.tx.unbounded_send(Ok(notification));
    }

    /// Push a terminal error onto the stream
    pub fn fail(&self, error: ClusterError) {
        let _ = self.tx.unbounded_send(Err(error));
    }

    /// Send a full `Resync`, listed records, `Synced` bracket
    pub fn relist(&self, records: impl IntoIterator<Item = WorkloadRecord>) {
        self.send(WatchNotification::Resync);
        for record in records {
            self.send(WatchNotification::added(record));
        }
        self.send(WatchNotification::Synced);
    }
}

impl MockClusterClient {
    /// Create a new mock client with no pods
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pod to the mock store (for test setup)
    pub fn add_pod(&self, record: WorkloadRecord) {
        self.pods.lock().unwrap().push(record);
    }

    /// Set the namespaces returned by `list_namespaces`
    pub fn set_namespaces(&self, namespaces: Vec<String>) {
        *self.namespaces.lock().unwrap() = namespaces;
    }

    /// Make every following `list_pods` call fail with a connectivity error
    pub fn fail_list(&self, message: impl Into<String>) {
        *self.list_error.lock().unwrap() = Some(message.into());
    }

    /// Queue a scripted stream for the next `watch_pods` call.
    ///
    /// Calls with no queued script get a stream that never yields.
    pub fn script_watch(&self) -> WatchScript {
        let (tx, rx) = mpsc::unbounded();
        self.watches.lock().unwrap().push_back(rx);
        WatchScript { tx }
    }

    /// Pods removed through `delete_pod`, as (namespace, name)
    pub fn deleted_pods(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }

    /// Number of `list_pods` calls made so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `watch_pods` calls made so far
    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<WorkloadRecord>, ClusterError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.list_error.lock().unwrap().clone() {
            return Err(ClusterError::Connectivity(message));
        }
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|p| scope.contains(&p.id))
            .cloned()
            .collect())
    }

    fn watch_pods(&self, _scope: &NamespaceScope) -> WatchStream {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        match self.watches.lock().unwrap().pop_front() {
            Some(rx) => rx.boxed(),
            None => futures::stream::pending().boxed(),
        }
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
        Ok(self.namespaces.lock().unwrap().clone())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.pods
            .lock()
            .unwrap()
            .retain(|p| !(p.id.namespace == namespace && p.id.name == name));
        self.deleted
            .lock()
            .unwrap()
            .push((namespace.to_string(), name.to_string()));
        Ok(())
    }
}
