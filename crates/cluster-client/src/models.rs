//! Pod state records and watch notifications.
//!
//! These types are the narrow projection of a Kubernetes `Pod` that the
//! status engine needs. They are produced by [`crate::convert`] and by the
//! mock client, and are never mutated in place once handed out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a pod: unique within a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadId {
    pub namespace: String,
    pub name: String,
}

impl WorkloadId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Last observed state of a single container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "state")]
pub enum ContainerState {
    Waiting {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Running,
    Terminated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        exit_code: i32,
        /// `None` and `Some(0)` both mean "not killed by a signal".
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<i32>,
    },
}

impl Default for ContainerState {
    fn default() -> Self {
        ContainerState::Waiting { reason: None }
    }
}

/// Status entry for one init or main container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
    pub restart_count: u32,
    pub state: ContainerState,
}

/// A pod condition, e.g. `Ready=True`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodCondition {
    pub condition_type: String,
    pub status: String,
}

impl PodCondition {
    pub fn new(condition_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: status.into(),
        }
    }

    /// True for the `Ready=True` condition.
    pub fn is_ready(&self) -> bool {
        self.condition_type == "Ready" && self.status == "True"
    }
}

/// Everything the status engine knows about one pod.
///
/// Replaced wholesale on every update; two records compare equal only if
/// every field matches, which is what resync deduplication relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRecord {
    pub id: WorkloadId,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub init_containers: Vec<ContainerStatus>,
    #[serde(default)]
    pub containers: Vec<ContainerStatus>,
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl WorkloadRecord {
    /// Bare record with only identity and phase set.
    pub fn new(id: WorkloadId, phase: impl Into<String>) -> Self {
        Self {
            id,
            phase: phase.into(),
            reason: None,
            init_containers: Vec::new(),
            containers: Vec::new(),
            conditions: Vec::new(),
            deletion_timestamp: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn namespace(&self) -> &str {
        &self.id.namespace
    }
}

/// Namespace filter for list and watch calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NamespaceScope {
    #[default]
    All,
    Namespace(String),
}

impl NamespaceScope {
    /// Empty or missing namespace means all namespaces.
    pub fn from_option(ns: Option<&str>) -> Self {
        match ns {
            Some(ns) if !ns.is_empty() => NamespaceScope::Namespace(ns.to_string()),
            _ => NamespaceScope::All,
        }
    }

    pub fn as_filter(&self) -> Option<&str> {
        match self {
            NamespaceScope::All => None,
            NamespaceScope::Namespace(ns) => Some(ns.as_str()),
        }
    }

    /// Whether a record belongs to this scope.
    pub fn contains(&self, id: &WorkloadId) -> bool {
        match self {
            NamespaceScope::All => true,
            NamespaceScope::Namespace(ns) => id.namespace == *ns,
        }
    }
}

impl fmt::Display for NamespaceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceScope::All => f.write_str("all namespaces"),
            NamespaceScope::Namespace(ns) => f.write_str(ns),
        }
    }
}

/// Kind hint carried by an applied object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Seen during a (re)list.
    Add,
    /// Seen on the live watch.
    Update,
}

/// One item of the watch stream.
///
/// The stream opens with `Resync`, lists every current object as
/// `Applied { kind: Add, .. }`, then emits `Synced`; after that it carries
/// live `Applied { kind: Update, .. }` and `Deleted` items. A reconnect that
/// needs a fresh list repeats the `Resync .. Synced` bracket.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchNotification {
    Applied {
        kind: NotificationKind,
        record: WorkloadRecord,
    },
    Deleted(WorkloadRecord),
    Resync,
    Synced,
}

impl WatchNotification {
    pub fn added(record: WorkloadRecord) -> Self {
        WatchNotification::Applied {
            kind: NotificationKind::Add,
            record,
        }
    }

    pub fn updated(record: WorkloadRecord) -> Self {
        WatchNotification::Applied {
            kind: NotificationKind::Update,
            record,
        }
    }
}
