//! Lifecycle events emitted for every cache mutation, and their wire form.

use crate::status::{self, StatusLabel};
use chrono::{DateTime, Utc};
use cluster_client::{WorkloadId, WorkloadRecord};
use serde::{Deserialize, Serialize};

/// What happened to a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Add,
    Update,
    Delete,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Add => "add",
            EventAction::Update => "update",
            EventAction::Delete => "delete",
        }
    }
}

/// One pod mutation, with the status label of the post-mutation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub action: EventAction,
    pub id: WorkloadId,
    pub status: StatusLabel,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Build an event, resolving the label from `record`.
    pub fn new(action: EventAction, record: &WorkloadRecord) -> Self {
        Self {
            action,
            id: record.id.clone(),
            status: status::resolve(record),
            timestamp: Utc::now(),
        }
    }

    pub fn to_wire(&self, policy: ActionPolicy) -> WireEvent {
        let action = match (policy, self.action) {
            (ActionPolicy::LegacyUpdateAsAdd, EventAction::Update) => EventAction::Add,
            (_, action) => action,
        };
        WireEvent {
            action,
            name: self.id.name.clone(),
            namespace: self.id.namespace.clone(),
            status: self.status.to_string(),
        }
    }
}

/// How `update` events are labelled on the wire.
///
/// Older clients of this service received `add` for both creations and
/// updates; they can keep that behaviour with `LegacyUpdateAsAdd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionPolicy {
    #[default]
    Distinct,
    LegacyUpdateAsAdd,
}

/// Serialized event shape: `{"action","name","namespace","status"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    pub action: EventAction,
    pub name: String,
    pub namespace: String,
    pub status: String,
}
