//! JSON shapes served to clients.

use cluster_client::WorkloadRecord;
use pod_watch::status::{self, PodSummary};
use pod_watch::SummarizedRecord;
use serde::{Deserialize, Serialize};

/// One row of the pod table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodView {
    pub name: String,
    pub namespace: String,
    pub status: String,
    /// `ready/total`, as kubectl prints it.
    pub ready: String,
    pub restarts: u32,
}

impl PodView {
    /// Row for a record whose summary was derived when it was cached.
    pub fn new(record: &WorkloadRecord, summary: &PodSummary) -> Self {
        Self {
            name: record.id.name.clone(),
            namespace: record.id.namespace.clone(),
            status: summary.status.to_string(),
            ready: format!("{}/{}", summary.ready, summary.total),
            restarts: summary.restarts,
        }
    }
}

impl From<&WorkloadRecord> for PodView {
    fn from(record: &WorkloadRecord) -> Self {
        Self::new(record, &status::summarize(record))
    }
}

pub fn pod_views(snapshot: &[SummarizedRecord]) -> Vec<PodView> {
    snapshot
        .iter()
        .map(|(record, summary)| PodView::new(record, summary))
        .collect()
}

/// First message on a pod stream.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub pods: Vec<PodView>,
}

impl SnapshotMessage {
    pub fn new(pods: Vec<PodView>) -> Self {
        Self {
            kind: "snapshot",
            pods,
        }
    }
}

/// Query string accepted by `/pods` and `/ws/pods`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamespaceQuery {
    pub ns: Option<String>,
}
