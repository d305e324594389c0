//! Conversion from Kubernetes `Pod` objects into [`WorkloadRecord`]s.

use crate::error::ClusterError;
use crate::models::{ContainerState, ContainerStatus, PodCondition, WorkloadId, WorkloadRecord};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use tracing::warn;

/// Kubernetes reports "no reason" as either a missing field or "".
fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.is_empty()).cloned()
}

fn convert_state(state: Option<&core::ContainerState>) -> ContainerState {
    let Some(state) = state else {
        return ContainerState::default();
    };
    if let Some(terminated) = &state.terminated {
        return ContainerState::Terminated {
            reason: non_empty(terminated.reason.as_ref()),
            exit_code: terminated.exit_code,
            signal: terminated.signal,
        };
    }
    if state.running.is_some() {
        return ContainerState::Running;
    }
    ContainerState::Waiting {
        reason: state
            .waiting
            .as_ref()
            .and_then(|w| non_empty(w.reason.as_ref())),
    }
}

fn convert_status(status: &core::ContainerStatus) -> ContainerStatus {
    ContainerStatus {
        name: status.name.clone(),
        ready: status.ready,
        restart_count: u32::try_from(status.restart_count).unwrap_or(0),
        state: convert_state(status.state.as_ref()),
    }
}

/// `Time` wraps a different datetime crate depending on the k8s-openapi
/// release, so go through its RFC 3339 wire form.
fn convert_time(time: &Time) -> DateTime<Utc> {
    let value = serde_json::to_value(time).unwrap_or_default();
    parse_time_value(&value).unwrap_or_else(|| {
        warn!("Unparseable timestamp {}, using the current time", value);
        Utc::now()
    })
}

fn parse_time_value(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl TryFrom<&core::Pod> for WorkloadRecord {
    type Error = ClusterError;

    fn try_from(pod: &core::Pod) -> Result<Self, Self::Error> {
        let name = pod
            .metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ClusterError::UnexpectedObject("pod missing metadata.name".to_string()))?;
        let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");

        let status = pod.status.as_ref();
        let statuses = |list: Option<&Vec<core::ContainerStatus>>| -> Vec<ContainerStatus> {
            list.map(|l| l.iter().map(convert_status).collect())
                .unwrap_or_default()
        };

        Ok(WorkloadRecord {
            id: WorkloadId::new(namespace, name),
            phase: status
                .and_then(|s| s.phase.clone())
                .unwrap_or_default(),
            reason: status.and_then(|s| non_empty(s.reason.as_ref())),
            init_containers: statuses(status.and_then(|s| s.init_container_statuses.as_ref())),
            containers: statuses(status.and_then(|s| s.container_statuses.as_ref())),
            conditions: status
                .and_then(|s| s.conditions.as_ref())
                .map(|c| {
                    c.iter()
                        .map(|c| PodCondition::new(c.type_.clone(), c.status.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            deletion_timestamp: pod.metadata.deletion_timestamp.as_ref().map(convert_time),
        })
    }
}

impl TryFrom<core::Pod> for WorkloadRecord {
    type Error = ClusterError;

    fn try_from(pod: core::Pod) -> Result<Self, Self::Error> {
        WorkloadRecord::try_from(&pod)
    }
}
