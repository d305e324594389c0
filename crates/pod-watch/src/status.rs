//! Pod status derivation.
//!
//! Reduces a [`WorkloadRecord`] to the single label shown in the STATUS
//! column of `kubectl get pods`, using the same precedence rules:
//! init-container failures beat main-container state, the lowest-index
//! terminal main container wins, and a deletion timestamp beats everything.

use cluster_client::{ContainerState, ContainerStatus, WorkloadRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

const POD_INITIALIZING: &str = "PodInitializing";
const COMPLETED: &str = "Completed";

/// Human-readable pod status, e.g. `Running`, `Init:0/2`, `CrashLoopBackOff`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusLabel(String);

impl StatusLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StatusLabel {
    fn from(value: String) -> Self {
        StatusLabel(value)
    }
}

impl From<&str> for StatusLabel {
    fn from(value: &str) -> Self {
        StatusLabel(value.to_string())
    }
}

impl PartialEq<&str> for StatusLabel {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// The label plus the READY and RESTARTS figures computed alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSummary {
    pub status: StatusLabel,
    /// Main containers that are ready and running.
    pub ready: usize,
    /// Main containers reported.
    pub total: usize,
    /// Restarts summed over whichever container set decided the label.
    pub restarts: u32,
    /// The label came from an init container.
    pub initializing: bool,
}

/// Derive the status label for a pod.
pub fn resolve(record: &WorkloadRecord) -> StatusLabel {
    summarize(record).status
}

/// Derive the status label together with ready and restart counts.
pub fn summarize(record: &WorkloadRecord) -> PodSummary {
    let mut reason = record
        .reason
        .clone()
        .unwrap_or_else(|| record.phase.clone());
    let mut restarts: u32 = 0;
    let mut ready = 0;

    let initializing = scan_init_containers(&record.init_containers, &mut reason, &mut restarts);

    if !initializing {
        restarts = 0;
        let mut has_running = false;
        // Reverse walk: every assignment overwrites, so index 0 has the last word.
        for container in record.containers.iter().rev() {
            restarts = restarts.saturating_add(container.restart_count);
            match &container.state {
                ContainerState::Waiting { reason: Some(r) } => reason = r.clone(),
                ContainerState::Terminated { reason: Some(r), .. } => reason = r.clone(),
                ContainerState::Terminated {
                    reason: None,
                    exit_code,
                    signal,
                } => {
                    reason = match signal {
                        Some(sig) if *sig != 0 => format!("Signal:{}", sig),
                        _ => format!("ExitCode:{}", exit_code),
                    };
                }
                ContainerState::Running if container.ready => {
                    has_running = true;
                    ready += 1;
                }
                _ => {}
            }
        }

        if reason == COMPLETED && has_running {
            reason = if record.conditions.iter().any(|c| c.is_ready()) {
                "Running".to_string()
            } else {
                "NotReady".to_string()
            };
        }
    }

    if record.deletion_timestamp.is_some() {
        reason = "Terminating".to_string();
    }

    PodSummary {
        status: StatusLabel(reason),
        ready,
        total: record.containers.len(),
        restarts,
        initializing,
    }
}

/// Returns true when an init container decided the label.
fn scan_init_containers(
    containers: &[ContainerStatus],
    reason: &mut String,
    restarts: &mut u32,
) -> bool {
    let total = containers.len();
    for (i, container) in containers.iter().enumerate() {
        *restarts = restarts.saturating_add(container.restart_count);
        match &container.state {
            ContainerState::Terminated { exit_code: 0, .. } => continue,
            ContainerState::Terminated {
                reason: Some(r), ..
            } => *reason = format!("Init:{}", r),
            ContainerState::Terminated {
                reason: None,
                exit_code,
                signal,
            } => {
                *reason = match signal {
                    Some(sig) if *sig != 0 => format!("Init:Signal:{}", sig),
                    _ => format!("Init:ExitCode:{}", exit_code),
                };
            }
            ContainerState::Waiting { reason: Some(r) } if r != POD_INITIALIZING => {
                *reason = format!("Init:{}", r);
            }
            _ => *reason = format!("Init:{}/{}", i, total),
        }
        return true;
    }
    false
}
