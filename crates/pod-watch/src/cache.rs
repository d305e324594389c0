//! In-memory pod cache.
//!
//! Holds the last known [`WorkloadRecord`] per identity. Every mutation
//! returns the [`Event`] describing it, resolved against the record as it
//! stands after the mutation.

use crate::event::{Event, EventAction};
use crate::status::{self, PodSummary, StatusLabel};
use cluster_client::{WorkloadId, WorkloadRecord};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A record paired with its freshly resolved label.
pub type LabelledRecord = (WorkloadRecord, StatusLabel);

/// A record paired with its label and READY/RESTARTS figures.
pub type SummarizedRecord = (WorkloadRecord, PodSummary);

/// Authoritative identity -> record map for one watch session.
#[derive(Debug, Default)]
pub struct ResourceCache {
    records: HashMap<WorkloadId, WorkloadRecord>,
    synced: bool,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, reporting it as added.
    pub fn apply_add(&mut self, record: WorkloadRecord) -> Event {
        let event = Event::new(EventAction::Add, &record);
        self.records.insert(record.id.clone(), record);
        event
    }

    /// Replace `old` with `new`, reporting it as updated.
    ///
    /// If the identities differ, `old` is removed so the cache never holds
    /// both.
    pub fn apply_update(&mut self, old: &WorkloadRecord, new: WorkloadRecord) -> Event {
        if old.id != new.id {
            self.records.remove(&old.id);
        }
        let event = Event::new(EventAction::Update, &new);
        self.records.insert(new.id.clone(), new);
        event
    }

    /// Remove a record. Returns `None` if the identity was not tracked.
    pub fn apply_delete(&mut self, record: &WorkloadRecord) -> Option<Event> {
        self.records
            .remove(&record.id)
            .map(|_| Event::new(EventAction::Delete, record))
    }

    /// Classify and apply an incoming record.
    ///
    /// Untracked identities are added, changed records updated, and
    /// records identical to what is cached are ignored, which keeps a
    /// re-list after reconnect from replaying events.
    pub fn upsert(&mut self, record: WorkloadRecord) -> Option<Event> {
        match self.records.get(&record.id) {
            None => Some(self.apply_add(record)),
            Some(current) if *current == record => {
                debug!("Pod {} unchanged", record.id);
                None
            }
            Some(current) => {
                let old = current.clone();
                Some(self.apply_update(&old, record))
            }
        }
    }

    /// Drop every identity not in `keep`, returning their Delete events
    /// in identity order.
    pub fn retain(&mut self, keep: &HashSet<WorkloadId>) -> Vec<Event> {
        let mut gone: Vec<WorkloadId> = self
            .records
            .keys()
            .filter(|id| !keep.contains(*id))
            .cloned()
            .collect();
        gone.sort();
        gone.iter()
            .filter_map(|id| self.records.remove(id))
            .map(|record| Event::new(EventAction::Delete, &record))
            .collect()
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Flag the cache authoritative. Only the watcher calls this, once the
    /// initial list has completed.
    pub fn mark_synced(&mut self) {
        self.synced = true;
    }

    pub fn get(&self, id: &WorkloadId) -> Option<&WorkloadRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &WorkloadId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, sorted by identity.
    pub fn snapshot(&self) -> Vec<WorkloadRecord> {
        let mut records: Vec<WorkloadRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// All records with labels resolved now, sorted by identity.
    pub fn labelled_snapshot(&self) -> Vec<LabelledRecord> {
        self.snapshot()
            .into_iter()
            .map(|record| {
                let label = status::resolve(&record);
                (record, label)
            })
            .collect()
    }

    /// All records with their full summary, sorted by identity.
    pub fn summarized_snapshot(&self) -> Vec<SummarizedRecord> {
        self.snapshot()
            .into_iter()
            .map(|record| {
                let summary = status::summarize(&record);
                (record, summary)
            })
            .collect()
    }
}
