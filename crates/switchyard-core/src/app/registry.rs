//! TaskRegistry - Router 専用の task_id → record 表
//!
//! DashMap（シャード単位のロック）なので全体ロックはありません。
//! 読み出しは常に clone で返し、guard を `.await` の向こうに持ち越さないこと。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::domain::{BackendKind, RegistryRecord, TaskHandle, TaskId, TaskState};
use crate::ports::RegistrySnapshot;

/// `list_tasks` filter. Unset fields match everything; set fields must all match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub backend_kind: Option<BackendKind>,
    pub tag: Option<String>,
    pub status: Option<TaskState>,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, kind: BackendKind) -> Self {
        self.backend_kind = Some(kind);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_status(mut self, state: TaskState) -> Self {
        self.status = Some(state);
        self
    }

    pub fn matches(&self, record: &RegistryRecord) -> bool {
        self.backend_kind
            .is_none_or(|kind| record.handle.backend_kind() == kind)
            && self.tag.as_ref().is_none_or(|tag| record.tags.contains(tag))
            && self.status.is_none_or(|state| record.state() == state)
    }
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    entries: DashMap<TaskId, RegistryRecord>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &TaskId) -> Option<RegistryRecord> {
        self.entries.get(task_id).map(|r| r.value().clone())
    }

    /// Inserts or replaces the record for its task id.
    pub fn insert(&self, record: RegistryRecord) -> Option<RegistryRecord> {
        self.entries.insert(record.handle.task_id().clone(), record)
    }

    /// Mutates one record under its shard lock. `None` if the id is absent.
    pub fn update<R>(&self, task_id: &TaskId, f: impl FnOnce(&mut RegistryRecord) -> R) -> Option<R> {
        self.entries.get_mut(task_id).map(|mut r| f(r.value_mut()))
    }

    /// Matching handles, oldest first (ties broken by task id).
    pub fn list(&self, filter: &TaskFilter) -> Vec<TaskHandle> {
        let mut handles: Vec<TaskHandle> = self
            .entries
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().handle.clone())
            .collect();
        handles.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.task_id().cmp(b.task_id()))
        });
        handles
    }

    /// Removes terminal records last updated before `cutoff`.
    pub fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> Vec<TaskId> {
        let mut evicted = Vec::new();
        self.entries.retain(|task_id, record| {
            let evict = record.is_terminal() && record.updated_at < cutoff;
            if evict {
                evicted.push(task_id.clone());
            }
            !evict
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut records: Vec<RegistryRecord> =
            self.entries.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.handle.task_id().cmp(b.handle.task_id()));
        RegistrySnapshot { records }
    }

    /// Loads records from a snapshot. A record already present wins when it
    /// is at least as recent as the snapshot's. Returns how many were loaded.
    pub fn restore(&self, snapshot: RegistrySnapshot) -> usize {
        let mut loaded = 0;
        for record in snapshot.records {
            // Compare and write under the same shard lock.
            match self.entries.entry(record.handle.task_id().clone()) {
                Entry::Occupied(mut current) => {
                    if current.get().updated_at < record.updated_at {
                        current.insert(record);
                        loaded += 1;
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    loaded += 1;
                }
            }
        }
        loaded
    }
}
