//! Registry record: handle + last known status.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::handle::TaskHandle;
use super::status::{TaskState, TaskStatus};

/// What the router remembers about one scheduled task.
///
/// Design:
/// - This is the "single source of truth" for router-side task state.
/// - Only the router writes it; adapters hand data back and the router applies it here.
/// - State transitions go through methods, never direct field writes from outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub handle: TaskHandle,

    /// Copied from the description for `list_tasks` tag filters.
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Last status the router wrote.
    pub status: TaskStatus,

    /// The `Cancelled` status came from an accepted cancel request rather
    /// than from the backend, so a later backend terminal state may refine it.
    #[serde(default)]
    pub cancel_requested: bool,

    pub updated_at: DateTime<Utc>,
}

impl RegistryRecord {
    pub fn new(handle: TaskHandle, tags: BTreeSet<String>) -> Self {
        let created_at = handle.created_at();
        Self {
            handle,
            tags,
            status: TaskStatus::pending(),
            cancel_requested: false,
            updated_at: created_at,
        }
    }

    pub fn state(&self) -> TaskState {
        self.status.state
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Terminal, and the backend itself reported it (not just an accepted cancel).
    pub fn is_settled(&self) -> bool {
        self.is_terminal() && !self.cancel_requested
    }

    /// Does a status query still have something to learn from the backend?
    pub fn needs_refresh(&self) -> bool {
        !self.is_settled()
    }

    /// Apply an observed status, never moving backwards.
    ///
    /// - `Unknown` is not recorded: the last known status stays.
    /// - A status from an accepted cancel only yields to a backend terminal state.
    /// - Any other terminal status is final.
    ///
    /// Returns whether the record changed.
    pub fn apply(&mut self, observed: TaskStatus, now: DateTime<Utc>) -> bool {
        if observed.state == TaskState::Unknown {
            return false;
        }
        if self.is_terminal() && !self.cancel_requested {
            return false;
        }
        if self.cancel_requested && !observed.is_terminal() {
            return false;
        }
        if self.cancel_requested {
            self.cancel_requested = false;
        }
        let changed = self.status != observed;
        self.status = observed;
        self.updated_at = now;
        changed
    }

    /// Mark as cancelled after the backend accepted the request.
    /// Returns `false` (and changes nothing) when the record already reached
    /// a backend terminal state.
    pub fn mark_cancel_requested(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_terminal() && !self.cancel_requested {
            return false;
        }
        self.status = TaskStatus::cancelled();
        self.cancel_requested = true;
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackendKind, ErrorInfo, ExecutionResult};
    use chrono::TimeZone;

    fn record() -> RegistryRecord {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let handle = TaskHandle::new("t1".into(), BackendKind::Queue, "job-1".into(), t0);
        RegistryRecord::new(handle, BTreeSet::new())
    }

    #[test]
    fn new_record_is_pending() {
        let r = record();
        assert_eq!(r.state(), TaskState::Pending);
        assert!(r.needs_refresh());
    }

    #[test]
    fn unknown_does_not_overwrite_last_known() {
        let mut r = record();
        r.apply(TaskStatus::running(), Utc::now());
        assert!(!r.apply(TaskStatus::unknown(), Utc::now()));
        assert_eq!(r.state(), TaskState::Running);
    }

    #[test]
    fn terminal_status_is_final() {
        let mut r = record();
        r.apply(TaskStatus::completed(ExecutionResult::default()), Utc::now());
        r.apply(TaskStatus::failed(ErrorInfo::new("late")), Utc::now());
        assert_eq!(r.state(), TaskState::Completed);
        assert!(!r.needs_refresh());
    }

    #[test]
    fn cancel_request_never_reverts_to_running() {
        let mut r = record();
        r.apply(TaskStatus::running(), Utc::now());
        r.mark_cancel_requested(Utc::now());

        r.apply(TaskStatus::running(), Utc::now());
        r.apply(TaskStatus::pending(), Utc::now());
        assert_eq!(r.state(), TaskState::Cancelled);
        assert!(r.is_terminal());
        assert!(!r.is_settled());
        assert!(r.needs_refresh());

        // Backend confirms a terminal state: take it and stop refreshing.
        r.apply(TaskStatus::completed(ExecutionResult::default()), Utc::now());
        assert_eq!(r.state(), TaskState::Completed);
        assert!(r.is_settled());
        assert!(!r.needs_refresh());
    }

    #[test]
    fn cancel_after_completion_is_ignored() {
        let mut r = record();
        r.apply(TaskStatus::completed(ExecutionResult::default()), Utc::now());
        assert!(!r.mark_cancel_requested(Utc::now()));
        assert_eq!(r.state(), TaskState::Completed);
        assert!(!r.cancel_requested);
    }
}
