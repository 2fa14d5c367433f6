//! Job record: metadata + data.

use std::time::Instant;

use super::JobOptions;
use super::state::JobState;

/// Metadata + data for a job in the queue.
///
/// Design:
/// - This is the "single source of truth" for job state.
/// - Queue structures (ready/scheduled) hold job ids only.
/// - All state transitions happen here.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub list: String,
    pub name: String,
    pub data: serde_json::Value,
    pub opts: JobOptions,
    pub state: JobState,

    /// Number of times this job has been picked up (including the current one if Active).
    pub attempts_made: u32,

    pub progress: Option<u8>,
    pub return_value: Option<serde_json::Value>,
    pub failed_reason: Option<String>,

    /// When to retry next (for Delayed state).
    pub next_run_at: Option<Instant>,

    pub created_at: Instant,
    pub updated_at: Instant,
}

impl JobRecord {
    pub fn new(id: String, list: String, name: String, data: serde_json::Value, opts: JobOptions) -> Self {
        let now = Instant::now();
        Self {
            id,
            list,
            name,
            data,
            opts,
            state: JobState::Waiting,
            attempts_made: 0,
            progress: None,
            return_value: None,
            failed_reason: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark as active (increment attempts).
    pub fn start_attempt(&mut self) {
        self.state = JobState::Active;
        self.attempts_made += 1;
        self.updated_at = Instant::now();
    }

    pub fn mark_completed(&mut self, return_value: serde_json::Value) {
        self.state = JobState::Completed;
        self.progress = Some(100);
        self.return_value = Some(return_value);
        self.updated_at = Instant::now();
    }

    /// Mark as failed (attempts exhausted).
    pub fn mark_failed(&mut self, reason: String) {
        self.state = JobState::Failed;
        self.failed_reason = Some(reason);
        self.updated_at = Instant::now();
    }

    /// Schedule retry with backoff.
    pub fn schedule_retry(&mut self, next_run_at: Instant, reason: String) {
        self.state = JobState::Delayed;
        self.next_run_at = Some(next_run_at);
        self.failed_reason = Some(reason);
        self.updated_at = Instant::now();
    }

    /// Move from Delayed back to Waiting.
    pub fn requeue(&mut self) {
        self.state = JobState::Waiting;
        self.next_run_at = None;
        self.updated_at = Instant::now();
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.opts.attempts
    }
}
