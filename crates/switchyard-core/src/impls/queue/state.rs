//! Job state machine for the queue backend.

use serde::{Deserialize, Serialize};

/// Job state, in the queue's own vocabulary.
///
/// State transitions:
/// - Waiting -> Active -> Completed
/// - Waiting -> Active -> Delayed -> Waiting (loop until attempts run out)
/// - Waiting -> Active -> Failed (when attempts are exhausted)
/// - Waiting -> Paused -> Waiting (list paused / resumed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    /// Ready to run immediately.
    Waiting,

    /// Waiting for a retry (delayed due to backoff).
    Delayed,

    /// Currently being executed by a worker.
    Active,

    /// Successfully completed.
    Completed,

    /// Failed permanently (attempts exhausted).
    Failed,

    /// Sitting in a paused list.
    Paused,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Paused => "paused",
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Can the job still be removed without interrupting a worker?
    pub fn is_removable(self) -> bool {
        matches!(self, JobState::Waiting | JobState::Delayed | JobState::Paused)
    }
}
