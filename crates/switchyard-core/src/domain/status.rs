//! Unified task status and the raw status adapters hand back.

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::outcome::ExecutionResult;

/// Unified task state.
///
/// State transitions:
/// - Pending -> Running -> Completed | Failed | Cancelled
/// - Unknown: the backend could not be reached to confirm. It is never
///   mapped to Completed or Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,

    /// Set by the flow composer when a dependency failed or was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<TaskId>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            blocked_by: None,
        }
    }

    pub fn blocked_by(child: TaskId, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            blocked_by: Some(child),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ErrorInfo>,

    /// 0-100, only when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl TaskStatus {
    fn of(state: TaskState) -> Self {
        Self {
            state,
            result: None,
            error_info: None,
            progress: None,
        }
    }

    pub fn pending() -> Self {
        Self::of(TaskState::Pending)
    }

    pub fn running() -> Self {
        Self::of(TaskState::Running)
    }

    pub fn completed(result: ExecutionResult) -> Self {
        Self {
            result: Some(result),
            ..Self::of(TaskState::Completed)
        }
    }

    pub fn failed(error: ErrorInfo) -> Self {
        Self {
            error_info: Some(error),
            ..Self::of(TaskState::Failed)
        }
    }

    pub fn cancelled() -> Self {
        Self::of(TaskState::Cancelled)
    }

    pub fn unknown() -> Self {
        Self::of(TaskState::Unknown)
    }

    pub fn with_progress(mut self, progress: Option<u8>) -> Self {
        self.progress = progress.map(|p| p.min(100));
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// What an adapter reports, still in the backend's own vocabulary.
///
/// `phase` is interpreted by the per-backend mapping table in `app::status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBackendStatus {
    pub phase: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RawBackendStatus {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            progress: None,
            output: None,
            error: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
