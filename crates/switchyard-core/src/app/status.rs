//! Status mapping - backend 固有の phase を統一語彙に写す
//!
//! Backend ごとに表を持ちます。表にない phase は `Unknown`（黙って
//! Completed / Failed にはしない）。

use crate::domain::{
    BackendKind, ErrorInfo, ExecutionResult, RawBackendStatus, TaskState, TaskStatus,
};

pub const VANISHED_MESSAGE: &str = "task vanished from its backend";

fn queue_state(phase: &str) -> Option<TaskState> {
    Some(match phase {
        "waiting" | "delayed" | "paused" | "waiting-children" | "prioritized" => TaskState::Pending,
        "active" => TaskState::Running,
        "completed" => TaskState::Completed,
        "failed" => TaskState::Failed,
        _ => return None,
    })
}

fn workflow_state(phase: &str) -> Option<TaskState> {
    Some(match phase {
        "RUNNING" | "CONTINUED_AS_NEW" => TaskState::Running,
        "COMPLETED" => TaskState::Completed,
        "FAILED" | "TERMINATED" | "TIMED_OUT" => TaskState::Failed,
        "CANCELED" => TaskState::Cancelled,
        _ => return None,
    })
}

fn integration_state(phase: &str) -> Option<TaskState> {
    Some(match phase {
        "new" | "queued" => TaskState::Pending,
        "running" | "waiting" => TaskState::Running,
        "success" | "fire-and-forget" => TaskState::Completed,
        "error" | "crashed" => TaskState::Failed,
        "canceled" => TaskState::Cancelled,
        _ => return None,
    })
}

/// Native phase -> unified state, or `None` when the table has no entry.
pub fn state_for(kind: BackendKind, phase: &str) -> Option<TaskState> {
    match kind {
        BackendKind::Queue => queue_state(phase),
        BackendKind::DurableWorkflow => workflow_state(phase),
        BackendKind::ExternalIntegration => integration_state(phase),
    }
}

/// Backends that store an `ExecutionResult` hand it back as-is; any other
/// output becomes the result's `output`.
fn execution_result(output: Option<serde_json::Value>) -> ExecutionResult {
    let Some(value) = output else {
        return ExecutionResult::default();
    };
    if value.get("output").is_some()
        && let Ok(result) = serde_json::from_value::<ExecutionResult>(value.clone())
    {
        return result;
    }
    ExecutionResult::new(value)
}

pub fn map_status(kind: BackendKind, raw: RawBackendStatus) -> TaskStatus {
    let Some(state) = state_for(kind, &raw.phase) else {
        tracing::warn!(backend = %kind, phase = %raw.phase, "unmapped backend phase");
        return TaskStatus::unknown();
    };

    let status = match state {
        TaskState::Pending => TaskStatus::pending(),
        TaskState::Running => TaskStatus::running(),
        TaskState::Completed => TaskStatus::completed(execution_result(raw.output)),
        TaskState::Failed => {
            let message = raw
                .error
                .unwrap_or_else(|| format!("{kind} reported {}", raw.phase));
            TaskStatus::failed(ErrorInfo::new(message))
        }
        TaskState::Cancelled => TaskStatus::cancelled(),
        TaskState::Unknown => TaskStatus::unknown(),
    };
    status.with_progress(raw.progress)
}

/// Status recorded when the backend no longer knows the native id.
pub fn vanished() -> TaskStatus {
    TaskStatus::failed(ErrorInfo::new(VANISHED_MESSAGE))
}
