//! Durable workflow backend - 長時間・再起動をまたぐ処理向け
//!
//! Workflow id は task id から決定的に導出されるため、同じ task を二度 start しても
//! 実行中の workflow が一つ増えることはありません（`AlreadyStarted`）。

mod adapter;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use adapter::WorkflowAdapter;
pub use memory::InMemoryWorkflowBackend;

pub type RunId = String;

/// Execution status, in the workflow engine's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
    ContinuedAsNew,
    TimedOut,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Canceled => "CANCELED",
            ExecutionStatus::Terminated => "TERMINATED",
            ExecutionStatus::ContinuedAsNew => "CONTINUED_AS_NEW",
            ExecutionStatus::TimedOut => "TIMED_OUT",
        }
    }

    pub fn is_open(self) -> bool {
        self == ExecutionStatus::Running
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStart {
    pub workflow_id: String,
    pub workflow_type: String,
    pub task_list: String,
    pub input: serde_json::Value,
}

/// Latest run of a workflow id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDescription {
    pub workflow_id: String,
    pub run_id: RunId,
    pub workflow_type: String,
    pub task_list: String,
    pub status: ExecutionStatus,
    pub result: Option<serde_json::Value>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// A run with this workflow id is still open.
    #[error("workflow already started (run {run_id})")]
    AlreadyStarted { run_id: RunId },

    #[error("workflow '{0}' not found")]
    NotFound(String),

    #[error("workflow service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Native workflow service client.
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    async fn start(&self, request: WorkflowStart) -> Result<RunId, WorkflowError>;

    async fn describe(&self, workflow_id: &str) -> Result<WorkflowDescription, WorkflowError>;

    /// `Ok(false)` when the latest run is already closed.
    async fn request_cancel(&self, workflow_id: &str) -> Result<bool, WorkflowError>;
}
