//! External integration backend - 外部 automation hub への委譲
//!
//! Automation によっては execution id を返さない（fire-and-forget）。
//! その場合 adapter が相関 id を発行し、状態は「受理済み」として扱います。

mod adapter;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use adapter::{FIRE_AND_FORGET_PHASE, FIRE_AND_FORGET_PREFIX, IntegrationAdapter};
pub use memory::{AutomationMode, InMemoryAutomationHub};

/// Execution phase, in the hub's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    New,
    Queued,
    Running,
    Waiting,
    Success,
    Error,
    Canceled,
    Crashed,
}

impl ExecutionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionPhase::New => "new",
            ExecutionPhase::Queued => "queued",
            ExecutionPhase::Running => "running",
            ExecutionPhase::Waiting => "waiting",
            ExecutionPhase::Success => "success",
            ExecutionPhase::Error => "error",
            ExecutionPhase::Canceled => "canceled",
            ExecutionPhase::Crashed => "crashed",
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(
            self,
            ExecutionPhase::Success
                | ExecutionPhase::Error
                | ExecutionPhase::Canceled
                | ExecutionPhase::Crashed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerReceipt {
    /// `None` for fire-and-forget automations.
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationExecution {
    pub id: String,
    pub automation: String,
    pub endpoint: String,
    pub phase: ExecutionPhase,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutomationError {
    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("unknown automation '{0}'")]
    UnknownAutomation(String),

    #[error("execution '{0}' not found")]
    NotFound(String),

    #[error("automation hub unavailable: {0}")]
    Unavailable(String),
}

/// Native automation hub client.
#[async_trait]
pub trait AutomationClient: Send + Sync {
    async fn trigger(
        &self,
        endpoint: &str,
        automation: &str,
        payload: serde_json::Value,
    ) -> Result<TriggerReceipt, AutomationError>;

    async fn execution(&self, execution_id: &str) -> Result<AutomationExecution, AutomationError>;

    /// `Ok(false)` when the execution already finished.
    async fn stop(&self, execution_id: &str) -> Result<bool, AutomationError>;
}
