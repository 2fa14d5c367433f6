//! Queue backend - 短時間・ステートレスなジョブ向け
//!
//! # 構成
//! - `QueueBackend`: キューの native API（list / job name / data / job options）
//! - `InMemoryQueueBackend`: 開発・テスト用のインメモリ実装
//! - `WorkerGroup` / `HandlerRegistry`: in-process ワーカー
//! - `QueueAdapter`: Router から見た `BackendAdapter` 実装
//!
//! Native の語彙（`waiting`, `active`, ...）は adapter の外に出ません。

mod adapter;
mod memory;
mod record;
mod state;
mod worker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Backoff;

pub use adapter::QueueAdapter;
pub use memory::{InMemoryQueueBackend, JobLease};
pub use state::JobState;
pub use worker::{HandlerRegistry, RegistryError, WorkerGroup};

/// Queue-assigned job id.
pub type JobId = String;

/// Per-job options forwarded from the task's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Total executions allowed (first run included).
    pub attempts: u32,
    pub backoff: Backoff,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Backoff::fixed(0),
        }
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub list: String,
    pub name: String,
    pub state: JobState,
    pub attempts_made: u32,
    pub progress: Option<u8>,
    pub return_value: Option<serde_json::Value>,
    pub failed_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue connection unavailable: {0}")]
    Unavailable(String),

    #[error("unknown queue list '{0}'")]
    UnknownList(String),

    #[error("job rejected: {0}")]
    Rejected(String),
}

/// Native queue client.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn add(
        &self,
        list: &str,
        job_name: &str,
        data: serde_json::Value,
        opts: JobOptions,
    ) -> Result<JobId, QueueError>;

    /// `Ok(None)` when the queue has no job with this id (never added, or removed).
    async fn job_state(&self, id: &str) -> Result<Option<JobSnapshot>, QueueError>;

    /// Removes a job that has not started. Returns `false` for active or finished jobs.
    async fn remove(&self, id: &str) -> Result<bool, QueueError>;
}
