//! Impls - backend 実装
//!
//! 各 backend は「native client trait + インメモリ実装 + BackendAdapter」の三点セット。
//! Native client trait が wire protocol の境界で、本番用クライアントは別クレートで
//! 同じ trait を実装する想定です。
//!
//! # 含まれる backend
//! - **queue**: 短時間ジョブ（list / attempts / backoff, in-process worker）
//! - **workflow**: 長時間・durable な workflow（決定的 workflow id）
//! - **integration**: 外部 automation hub（fire-and-forget 対応）

pub mod integration;
pub mod queue;
pub mod workflow;

pub use self::integration::{AutomationClient, InMemoryAutomationHub, IntegrationAdapter};
pub use self::queue::{InMemoryQueueBackend, QueueAdapter, QueueBackend, WorkerGroup};
pub use self::workflow::{InMemoryWorkflowBackend, WorkflowAdapter, WorkflowBackend};
