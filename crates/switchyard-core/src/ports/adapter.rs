//! BackendAdapter port - 1 つの実行 backend を包む統一インターフェース
//!
//! Router が backend に触れるのはこの trait 経由だけです。
//! 各実装は TaskDescription を backend 固有の submit/query/cancel 呼び出しに翻訳します。
//!
//! # 実装
//! - `impls::queue::QueueAdapter`: キュー（短い・再試行可能なジョブ）
//! - `impls::workflow::WorkflowAdapter`: durable workflow（長時間・再開可能）
//! - `impls::integration::IntegrationAdapter`: 外部 automation の起動

use async_trait::async_trait;

use crate::domain::{BackendKind, NativeId, RawBackendStatus, StatusQueryError, SubmissionError, TaskDescription};

/// A uniform wrapper around one concrete backend.
///
/// Adapters never touch the router's registry; they only return data.
/// None of these calls retry internally, retry accounting belongs to the router.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Which kind of backend this adapter fronts.
    fn kind(&self) -> BackendKind;

    /// Hand the task to the backend and return the backend's id for it.
    ///
    /// The router calls this at most once per task id while the task is
    /// non-terminal.
    async fn submit(&self, task: &TaskDescription) -> Result<NativeId, SubmissionError>;

    /// Report the backend's current view of the execution, in its own vocabulary.
    async fn query_status(&self, native_id: &NativeId) -> Result<RawBackendStatus, StatusQueryError>;

    /// Ask the backend to cancel.
    ///
    /// `Ok(false)` means the backend did not accept the request (already
    /// finished, or in-flight work cannot be interrupted). It must not error
    /// for that case.
    async fn cancel(&self, native_id: &NativeId) -> Result<bool, StatusQueryError>;
}
