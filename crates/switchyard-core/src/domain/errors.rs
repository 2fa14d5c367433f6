//! Errors - エラー型と分類
//!
//! Router の呼び出し側が依存するのはここの語彙だけです。
//! Backend 固有のエラーは adapter 内で翻訳され、外には漏れません。

use thiserror::Error;

use super::handle::BackendKind;
use super::ids::{NativeId, TaskId};

/// ErrorKind は submit 失敗の分類
///
/// - Transient: 一時的なエラー（到達不能など。リトライ推奨）
/// - Permanent: 恒久的なエラー（payload 不正など。リトライ無意味）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
}

/// The backend was unreachable or rejected the task at submit time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("submission {kind:?}: {message}")]
pub struct SubmissionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SubmissionError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Errors from `query_status` / `cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusQueryError {
    /// Transient: the status endpoint could not be reached.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Permanent: the backend does not know this id.
    #[error("native id {0} not found in backend")]
    NotFound(NativeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskValidationError {
    #[error("task id must not be empty")]
    EmptyId,

    #[error("task {0} has an empty type")]
    EmptyType(TaskId),

    #[error("task {0} has retry_policy.max_attempts = 0")]
    ZeroAttempts(TaskId),
}

/// Errors surfaced by the router API.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("scheduling failed for task {task_id} after {attempts} attempt(s): {source}")]
    SchedulingFailed {
        task_id: TaskId,
        attempts: u32,
        #[source]
        source: SubmissionError,
    },

    /// The classifier picked a backend kind with no adapter wired in.
    /// `RouterBuilder` refuses to build such a router, so this is a defect.
    #[error("task {task_id} classified as {kind} but no adapter is registered")]
    Classification { task_id: TaskId, kind: BackendKind },

    #[error("invalid task: {0}")]
    InvalidTask(#[from] TaskValidationError),

    #[error("task {0} is not registered")]
    TaskNotFound(TaskId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn scheduling_failed_keeps_last_cause() {
        let err = RouterError::SchedulingFailed {
            task_id: "t1".into(),
            attempts: 3,
            source: SubmissionError::unreachable("connection refused"),
        };
        assert!(err.to_string().contains("after 3 attempt(s)"));
        let source = err.source().unwrap();
        assert!(source.to_string().contains("connection refused"));
    }

    #[test]
    fn only_transient_submission_errors_are_retryable() {
        assert!(SubmissionError::unreachable("x").is_retryable());
        assert!(!SubmissionError::rejected("x").is_retryable());
    }
}
