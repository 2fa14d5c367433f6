use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{JobOptions, QueueBackend, QueueError};
use crate::config::QueueConfig;
use crate::domain::{
    BackendKind, NativeId, RawBackendStatus, StatusQueryError, SubmissionError, TaskDescription,
};
use crate::ports::BackendAdapter;
use crate::typed::PayloadSchemas;

/// `BackendAdapter` for the job queue.
///
/// - list: `queue_hint`, else the configured default list
/// - job name: `task.task_type`
/// - job options: the task's retry policy (one attempt when absent)
pub struct QueueAdapter<B> {
    backend: Arc<B>,
    default_list: String,
    lists: BTreeSet<String>,
    schemas: PayloadSchemas,
}

impl<B: QueueBackend> QueueAdapter<B> {
    pub fn new(backend: Arc<B>, config: &QueueConfig) -> Self {
        Self {
            backend,
            default_list: config.default_list.clone(),
            lists: config.lists.iter().cloned().collect(),
            schemas: PayloadSchemas::default(),
        }
    }

    /// Payloads of registered task types are decoded before submission.
    pub fn with_schemas(mut self, schemas: PayloadSchemas) -> Self {
        self.schemas = schemas;
        self
    }

    fn list_for<'a>(&'a self, task: &'a TaskDescription) -> Result<&'a str, SubmissionError> {
        let list = task.queue_hint.as_deref().unwrap_or(&self.default_list);
        if !self.lists.contains(list) {
            return Err(SubmissionError::rejected(format!(
                "queue list '{list}' is not configured"
            )));
        }
        Ok(list)
    }
}

fn job_options(task: &TaskDescription) -> JobOptions {
    task.retry_policy
        .map(|p| JobOptions {
            attempts: p.max_attempts,
            backoff: p.backoff,
        })
        .unwrap_or_default()
}

fn submission_error(err: QueueError) -> SubmissionError {
    match err {
        QueueError::Unavailable(msg) => SubmissionError::unreachable(msg),
        other => SubmissionError::rejected(other.to_string()),
    }
}

fn query_error(err: QueueError) -> StatusQueryError {
    StatusQueryError::BackendUnavailable(err.to_string())
}

#[async_trait]
impl<B: QueueBackend + 'static> BackendAdapter for QueueAdapter<B> {
    fn kind(&self) -> BackendKind {
        BackendKind::Queue
    }

    async fn submit(&self, task: &TaskDescription) -> Result<NativeId, SubmissionError> {
        self.schemas
            .check(task.task_type.as_str(), &task.payload)
            .map_err(|e| SubmissionError::rejected(e.to_string()))?;
        let list = self.list_for(task)?;

        let job_id = self
            .backend
            .add(list, task.task_type.as_str(), task.payload.clone(), job_options(task))
            .await
            .map_err(submission_error)?;
        tracing::debug!(task_id = %task.id(), list, %job_id, "job added");
        Ok(NativeId::new(job_id))
    }

    async fn query_status(&self, native_id: &NativeId) -> Result<RawBackendStatus, StatusQueryError> {
        let Some(job) = self
            .backend
            .job_state(native_id.as_str())
            .await
            .map_err(query_error)?
        else {
            return Err(StatusQueryError::NotFound(native_id.clone()));
        };

        let mut raw = RawBackendStatus::new(job.state.as_str());
        if let Some(progress) = job.progress {
            raw = raw.with_progress(progress);
        }
        if let Some(value) = job.return_value {
            raw = raw.with_output(value);
        }
        if let Some(reason) = job.failed_reason
            && job.state.is_terminal()
        {
            raw = raw.with_error(reason);
        }
        Ok(raw)
    }

    async fn cancel(&self, native_id: &NativeId) -> Result<bool, StatusQueryError> {
        self.backend
            .remove(native_id.as_str())
            .await
            .map_err(query_error)
    }
}
