use std::sync::Arc;

use async_trait::async_trait;

use super::{WorkflowBackend, WorkflowError, WorkflowStart};
use crate::config::WorkflowConfig;
use crate::domain::{
    BackendKind, NativeId, RawBackendStatus, StatusQueryError, SubmissionError, TaskDescription,
    TaskId,
};
use crate::ports::BackendAdapter;
use crate::typed::PayloadSchemas;

/// `BackendAdapter` for the durable workflow service.
///
/// The workflow id is `{id_prefix}{task_id}`, so submitting the same task
/// again after a restart lands on the same execution instead of a new one.
pub struct WorkflowAdapter<B> {
    backend: Arc<B>,
    task_list: String,
    id_prefix: String,
    schemas: PayloadSchemas,
}

impl<B: WorkflowBackend> WorkflowAdapter<B> {
    pub fn new(backend: Arc<B>, config: &WorkflowConfig) -> Self {
        Self {
            backend,
            task_list: config.task_list.clone(),
            id_prefix: config.id_prefix.clone(),
            schemas: PayloadSchemas::default(),
        }
    }

    pub fn with_schemas(mut self, schemas: PayloadSchemas) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn workflow_id(&self, task_id: &TaskId) -> String {
        format!("{}{}", self.id_prefix, task_id)
    }
}

fn query_error(native_id: &NativeId, err: WorkflowError) -> StatusQueryError {
    match err {
        WorkflowError::NotFound(_) => StatusQueryError::NotFound(native_id.clone()),
        other => StatusQueryError::BackendUnavailable(other.to_string()),
    }
}

#[async_trait]
impl<B: WorkflowBackend + 'static> BackendAdapter for WorkflowAdapter<B> {
    fn kind(&self) -> BackendKind {
        BackendKind::DurableWorkflow
    }

    async fn submit(&self, task: &TaskDescription) -> Result<NativeId, SubmissionError> {
        self.schemas
            .check(task.task_type.as_str(), &task.payload)
            .map_err(|e| SubmissionError::rejected(e.to_string()))?;

        let workflow_id = self.workflow_id(task.id());
        let request = WorkflowStart {
            workflow_id: workflow_id.clone(),
            workflow_type: task.task_type.as_str().to_string(),
            task_list: task
                .queue_hint
                .clone()
                .unwrap_or_else(|| self.task_list.clone()),
            input: task.payload.clone(),
        };

        match self.backend.start(request).await {
            Ok(run_id) => {
                tracing::debug!(task_id = %task.id(), %workflow_id, %run_id, "workflow started");
            }
            Err(WorkflowError::AlreadyStarted { run_id }) => {
                tracing::info!(task_id = %task.id(), %workflow_id, %run_id, "workflow already running, reusing it");
            }
            Err(WorkflowError::Unavailable(msg)) => return Err(SubmissionError::unreachable(msg)),
            Err(other) => return Err(SubmissionError::rejected(other.to_string())),
        }
        Ok(NativeId::new(workflow_id))
    }

    async fn query_status(&self, native_id: &NativeId) -> Result<RawBackendStatus, StatusQueryError> {
        let desc = self
            .backend
            .describe(native_id.as_str())
            .await
            .map_err(|e| query_error(native_id, e))?;

        let mut raw = RawBackendStatus::new(desc.status.as_str());
        if let Some(result) = desc.result {
            raw = raw.with_output(result);
        }
        if let Some(failure) = desc.failure {
            raw = raw.with_error(failure);
        }
        Ok(raw)
    }

    async fn cancel(&self, native_id: &NativeId) -> Result<bool, StatusQueryError> {
        match self.backend.request_cancel(native_id.as_str()).await {
            Ok(accepted) => Ok(accepted),
            Err(WorkflowError::NotFound(_)) => Ok(false),
            Err(e) => Err(query_error(native_id, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::impls::workflow::InMemoryWorkflowBackend;
    use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};
    use serde_json::json;

    fn setup() -> (Arc<InMemoryWorkflowBackend>, WorkflowAdapter<InMemoryWorkflowBackend>) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        let backend = Arc::new(InMemoryWorkflowBackend::new(clock, ids));
        let adapter = WorkflowAdapter::new(Arc::clone(&backend), &WorkflowConfig::default());
        (backend, adapter)
    }

    #[tokio::test]
    async fn workflow_id_is_derived_from_task_id() {
        let (_, adapter) = setup();
        let task = TaskDescription::new("migrate-users", "migrate").durable();
        let native = adapter.submit(&task).await.unwrap();
        assert_eq!(native.as_str(), "wf-migrate-users");
    }

    #[tokio::test]
    async fn resubmitting_an_open_workflow_is_a_no_op() {
        let (backend, adapter) = setup();
        let task = TaskDescription::new("migrate-users", "migrate").durable();

        let first = adapter.submit(&task).await.unwrap();
        let second = adapter.submit(&task).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.run_count(first.as_str()), 1);
    }

    #[tokio::test]
    async fn task_list_comes_from_hint() {
        let (backend, adapter) = setup();
        let task = TaskDescription::new("t1", "migrate").with_queue_hint("priority");
        let native = adapter.submit(&task).await.unwrap();
        assert_eq!(backend.describe(native.as_str()).await.unwrap().task_list, "priority");
    }

    #[tokio::test]
    async fn status_carries_result_and_failure() {
        let (backend, adapter) = setup();
        let done = adapter.submit(&TaskDescription::new("t1", "migrate")).await.unwrap();
        backend.complete(done.as_str(), json!({"rows": 3}));
        let raw = adapter.query_status(&done).await.unwrap();
        assert_eq!(raw.phase, "COMPLETED");
        assert_eq!(raw.output, Some(json!({"rows": 3})));

        let broken = adapter.submit(&TaskDescription::new("t2", "migrate")).await.unwrap();
        backend.terminate(broken.as_str(), "operator");
        let raw = adapter.query_status(&broken).await.unwrap();
        assert_eq!(raw.phase, "TERMINATED");
        assert_eq!(raw.error.as_deref(), Some("operator"));
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let (_, adapter) = setup();
        let missing = NativeId::new("wf-ghost");
        assert_eq!(
            adapter.query_status(&missing).await.unwrap_err(),
            StatusQueryError::NotFound(missing.clone())
        );
        assert!(!adapter.cancel(&missing).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_service_is_transient() {
        let (backend, adapter) = setup();
        backend.set_available(false);
        let err = adapter
            .submit(&TaskDescription::new("t1", "migrate"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transient);
    }

    #[tokio::test]
    async fn empty_type_is_rejected_permanently() {
        let (_, adapter) = setup();
        let err = adapter
            .submit(&TaskDescription::new("t1", ""))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Permanent);
    }
}
