//! In-memory workflow service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExecutionStatus, RunId, WorkflowBackend, WorkflowDescription, WorkflowError, WorkflowStart};
use crate::ports::{Clock, IdGenerator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WorkflowRun {
    run_id: RunId,
    workflow_type: String,
    task_list: String,
    input: serde_json::Value,
    status: ExecutionStatus,
    result: Option<serde_json::Value>,
    failure: Option<String>,
    started_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

/// Everything the service knows. Serializable so executions survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct WorkflowState {
    /// workflow id -> run history (latest last)
    executions: BTreeMap<String, Vec<WorkflowRun>>,
}

impl WorkflowState {
    fn latest(&self, workflow_id: &str) -> Option<&WorkflowRun> {
        self.executions.get(workflow_id).and_then(|runs| runs.last())
    }

    fn latest_mut(&mut self, workflow_id: &str) -> Option<&mut WorkflowRun> {
        self.executions.get_mut(workflow_id).and_then(|runs| runs.last_mut())
    }
}

/// Workflow service that keeps executions in memory.
///
/// `complete` / `fail` / `terminate` / `time_out` stand in for workflow code
/// and the service's own timers.
pub struct InMemoryWorkflowBackend {
    state: Mutex<WorkflowState>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    available: AtomicBool,
}

impl InMemoryWorkflowBackend {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Mutex::new(WorkflowState::default()),
            clock,
            ids,
            available: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), WorkflowError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(WorkflowError::Unavailable("frontend unreachable".into()))
        }
    }

    /// Serialized executions, for handing over to a restarted process.
    pub fn export_state(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&*self.lock())
    }

    pub fn restore_state(
        exported: &str,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, serde_json::Error> {
        let state: WorkflowState = serde_json::from_str(exported)?;
        let backend = Self::new(clock, ids);
        *backend.lock() = state;
        Ok(backend)
    }

    /// Number of runs ever started for a workflow id.
    pub fn run_count(&self, workflow_id: &str) -> usize {
        self.lock().executions.get(workflow_id).map_or(0, Vec::len)
    }

    fn close(
        &self,
        workflow_id: &str,
        status: ExecutionStatus,
        result: Option<serde_json::Value>,
        failure: Option<String>,
    ) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        match state.latest_mut(workflow_id) {
            Some(run) if run.status.is_open() => {
                run.status = status;
                run.result = result;
                run.failure = failure;
                run.closed_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Closes the open run as COMPLETED. `false` if nothing was open.
    pub fn complete(&self, workflow_id: &str, result: serde_json::Value) -> bool {
        self.close(workflow_id, ExecutionStatus::Completed, Some(result), None)
    }

    pub fn fail(&self, workflow_id: &str, failure: impl Into<String>) -> bool {
        self.close(workflow_id, ExecutionStatus::Failed, None, Some(failure.into()))
    }

    pub fn terminate(&self, workflow_id: &str, reason: impl Into<String>) -> bool {
        self.close(workflow_id, ExecutionStatus::Terminated, None, Some(reason.into()))
    }

    pub fn time_out(&self, workflow_id: &str) -> bool {
        self.close(
            workflow_id,
            ExecutionStatus::TimedOut,
            None,
            Some("workflow execution timed out".into()),
        )
    }

    /// Workflow ids whose latest run is open.
    pub fn open_workflows(&self) -> Vec<String> {
        self.lock()
            .executions
            .iter()
            .filter(|(_, runs)| runs.last().is_some_and(|r| r.status.is_open()))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl WorkflowBackend for InMemoryWorkflowBackend {
    async fn start(&self, request: WorkflowStart) -> Result<RunId, WorkflowError> {
        self.ensure_available()?;
        if request.workflow_id.is_empty() {
            return Err(WorkflowError::InvalidArgument("workflow id is empty".into()));
        }
        if request.workflow_type.is_empty() {
            return Err(WorkflowError::InvalidArgument("workflow type is empty".into()));
        }

        let now = self.clock.now();
        let mut state = self.lock();
        if let Some(run) = state.latest(&request.workflow_id)
            && run.status.is_open()
        {
            return Err(WorkflowError::AlreadyStarted {
                run_id: run.run_id.clone(),
            });
        }

        let run_id = self.ids.generate_ulid().to_string();
        state
            .executions
            .entry(request.workflow_id)
            .or_default()
            .push(WorkflowRun {
                run_id: run_id.clone(),
                workflow_type: request.workflow_type,
                task_list: request.task_list,
                input: request.input,
                status: ExecutionStatus::Running,
                result: None,
                failure: None,
                started_at: now,
                closed_at: None,
            });
        Ok(run_id)
    }

    async fn describe(&self, workflow_id: &str) -> Result<WorkflowDescription, WorkflowError> {
        self.ensure_available()?;
        let state = self.lock();
        let run = state
            .latest(workflow_id)
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
        Ok(WorkflowDescription {
            workflow_id: workflow_id.to_string(),
            run_id: run.run_id.clone(),
            workflow_type: run.workflow_type.clone(),
            task_list: run.task_list.clone(),
            status: run.status,
            result: run.result.clone(),
            failure: run.failure.clone(),
        })
    }

    async fn request_cancel(&self, workflow_id: &str) -> Result<bool, WorkflowError> {
        self.ensure_available()?;
        if self.lock().latest(workflow_id).is_none() {
            return Err(WorkflowError::NotFound(workflow_id.to_string()));
        }
        // Workflows here honour cancellation immediately.
        Ok(self.close(workflow_id, ExecutionStatus::Canceled, None, None))
    }
}
