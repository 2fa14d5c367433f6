//! In-memory automation hub.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{AutomationClient, AutomationError, AutomationExecution, ExecutionPhase, TriggerReceipt};
use crate::ports::IdGenerator;

/// Whether an automation reports an execution id when triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationMode {
    Tracked,
    FireAndForget,
}

#[derive(Default)]
struct HubState {
    executions: HashMap<String, AutomationExecution>,
    /// automation -> number of accepted triggers
    triggers: HashMap<String, usize>,
}

/// Automation hub that keeps executions in memory.
///
/// Executions start in `new`; `advance` / `finish` / `error` stand in for the
/// automation actually running.
pub struct InMemoryAutomationHub {
    endpoints: BTreeSet<String>,
    automations: HashMap<String, AutomationMode>,
    state: Mutex<HubState>,
    ids: Arc<dyn IdGenerator>,
    available: AtomicBool,
}

impl InMemoryAutomationHub {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            endpoints: BTreeSet::new(),
            automations: HashMap::new(),
            state: Mutex::new(HubState::default()),
            ids,
            available: AtomicBool::new(true),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.insert(endpoint.into());
        self
    }

    pub fn with_automation(mut self, name: impl Into<String>, mode: AutomationMode) -> Self {
        self.automations.insert(name.into(), mode);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), AutomationError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AutomationError::Unavailable("hub did not answer".into()))
        }
    }

    pub fn trigger_count(&self, automation: &str) -> usize {
        self.lock().triggers.get(automation).copied().unwrap_or(0)
    }

    /// Moves an unfinished execution to `phase`. `false` if missing or finished.
    pub fn advance(&self, execution_id: &str, phase: ExecutionPhase) -> bool {
        let mut state = self.lock();
        match state.executions.get_mut(execution_id) {
            Some(exec) if !exec.phase.is_finished() => {
                exec.phase = phase;
                true
            }
            _ => false,
        }
    }

    pub fn finish(&self, execution_id: &str, output: serde_json::Value) -> bool {
        let mut state = self.lock();
        match state.executions.get_mut(execution_id) {
            Some(exec) if !exec.phase.is_finished() => {
                exec.phase = ExecutionPhase::Success;
                exec.output = Some(output);
                true
            }
            _ => false,
        }
    }

    pub fn error(&self, execution_id: &str, message: impl Into<String>) -> bool {
        let mut state = self.lock();
        match state.executions.get_mut(execution_id) {
            Some(exec) if !exec.phase.is_finished() => {
                exec.phase = ExecutionPhase::Error;
                exec.error = Some(message.into());
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl AutomationClient for InMemoryAutomationHub {
    async fn trigger(
        &self,
        endpoint: &str,
        automation: &str,
        _payload: serde_json::Value,
    ) -> Result<TriggerReceipt, AutomationError> {
        self.ensure_available()?;
        if !self.endpoints.contains(endpoint) {
            return Err(AutomationError::UnknownEndpoint(endpoint.to_string()));
        }
        let Some(mode) = self.automations.get(automation).copied() else {
            return Err(AutomationError::UnknownAutomation(automation.to_string()));
        };

        let mut state = self.lock();
        *state.triggers.entry(automation.to_string()).or_default() += 1;

        match mode {
            AutomationMode::FireAndForget => Ok(TriggerReceipt { execution_id: None }),
            AutomationMode::Tracked => {
                let id = format!("exec-{}", self.ids.generate_ulid());
                state.executions.insert(
                    id.clone(),
                    AutomationExecution {
                        id: id.clone(),
                        automation: automation.to_string(),
                        endpoint: endpoint.to_string(),
                        phase: ExecutionPhase::New,
                        output: None,
                        error: None,
                    },
                );
                Ok(TriggerReceipt {
                    execution_id: Some(id),
                })
            }
        }
    }

    async fn execution(&self, execution_id: &str) -> Result<AutomationExecution, AutomationError> {
        self.ensure_available()?;
        self.lock()
            .executions
            .get(execution_id)
            .cloned()
            .ok_or_else(|| AutomationError::NotFound(execution_id.to_string()))
    }

    async fn stop(&self, execution_id: &str) -> Result<bool, AutomationError> {
        self.ensure_available()?;
        let mut state = self.lock();
        let exec = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| AutomationError::NotFound(execution_id.to_string()))?;
        if exec.phase.is_finished() {
            return Ok(false);
        }
        exec.phase = ExecutionPhase::Canceled;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{SystemClock, UlidGenerator};
    use serde_json::json;

    fn hub() -> InMemoryAutomationHub {
        InMemoryAutomationHub::new(Arc::new(UlidGenerator::new(SystemClock)))
            .with_endpoint("automation-hub")
            .with_automation("sync-crm", AutomationMode::Tracked)
            .with_automation("ping-slack", AutomationMode::FireAndForget)
    }

    #[tokio::test]
    async fn tracked_trigger_returns_execution_id() {
        let hub = hub();
        let receipt = hub.trigger("automation-hub", "sync-crm", json!({})).await.unwrap();
        let id = receipt.execution_id.unwrap();

        let exec = hub.execution(&id).await.unwrap();
        assert_eq!(exec.phase, ExecutionPhase::New);
        assert_eq!(exec.automation, "sync-crm");
    }

    #[tokio::test]
    async fn fire_and_forget_has_no_execution_id() {
        let hub = hub();
        let receipt = hub.trigger("automation-hub", "ping-slack", json!({})).await.unwrap();
        assert_eq!(receipt.execution_id, None);
        assert_eq!(hub.trigger_count("ping-slack"), 1);
    }

    #[tokio::test]
    async fn unknown_endpoint_and_automation_are_errors() {
        let hub = hub();
        assert!(matches!(
            hub.trigger("elsewhere", "sync-crm", json!({})).await,
            Err(AutomationError::UnknownEndpoint(_))
        ));
        assert!(matches!(
            hub.trigger("automation-hub", "nope", json!({})).await,
            Err(AutomationError::UnknownAutomation(_))
        ));
    }

    #[tokio::test]
    async fn stop_only_unfinished_executions() {
        let hub = hub();
        let running = hub
            .trigger("automation-hub", "sync-crm", json!({}))
            .await
            .unwrap()
            .execution_id
            .unwrap();
        assert!(hub.advance(&running, ExecutionPhase::Running));
        assert!(hub.stop(&running).await.unwrap());
        assert_eq!(hub.execution(&running).await.unwrap().phase, ExecutionPhase::Canceled);

        let done = hub
            .trigger("automation-hub", "sync-crm", json!({}))
            .await
            .unwrap()
            .execution_id
            .unwrap();
        assert!(hub.finish(&done, json!({"synced": 4})));
        assert!(!hub.stop(&done).await.unwrap());
        assert!(!hub.error(&done, "late"));
    }
}
