use std::sync::Arc;

use async_trait::async_trait;

use super::{AutomationClient, AutomationError};
use crate::config::IntegrationConfig;
use crate::domain::{
    BackendKind, NativeId, RawBackendStatus, StatusQueryError, SubmissionError, TaskDescription,
};
use crate::ports::{BackendAdapter, IdGenerator};
use crate::typed::PayloadSchemas;

/// Correlation ids issued for automations that report no execution id.
pub const FIRE_AND_FORGET_PREFIX: &str = "ext-";

/// Phase reported for correlation ids: the trigger was accepted, nothing more is known.
pub const FIRE_AND_FORGET_PHASE: &str = "fire-and-forget";

/// `BackendAdapter` for the external automation hub.
///
/// Endpoint resolution: `queue_hint`, then `integration.endpoints[task.type]`,
/// then `integration.default_endpoint`.
pub struct IntegrationAdapter<C> {
    client: Arc<C>,
    config: IntegrationConfig,
    ids: Arc<dyn IdGenerator>,
    schemas: PayloadSchemas,
}

impl<C: AutomationClient> IntegrationAdapter<C> {
    pub fn new(client: Arc<C>, config: &IntegrationConfig, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            client,
            config: config.clone(),
            ids,
            schemas: PayloadSchemas::default(),
        }
    }

    pub fn with_schemas(mut self, schemas: PayloadSchemas) -> Self {
        self.schemas = schemas;
        self
    }

    fn endpoint_for<'a>(&'a self, task: &'a TaskDescription) -> &'a str {
        task.queue_hint
            .as_deref()
            .unwrap_or_else(|| self.config.endpoint_for(task.task_type.as_str()))
    }
}

fn is_correlation_id(native_id: &NativeId) -> bool {
    native_id.as_str().starts_with(FIRE_AND_FORGET_PREFIX)
}

fn query_error(native_id: &NativeId, err: AutomationError) -> StatusQueryError {
    match err {
        AutomationError::NotFound(_) => StatusQueryError::NotFound(native_id.clone()),
        other => StatusQueryError::BackendUnavailable(other.to_string()),
    }
}

#[async_trait]
impl<C: AutomationClient + 'static> BackendAdapter for IntegrationAdapter<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::ExternalIntegration
    }

    async fn submit(&self, task: &TaskDescription) -> Result<NativeId, SubmissionError> {
        self.schemas
            .check(task.task_type.as_str(), &task.payload)
            .map_err(|e| SubmissionError::rejected(e.to_string()))?;

        let endpoint = self.endpoint_for(task);
        let receipt = self
            .client
            .trigger(endpoint, task.task_type.as_str(), task.payload.clone())
            .await
            .map_err(|e| match e {
                AutomationError::Unavailable(msg) => SubmissionError::unreachable(msg),
                other => SubmissionError::rejected(other.to_string()),
            })?;

        let native_id = match receipt.execution_id {
            Some(id) => NativeId::new(id),
            None => {
                let id = self.ids.generate_native_id(FIRE_AND_FORGET_PREFIX);
                tracing::debug!(task_id = %task.id(), endpoint, native_id = %id, "fire-and-forget automation, issued correlation id");
                id
            }
        };
        Ok(native_id)
    }

    async fn query_status(&self, native_id: &NativeId) -> Result<RawBackendStatus, StatusQueryError> {
        if is_correlation_id(native_id) {
            return Ok(RawBackendStatus::new(FIRE_AND_FORGET_PHASE));
        }

        let exec = self
            .client
            .execution(native_id.as_str())
            .await
            .map_err(|e| query_error(native_id, e))?;
        let mut raw = RawBackendStatus::new(exec.phase.as_str());
        if let Some(output) = exec.output {
            raw = raw.with_output(output);
        }
        if let Some(error) = exec.error {
            raw = raw.with_error(error);
        }
        Ok(raw)
    }

    async fn cancel(&self, native_id: &NativeId) -> Result<bool, StatusQueryError> {
        if is_correlation_id(native_id) {
            return Ok(false);
        }
        match self.client.stop(native_id.as_str()).await {
            Ok(stopped) => Ok(stopped),
            Err(AutomationError::NotFound(_)) => Ok(false),
            Err(e) => Err(query_error(native_id, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::impls::integration::{AutomationMode, ExecutionPhase, InMemoryAutomationHub};
    use crate::ports::{SystemClock, UlidGenerator};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn setup() -> (Arc<InMemoryAutomationHub>, IntegrationAdapter<InMemoryAutomationHub>) {
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(SystemClock));
        let hub = Arc::new(
            InMemoryAutomationHub::new(Arc::clone(&ids))
                .with_endpoint("automation-hub")
                .with_endpoint("docs-hub")
                .with_automation("sync-crm", AutomationMode::Tracked)
                .with_automation("publish-docs", AutomationMode::Tracked)
                .with_automation("ping-slack", AutomationMode::FireAndForget),
        );
        let config = IntegrationConfig {
            default_endpoint: "automation-hub".into(),
            endpoints: BTreeMap::from([("publish-docs".to_string(), "docs-hub".to_string())]),
        };
        let adapter = IntegrationAdapter::new(Arc::clone(&hub), &config, ids);
        (hub, adapter)
    }

    #[tokio::test]
    async fn endpoint_resolution_order() {
        let (hub, adapter) = setup();

        let mapped = adapter
            .submit(&TaskDescription::new("t1", "publish-docs"))
            .await
            .unwrap();
        assert_eq!(hub.execution(mapped.as_str()).await.unwrap().endpoint, "docs-hub");

        let hinted = adapter
            .submit(&TaskDescription::new("t2", "publish-docs").with_queue_hint("automation-hub"))
            .await
            .unwrap();
        assert_eq!(hub.execution(hinted.as_str()).await.unwrap().endpoint, "automation-hub");

        let default = adapter
            .submit(&TaskDescription::new("t3", "sync-crm"))
            .await
            .unwrap();
        assert_eq!(hub.execution(default.as_str()).await.unwrap().endpoint, "automation-hub");
    }

    #[tokio::test]
    async fn fire_and_forget_gets_correlation_id() {
        let (_, adapter) = setup();
        let native = adapter
            .submit(&TaskDescription::new("t1", "ping-slack"))
            .await
            .unwrap();
        assert!(native.as_str().starts_with(FIRE_AND_FORGET_PREFIX));

        let raw = adapter.query_status(&native).await.unwrap();
        assert_eq!(raw.phase, FIRE_AND_FORGET_PHASE);
        assert!(!adapter.cancel(&native).await.unwrap());
    }

    #[tokio::test]
    async fn tracked_execution_phases_pass_through() {
        let (hub, adapter) = setup();
        let native = adapter
            .submit(&TaskDescription::new("t1", "sync-crm"))
            .await
            .unwrap();
        hub.advance(native.as_str(), ExecutionPhase::Running);
        assert_eq!(adapter.query_status(&native).await.unwrap().phase, "running");

        hub.error(native.as_str(), "401 from CRM");
        let raw = adapter.query_status(&native).await.unwrap();
        assert_eq!(raw.phase, "error");
        assert_eq!(raw.error.as_deref(), Some("401 from CRM"));
        assert!(!adapter.cancel(&native).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_automation_is_permanent() {
        let (_, adapter) = setup();
        let err = adapter
            .submit(&TaskDescription::new("t1", "does-not-exist"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn hub_outage_maps_to_transient_and_unavailable() {
        let (hub, adapter) = setup();
        let native = adapter
            .submit(&TaskDescription::new("t1", "sync-crm"))
            .await
            .unwrap();
        hub.set_available(false);

        assert!(matches!(
            adapter.query_status(&native).await,
            Err(StatusQueryError::BackendUnavailable(_))
        ));
        let err = adapter
            .submit(&TaskDescription::new("t2", "sync-crm"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transient);
    }
}
