//! LocalStack - インメモリ backend 一式を Router に配線する
//!
//! 開発・デモ・結合テスト用。本番では各 adapter に本物の native client を渡して
//! `RouterBuilder` を直接使います。

use std::sync::Arc;

use super::builder::{BuildError, RouterBuilder};
use super::router::Router;
use crate::config::RouterConfig;
use crate::impls::integration::{AutomationMode, InMemoryAutomationHub, IntegrationAdapter};
use crate::impls::queue::{HandlerRegistry, InMemoryQueueBackend, QueueAdapter, RegistryError, WorkerGroup};
use crate::impls::workflow::{InMemoryWorkflowBackend, WorkflowAdapter};
use crate::ports::{Clock, EventSink, IdGenerator, SnapshotStore, SystemClock, UlidGenerator};
use crate::typed::{Handler, PayloadSchemas, SchemaError, TypedTask};

#[derive(Debug, thiserror::Error)]
pub enum LocalStackError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Handler(#[from] RegistryError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("could not restore workflow state: {0}")]
    WorkflowState(#[from] serde_json::Error),
}

pub struct LocalStackBuilder {
    config: RouterConfig,
    clock: Option<Arc<dyn Clock>>,
    events: Option<Arc<dyn EventSink>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    handlers: HandlerRegistry,
    schemas: PayloadSchemas,
    automations: Vec<(String, AutomationMode)>,
    workers: Option<usize>,
    workflow_state: Option<String>,
}

impl LocalStackBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Registers a queue job handler and its payload schema.
    pub fn handler<T, H>(mut self, handler: H) -> Result<Self, LocalStackError>
    where
        T: TypedTask,
        H: Handler<T> + 'static,
    {
        self.handlers.register_typed::<T, H>(handler)?;
        // `schema::<T>()` may already have registered it.
        if !self.schemas.is_registered(T::TYPE) {
            self.schemas.register::<T>()?;
        }
        Ok(self)
    }

    /// Registers a payload schema for a task type with no queue handler
    /// (workflow types, automations). Fails on a duplicate.
    pub fn schema<T: TypedTask>(mut self) -> Result<Self, LocalStackError> {
        self.schemas.register::<T>()?;
        Ok(self)
    }

    pub fn automation(mut self, name: impl Into<String>, mode: AutomationMode) -> Self {
        self.automations.push((name.into(), mode));
        self
    }

    /// Overrides `queue.workers`. Zero leaves jobs waiting (useful in tests).
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    /// Continues from `InMemoryWorkflowBackend::export_state` output.
    pub fn restore_workflows(mut self, exported: impl Into<String>) -> Self {
        self.workflow_state = Some(exported.into());
        self
    }

    /// Wires everything and starts queue workers. Must run inside a tokio runtime.
    pub fn start(self) -> Result<LocalStack, LocalStackError> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::clone(&clock)));

        let queue = Arc::new(InMemoryQueueBackend::new(
            config.queue.lists.clone(),
            Arc::clone(&ids),
        ));
        let workflow = Arc::new(match &self.workflow_state {
            Some(exported) => {
                InMemoryWorkflowBackend::restore_state(exported, Arc::clone(&clock), Arc::clone(&ids))?
            }
            None => InMemoryWorkflowBackend::new(Arc::clone(&clock), Arc::clone(&ids)),
        });

        let mut hub = InMemoryAutomationHub::new(Arc::clone(&ids))
            .with_endpoint(config.integration.default_endpoint.clone());
        for endpoint in config.integration.endpoints.values() {
            hub = hub.with_endpoint(endpoint.clone());
        }
        for (name, mode) in self.automations {
            hub = hub.with_automation(name, mode);
        }
        let hub = Arc::new(hub);

        let queue_adapter =
            QueueAdapter::new(Arc::clone(&queue), &config.queue).with_schemas(self.schemas.clone());
        let workflow_adapter = WorkflowAdapter::new(Arc::clone(&workflow), &config.workflow)
            .with_schemas(self.schemas.clone());
        let integration_adapter =
            IntegrationAdapter::new(Arc::clone(&hub), &config.integration, Arc::clone(&ids))
                .with_schemas(self.schemas);

        let mut builder = RouterBuilder::new(config.clone())
            .adapter(Arc::new(queue_adapter))
            .adapter(Arc::new(workflow_adapter))
            .adapter(Arc::new(integration_adapter))
            .clock(clock);
        if let Some(events) = self.events {
            builder = builder.event_sink(events);
        }
        if let Some(store) = self.snapshots {
            builder = builder.snapshot_store(store);
        }
        let router = Arc::new(builder.build()?);

        let worker_count = self.workers.unwrap_or(config.queue.workers);
        let workers = (worker_count > 0).then(|| {
            WorkerGroup::spawn(
                worker_count,
                Arc::clone(&queue),
                config.queue.lists.clone(),
                Arc::new(self.handlers),
            )
        });

        Ok(LocalStack {
            router,
            queue,
            workflow,
            hub,
            workers,
        })
    }
}

/// Router plus the in-memory backends behind it.
pub struct LocalStack {
    pub router: Arc<Router>,
    pub queue: Arc<InMemoryQueueBackend>,
    pub workflow: Arc<InMemoryWorkflowBackend>,
    pub hub: Arc<InMemoryAutomationHub>,
    workers: Option<WorkerGroup>,
}

impl LocalStack {
    pub fn builder(config: RouterConfig) -> LocalStackBuilder {
        LocalStackBuilder {
            config,
            clock: None,
            events: None,
            snapshots: None,
            handlers: HandlerRegistry::new(),
            schemas: PayloadSchemas::new(),
            automations: Vec::new(),
            workers: None,
            workflow_state: None,
        }
    }

    /// Stops queue workers (in-flight jobs finish first).
    pub async fn shutdown(self) {
        if let Some(workers) = self.workers {
            workers.shutdown_and_join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecutionResult;
    use crate::typed::HandlerError;
    use crate::typed::task::fixtures::{ConvertController, PublishDocs};
    use async_trait::async_trait;

    struct Convert;

    #[async_trait]
    impl Handler<ConvertController> for Convert {
        async fn handle(&self, _task: ConvertController) -> Result<ExecutionResult, HandlerError> {
            Ok(ExecutionResult::default())
        }
    }

    #[test]
    fn duplicate_schema_is_an_error() {
        let err = LocalStack::builder(RouterConfig::default())
            .schema::<PublishDocs>()
            .and_then(|b| b.schema::<PublishDocs>())
            .err()
            .unwrap();
        assert!(matches!(err, LocalStackError::Schema(SchemaError::AlreadyRegistered(_))));
    }

    #[test]
    fn handler_after_schema_of_same_type_is_accepted() {
        let builder = LocalStack::builder(RouterConfig::default())
            .schema::<ConvertController>()
            .and_then(|b| b.handler::<ConvertController, _>(Convert));
        assert!(builder.is_ok());
    }

    #[test]
    fn duplicate_handler_is_an_error() {
        let err = LocalStack::builder(RouterConfig::default())
            .handler::<ConvertController, _>(Convert)
            .and_then(|b| b.handler::<ConvertController, _>(Convert))
            .err()
            .unwrap();
        assert!(matches!(err, LocalStackError::Handler(_)));
    }
}
