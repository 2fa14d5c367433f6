//! RouterBuilder - Router の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 3 種類の backend kind 全てに adapter が揃っていなければ build() が失敗する
//! - 同じ kind の adapter を二重登録しても build() が失敗する
//!
//! 実行時に「分類先の adapter が無い」状態は作れません。

use std::collections::HashMap;
use std::sync::Arc;

use super::classifier::Classifier;
use super::router::Router;
use crate::config::RouterConfig;
use crate::domain::BackendKind;
use crate::ports::{
    BackendAdapter, Clock, EventSink, JsonFileSnapshotStore, SnapshotStore, SystemClock,
    TracingEventSink,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("no adapter registered for backend kind(s): {0:?}")]
    MissingBackends(Vec<BackendKind>),

    #[error("more than one adapter registered for backend kind {0}")]
    DuplicateBackend(BackendKind),
}

/// # 使用例
/// ```ignore
/// let router = RouterBuilder::new(config)
///     .adapter(Arc::new(queue_adapter))
///     .adapter(Arc::new(workflow_adapter))
///     .adapter(Arc::new(integration_adapter))
///     .build()?;
/// ```
pub struct RouterBuilder {
    config: RouterConfig,
    adapters: Vec<Arc<dyn BackendAdapter>>,
    clock: Option<Arc<dyn Clock>>,
    events: Option<Arc<dyn EventSink>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
}

impl RouterBuilder {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            adapters: Vec::new(),
            clock: None,
            events: None,
            snapshots: None,
        }
    }

    pub fn adapter(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Defaults to `SystemClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to `TracingEventSink`.
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Defaults to a JSON file at `registry.snapshot_path`, or none.
    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn build(self) -> Result<Router, BuildError> {
        let mut adapters: HashMap<BackendKind, Arc<dyn BackendAdapter>> = HashMap::new();
        for adapter in self.adapters {
            let kind = adapter.kind();
            if adapters.insert(kind, adapter).is_some() {
                return Err(BuildError::DuplicateBackend(kind));
            }
        }

        let missing: Vec<BackendKind> = BackendKind::ALL
            .iter()
            .copied()
            .filter(|kind| !adapters.contains_key(kind))
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingBackends(missing));
        }

        let snapshots = self.snapshots.or_else(|| {
            self.config
                .registry
                .snapshot_path
                .as_ref()
                .map(|path| Arc::new(JsonFileSnapshotStore::new(path)) as Arc<dyn SnapshotStore>)
        });

        Ok(Router::new(
            Classifier::new(&self.config.classifier),
            adapters,
            self.config.router,
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            self.events.unwrap_or_else(|| Arc::new(TracingEventSink)),
            snapshots,
        ))
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        NativeId, RawBackendStatus, StatusQueryError, SubmissionError, TaskDescription,
    };
    use async_trait::async_trait;

    struct Stub(BackendKind);

    #[async_trait]
    impl BackendAdapter for Stub {
        fn kind(&self) -> BackendKind {
            self.0
        }

        async fn submit(&self, _task: &TaskDescription) -> Result<NativeId, SubmissionError> {
            Err(SubmissionError::rejected("stub"))
        }

        async fn query_status(&self, id: &NativeId) -> Result<RawBackendStatus, StatusQueryError> {
            Err(StatusQueryError::NotFound(id.clone()))
        }

        async fn cancel(&self, _id: &NativeId) -> Result<bool, StatusQueryError> {
            Ok(false)
        }
    }

    #[test]
    fn build_success() {
        let router = RouterBuilder::default()
            .adapter(Arc::new(Stub(BackendKind::Queue)))
            .adapter(Arc::new(Stub(BackendKind::DurableWorkflow)))
            .adapter(Arc::new(Stub(BackendKind::ExternalIntegration)))
            .build();
        assert!(router.is_ok());
    }

    #[test]
    fn build_reports_missing_backends() {
        let err = RouterBuilder::default()
            .adapter(Arc::new(Stub(BackendKind::Queue)))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingBackends(vec![
                BackendKind::DurableWorkflow,
                BackendKind::ExternalIntegration
            ])
        );
    }

    #[test]
    fn build_rejects_duplicate_backend() {
        let err = RouterBuilder::default()
            .adapter(Arc::new(Stub(BackendKind::Queue)))
            .adapter(Arc::new(Stub(BackendKind::Queue)))
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::DuplicateBackend(BackendKind::Queue));
    }

    #[tokio::test]
    async fn snapshot_path_in_config_enables_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RouterConfig::default();
        config.registry.snapshot_path = Some(dir.path().join("registry.json"));

        let router = RouterBuilder::new(config)
            .adapter(Arc::new(Stub(BackendKind::Queue)))
            .adapter(Arc::new(Stub(BackendKind::DurableWorkflow)))
            .adapter(Arc::new(Stub(BackendKind::ExternalIntegration)))
            .build()
            .unwrap();
        assert!(router.persist().await.unwrap());
        assert!(dir.path().join("registry.json").exists());
    }
}
