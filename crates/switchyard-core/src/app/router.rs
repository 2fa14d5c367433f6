//! Router - 呼び出し側に見える唯一の窓口
//!
//! 1 task の流れ: NotSubmitted → Scheduled → (adapter からの状態: pull / push) → Terminal
//!
//! # 並行性
//! - Registry は DashMap。adapter 呼び出し中は registry の guard を一切持たない
//! - 同じ task_id の schedule だけを直列化する（task_id ごとの async mutex）
//! - 違う task_id 同士はブロックし合わない

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;

use super::classifier::Classifier;
use super::registry::{TaskFilter, TaskRegistry};
use super::status;
use crate::config::RouterSettings;
use crate::domain::{
    BackendKind, NativeId, RawBackendStatus, RegistryRecord, RouterError, RouterEvent,
    StatusQueryError, TaskDescription, TaskHandle, TaskId, TaskState, TaskStatus,
};
use crate::ports::{BackendAdapter, Clock, EventSink, RegistrySnapshot, SnapshotError, SnapshotStore};

pub struct Router {
    classifier: Classifier,
    adapters: HashMap<BackendKind, Arc<dyn BackendAdapter>>,
    registry: TaskRegistry,
    schedule_locks: DashMap<TaskId, Arc<Mutex<()>>>,
    settings: RouterSettings,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<BackendKind> = self.adapters.keys().copied().collect();
        kinds.sort();
        f.debug_struct("Router")
            .field("classifier", &self.classifier)
            .field("backends", &kinds)
            .field("tasks", &self.registry.len())
            .finish()
    }
}

impl Router {
    /// Use `RouterBuilder`; it checks that every backend kind has an adapter.
    pub(crate) fn new(
        classifier: Classifier,
        adapters: HashMap<BackendKind, Arc<dyn BackendAdapter>>,
        settings: RouterSettings,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        Self {
            classifier,
            adapters,
            registry: TaskRegistry::new(),
            schedule_locks: DashMap::new(),
            settings,
            clock,
            events,
            snapshots,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn adapter(&self, kind: BackendKind, task_id: &TaskId) -> Result<&Arc<dyn BackendAdapter>, RouterError> {
        self.adapters
            .get(&kind)
            .ok_or_else(|| RouterError::Classification {
                task_id: task_id.clone(),
                kind,
            })
    }

    fn schedule_lock(&self, task_id: &TaskId) -> Arc<Mutex<()>> {
        self.schedule_locks
            .entry(task_id.clone())
            .or_default()
            .value()
            .clone()
    }

    /// Classifies and submits a task, returning its handle.
    ///
    /// Idempotent per task id: while the task is pending or running, calling
    /// this again returns the existing handle without touching the backend.
    /// A task whose previous run is terminal is submitted afresh. A task with
    /// an accepted cancel counts as live until its backend confirms a terminal
    /// state; the backend is asked once here before deciding.
    pub async fn schedule_task(&self, task: &TaskDescription) -> Result<TaskHandle, RouterError> {
        task.validate()?;
        let task_id = task.id().clone();

        let lock = self.schedule_lock(&task_id);
        let result = {
            let _guard = lock.lock().await;
            self.schedule_locked(task, &task_id).await
        };

        // Failed ids never reach the registry, so eviction would not clean their lock up.
        if result.is_err() {
            drop(lock);
            self.schedule_locks
                .remove_if(&task_id, |_, l| Arc::strong_count(l) == 1);
        }
        result
    }

    async fn schedule_locked(&self, task: &TaskDescription, task_id: &TaskId) -> Result<TaskHandle, RouterError> {
        if self
            .registry
            .get(task_id)
            .is_some_and(|existing| existing.cancel_requested)
        {
            match self.get_task_status(task_id).await {
                Ok(_) | Err(RouterError::TaskNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(existing) = self.registry.get(task_id)
            && !existing.is_settled()
        {
            tracing::debug!(%task_id, native_id = %existing.handle.backend_native_id(), "task already scheduled");
            return Ok(existing.handle);
        }

        let kind = self.classifier.classify(task);
        let adapter = self.adapter(kind, task_id)?;
        let native_id = self.submit_with_retry(adapter.as_ref(), task, kind).await?;

        let handle = TaskHandle::new(task_id.clone(), kind, native_id, self.clock.now());
        self.registry
            .insert(RegistryRecord::new(handle.clone(), task.tags.clone()));
        self.events.emit(RouterEvent::TaskScheduled {
            handle: handle.clone(),
        });
        Ok(handle)
    }

    async fn submit_with_retry(
        &self,
        adapter: &dyn BackendAdapter,
        task: &TaskDescription,
        kind: BackendKind,
    ) -> Result<NativeId, RouterError> {
        let policy = task
            .retry_policy
            .unwrap_or_else(|| self.settings.default_retry_policy());
        let mut attempt = 0;
        loop {
            attempt += 1;
            match adapter.submit(task).await {
                Ok(native_id) => return Ok(native_id),
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        task_id = %task.id(),
                        backend = %kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "submit failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::warn!(task_id = %task.id(), backend = %kind, attempt, error = %err, "submit failed, giving up");
                    return Err(RouterError::SchedulingFailed {
                        task_id: task.id().clone(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    /// Current status, refreshed from the backend unless already final.
    ///
    /// An unreachable backend yields `Unknown` and leaves the recorded status alone.
    pub async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus, RouterError> {
        let record = self
            .registry
            .get(task_id)
            .ok_or_else(|| RouterError::TaskNotFound(task_id.clone()))?;
        if !record.needs_refresh() {
            return Ok(record.status);
        }

        let kind = record.handle.backend_kind();
        let native_id = record.handle.backend_native_id();
        let adapter = self.adapter(kind, task_id)?;

        let observed = match adapter.query_status(native_id).await {
            Ok(raw) => status::map_status(kind, raw),
            Err(StatusQueryError::BackendUnavailable(reason)) => {
                tracing::warn!(%task_id, backend = %kind, %native_id, %reason, "status unavailable");
                return Ok(TaskStatus::unknown());
            }
            // The backend forgot a task we asked it to cancel: that is the cancel.
            Err(StatusQueryError::NotFound(_)) if record.cancel_requested => TaskStatus::cancelled(),
            Err(StatusQueryError::NotFound(_)) => {
                tracing::warn!(%task_id, backend = %kind, %native_id, "task vanished from backend");
                status::vanished()
            }
        };
        Ok(self.apply_observed(task_id, observed))
    }

    /// Push path for backends that notify instead of being polled.
    pub fn record_pushed_status(
        &self,
        task_id: &TaskId,
        raw: RawBackendStatus,
    ) -> Result<TaskStatus, RouterError> {
        let record = self
            .registry
            .get(task_id)
            .ok_or_else(|| RouterError::TaskNotFound(task_id.clone()))?;
        let observed = status::map_status(record.handle.backend_kind(), raw);
        Ok(self.apply_observed(task_id, observed))
    }

    /// Merges an observed status into the registry and returns what the
    /// caller should see. `Unknown` is passed through without being stored.
    fn apply_observed(&self, task_id: &TaskId, observed: TaskStatus) -> TaskStatus {
        if observed.state == TaskState::Unknown {
            return observed;
        }
        let now = self.clock.now();
        let merged = self.registry.update(task_id, |record| {
            let from = record.state();
            record.apply(observed.clone(), now);
            (from, record.status.clone(), record.handle.backend_kind())
        });

        // Evicted while we were asking the backend.
        let Some((from, current, backend)) = merged else {
            return observed;
        };
        if from != current.state {
            self.events.emit(RouterEvent::StatusChanged {
                task_id: task_id.clone(),
                backend,
                from,
                to: current.state,
            });
        }
        current
    }

    /// Best-effort cancellation. `Ok(false)` when the backend declined,
    /// could not be reached, or the task is already terminal.
    pub async fn cancel_task(&self, task_id: &TaskId) -> Result<bool, RouterError> {
        let record = self
            .registry
            .get(task_id)
            .ok_or_else(|| RouterError::TaskNotFound(task_id.clone()))?;
        if record.is_terminal() {
            return Ok(false);
        }

        let kind = record.handle.backend_kind();
        let native_id = record.handle.backend_native_id();
        let adapter = self.adapter(kind, task_id)?;

        match adapter.cancel(native_id).await {
            Ok(true) => {
                let now = self.clock.now();
                let marked = self
                    .registry
                    .update(task_id, |r| r.mark_cancel_requested(now))
                    .unwrap_or(false);
                if marked {
                    self.events.emit(RouterEvent::TaskCancelled {
                        task_id: task_id.clone(),
                        backend: kind,
                    });
                }
                Ok(marked)
            }
            Ok(false) => {
                tracing::debug!(%task_id, backend = %kind, "cancel declined by backend");
                Ok(false)
            }
            Err(err) => {
                tracing::warn!(%task_id, backend = %kind, error = %err, "cancel failed");
                Ok(false)
            }
        }
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Vec<TaskHandle> {
        self.registry.list(filter)
    }

    pub fn handle(&self, task_id: &TaskId) -> Option<TaskHandle> {
        self.registry.get(task_id).map(|r| r.handle)
    }

    pub fn task_count(&self) -> usize {
        self.registry.len()
    }

    /// Drops terminal entries not updated within `max_age`. Never implicit.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let Some(cutoff) = self.clock.now().checked_sub_signed(max_age) else {
            return 0;
        };

        let evicted = self.registry.evict_terminal_before(cutoff);
        for task_id in &evicted {
            self.schedule_locks.remove(task_id);
            self.events.emit(RouterEvent::TaskEvicted {
                task_id: task_id.clone(),
            });
        }
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "evicted terminal tasks");
        }
        evicted.len()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    pub fn restore(&self, snapshot: RegistrySnapshot) -> usize {
        self.registry.restore(snapshot)
    }

    /// Saves the registry to the configured store. `Ok(false)` without one.
    pub async fn persist(&self) -> Result<bool, SnapshotError> {
        let Some(store) = &self.snapshots else {
            return Ok(false);
        };
        store.save(&self.registry.snapshot()).await?;
        Ok(true)
    }

    /// Loads the last persisted registry, if any. Returns the number of records restored.
    pub async fn load_persisted(&self) -> Result<usize, SnapshotError> {
        let Some(store) = &self.snapshots else {
            return Ok(0);
        };
        Ok(store
            .load()
            .await?
            .map(|snapshot| self.registry.restore(snapshot))
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RouterBuilder;
    use crate::config::RouterConfig;
    use crate::domain::{Backoff, ErrorKind, RetryPolicy, SubmissionError};
    use crate::ports::{FixedClock, MemoryEventSink, MemorySnapshotStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted adapter that counts calls.
    struct FakeAdapter {
        kind: BackendKind,
        submits: AtomicUsize,
        submit_script: StdMutex<VecDeque<Result<(), SubmissionError>>>,
        submit_delay: Duration,
        /// task id -> gate its `submit` waits on
        gates: StdMutex<HashMap<String, Arc<tokio::sync::Notify>>>,
        status: StdMutex<Result<RawBackendStatus, StatusQueryError>>,
        cancel: StdMutex<Result<bool, StatusQueryError>>,
    }

    impl FakeAdapter {
        fn new(kind: BackendKind) -> Self {
            Self {
                kind,
                submits: AtomicUsize::new(0),
                submit_script: StdMutex::new(VecDeque::new()),
                submit_delay: Duration::ZERO,
                gates: StdMutex::new(HashMap::new()),
                status: StdMutex::new(Ok(RawBackendStatus::new(pending_phase(kind)))),
                cancel: StdMutex::new(Ok(true)),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.submit_delay = delay;
            self
        }

        /// Holds `submit` for `task_id` until the returned gate is notified.
        fn gate(&self, task_id: &str) -> Arc<tokio::sync::Notify> {
            let gate = Arc::new(tokio::sync::Notify::new());
            self.gates
                .lock()
                .unwrap()
                .insert(task_id.to_string(), Arc::clone(&gate));
            gate
        }

        fn script(&self, results: Vec<Result<(), SubmissionError>>) {
            *self.submit_script.lock().unwrap() = results.into();
        }

        fn set_status(&self, status: Result<RawBackendStatus, StatusQueryError>) {
            *self.status.lock().unwrap() = status;
        }

        fn set_cancel(&self, result: Result<bool, StatusQueryError>) {
            *self.cancel.lock().unwrap() = result;
        }

        fn submits(&self) -> usize {
            self.submits.load(Ordering::SeqCst)
        }
    }

    fn pending_phase(kind: BackendKind) -> &'static str {
        match kind {
            BackendKind::Queue => "waiting",
            BackendKind::DurableWorkflow => "RUNNING",
            BackendKind::ExternalIntegration => "queued",
        }
    }

    #[async_trait]
    impl BackendAdapter for FakeAdapter {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn submit(&self, task: &TaskDescription) -> Result<NativeId, SubmissionError> {
            let n = self.submits.fetch_add(1, Ordering::SeqCst);
            if !self.submit_delay.is_zero() {
                tokio::time::sleep(self.submit_delay).await;
            }
            let gate = self.gates.lock().unwrap().get(task.id().as_str()).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let scripted = self.submit_script.lock().unwrap().pop_front();
            if let Some(Err(e)) = scripted {
                return Err(e);
            }
            Ok(NativeId::new(format!("{}-{}-{n}", self.kind, task.id())))
        }

        async fn query_status(&self, _id: &NativeId) -> Result<RawBackendStatus, StatusQueryError> {
            self.status.lock().unwrap().clone()
        }

        async fn cancel(&self, _id: &NativeId) -> Result<bool, StatusQueryError> {
            self.cancel.lock().unwrap().clone()
        }
    }

    struct Harness {
        router: Router,
        queue: Arc<FakeAdapter>,
        workflow: Arc<FakeAdapter>,
        integration: Arc<FakeAdapter>,
        events: Arc<MemoryEventSink>,
        clock: Arc<FixedClock>,
    }

    fn harness_with(queue: FakeAdapter) -> Harness {
        let queue = Arc::new(queue);
        let workflow = Arc::new(FakeAdapter::new(BackendKind::DurableWorkflow));
        let integration = Arc::new(FakeAdapter::new(BackendKind::ExternalIntegration));
        let events = Arc::new(MemoryEventSink::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));

        let mut config = RouterConfig::default();
        config.router.default_backoff = Backoff::fixed(1);

        let router = RouterBuilder::new(config)
            .adapter(queue.clone())
            .adapter(workflow.clone())
            .adapter(integration.clone())
            .clock(clock.clone())
            .event_sink(events.clone())
            .snapshot_store(Arc::new(MemorySnapshotStore::new()))
            .build()
            .unwrap();

        Harness {
            router,
            queue,
            workflow,
            integration,
            events,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeAdapter::new(BackendKind::Queue))
    }

    #[tokio::test]
    async fn durable_task_goes_to_workflow_backend() {
        let h = harness();
        let task = TaskDescription::new("migrate", "migrate-db")
            .durable()
            .with_tag("external-integration");

        let handle = h.router.schedule_task(&task).await.unwrap();
        assert_eq!(handle.backend_kind(), BackendKind::DurableWorkflow);
        assert_eq!(h.workflow.submits(), 1);
        assert_eq!(h.integration.submits(), 0);
        assert_eq!(
            h.router.get_task_status(&"migrate".into()).await.unwrap().state,
            TaskState::Running
        );
    }

    #[tokio::test]
    async fn external_tag_goes_to_integration_backend() {
        let h = harness();
        let task = TaskDescription::new("sync", "sync-crm").with_tag("external-integration");
        let handle = h.router.schedule_task(&task).await.unwrap();
        assert_eq!(handle.backend_kind(), BackendKind::ExternalIntegration);
        assert_eq!(h.integration.submits(), 1);
    }

    #[tokio::test]
    async fn rescheduling_a_live_task_returns_same_handle() {
        let h = harness();
        let task = TaskDescription::new("resize-1", "resize");

        let first = h.router.schedule_task(&task).await.unwrap();
        let second = h.router.schedule_task(&task).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.queue.submits(), 1);
        assert_eq!(h.events.events().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_same_id_scheduling_submits_once() {
        let h = harness_with(FakeAdapter::new(BackendKind::Queue).with_delay(Duration::from_millis(20)));
        let router = Arc::new(h.router);
        let task = TaskDescription::new("resize-1", "resize");

        let mut joins = Vec::new();
        for _ in 0..8 {
            let router = Arc::clone(&router);
            let task = task.clone();
            joins.push(tokio::spawn(async move { router.schedule_task(&task).await }));
        }
        let mut handles = Vec::new();
        for j in joins {
            handles.push(j.await.unwrap().unwrap());
        }

        assert!(handles.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(h.queue.submits(), 1);
    }

    #[tokio::test]
    async fn terminal_task_is_submitted_again() {
        let h = harness();
        let task = TaskDescription::new("resize-1", "resize");
        let first = h.router.schedule_task(&task).await.unwrap();

        h.queue.set_status(Ok(RawBackendStatus::new("failed").with_error("oom")));
        assert_eq!(
            h.router.get_task_status(task.id()).await.unwrap().state,
            TaskState::Failed
        );

        let second = h.router.schedule_task(&task).await.unwrap();
        assert_ne!(first.backend_native_id(), second.backend_native_id());
        assert_eq!(h.queue.submits(), 2);
    }

    #[tokio::test]
    async fn transient_submit_failure_is_retried() {
        let h = harness();
        h.queue.script(vec![Err(SubmissionError::unreachable("refused")), Ok(())]);

        let handle = h
            .router
            .schedule_task(&TaskDescription::new("t1", "resize"))
            .await
            .unwrap();
        assert_eq!(handle.backend_kind(), BackendKind::Queue);
        assert_eq!(h.queue.submits(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_report_scheduling_failed() {
        let h = harness();
        h.queue.script(vec![
            Err(SubmissionError::unreachable("refused 1")),
            Err(SubmissionError::unreachable("refused 2")),
        ]);
        let task = TaskDescription::new("t1", "resize")
            .with_retry_policy(RetryPolicy::new(2, Backoff::fixed(1)));

        let err = h.router.schedule_task(&task).await.unwrap_err();
        match err {
            RouterError::SchedulingFailed {
                task_id,
                attempts,
                source,
            } => {
                assert_eq!(task_id.as_str(), "t1");
                assert_eq!(attempts, 2);
                assert_eq!(source.message, "refused 2");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(h.router.handle(&"t1".into()).is_none());
    }

    #[tokio::test]
    async fn permanent_rejection_is_not_retried() {
        let h = harness();
        h.queue.script(vec![Err(SubmissionError::rejected("bad payload"))]);

        let err = h
            .router
            .schedule_task(&TaskDescription::new("t1", "resize"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::SchedulingFailed { attempts: 1, ref source, .. } if source.kind == ErrorKind::Permanent
        ));
        assert_eq!(h.queue.submits(), 1);
    }

    #[tokio::test]
    async fn invalid_task_is_rejected_before_submit() {
        let h = harness();
        let err = h
            .router
            .schedule_task(&TaskDescription::new("", "resize"))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidTask(_)));
        assert_eq!(h.queue.submits(), 0);
    }

    #[tokio::test]
    async fn unavailable_backend_reports_unknown_and_keeps_last_status() {
        let h = harness();
        let task = TaskDescription::new("t1", "resize");
        h.router.schedule_task(&task).await.unwrap();

        h.queue.set_status(Ok(RawBackendStatus::new("active")));
        assert_eq!(h.router.get_task_status(task.id()).await.unwrap().state, TaskState::Running);

        h.queue
            .set_status(Err(StatusQueryError::BackendUnavailable("timeout".into())));
        assert_eq!(h.router.get_task_status(task.id()).await.unwrap().state, TaskState::Unknown);

        let listed = h
            .router
            .list_tasks(&TaskFilter::all().with_status(TaskState::Running));
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn vanished_task_is_failed() {
        let h = harness();
        let task = TaskDescription::new("t1", "resize");
        let handle = h.router.schedule_task(&task).await.unwrap();

        h.queue.set_status(Err(StatusQueryError::NotFound(
            handle.backend_native_id().clone(),
        )));
        let status = h.router.get_task_status(task.id()).await.unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.error_info.unwrap().message, status::VANISHED_MESSAGE);
    }

    #[tokio::test]
    async fn unknown_task_id_is_not_found() {
        let h = harness();
        let err = h.router.get_task_status(&"ghost".into()).await.unwrap_err();
        assert!(matches!(err, RouterError::TaskNotFound(_)));
        assert!(matches!(
            h.router.cancel_task(&"ghost".into()).await,
            Err(RouterError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_task_never_reverts() {
        let h = harness();
        let task = TaskDescription::new("t1", "resize");
        h.router.schedule_task(&task).await.unwrap();

        assert!(h.router.cancel_task(task.id()).await.unwrap());
        assert_eq!(h.router.get_task_status(task.id()).await.unwrap().state, TaskState::Cancelled);

        for phase in ["active", "waiting", "delayed"] {
            h.queue.set_status(Ok(RawBackendStatus::new(phase)));
            let state = h.router.get_task_status(task.id()).await.unwrap().state;
            assert_eq!(state, TaskState::Cancelled, "phase {phase}");
        }

        // Backend forgot the job: the cancel took effect.
        h.queue
            .set_status(Err(StatusQueryError::NotFound("gone".into())));
        assert_eq!(h.router.get_task_status(task.id()).await.unwrap().state, TaskState::Cancelled);
        assert!(!h.router.cancel_task(task.id()).await.unwrap());

        let cancelled: Vec<_> = h
            .events
            .events()
            .into_iter()
            .filter(|e| matches!(e, RouterEvent::TaskCancelled { .. }))
            .collect();
        assert_eq!(cancelled.len(), 1);
    }

    #[tokio::test]
    async fn declined_or_failed_cancel_leaves_entry_alone() {
        let h = harness();
        let task = TaskDescription::new("t1", "resize");
        h.router.schedule_task(&task).await.unwrap();
        h.queue.set_status(Ok(RawBackendStatus::new("active")));
        h.router.get_task_status(task.id()).await.unwrap();

        h.queue.set_cancel(Ok(false));
        assert!(!h.router.cancel_task(task.id()).await.unwrap());

        h.queue
            .set_cancel(Err(StatusQueryError::BackendUnavailable("down".into())));
        assert!(!h.router.cancel_task(task.id()).await.unwrap());

        assert_eq!(h.router.get_task_status(task.id()).await.unwrap().state, TaskState::Running);
    }

    #[tokio::test]
    async fn final_status_is_served_from_registry() {
        let h = harness();
        let task = TaskDescription::new("t1", "resize");
        h.router.schedule_task(&task).await.unwrap();
        h.queue.set_status(Ok(RawBackendStatus::new("completed")));
        h.router.get_task_status(task.id()).await.unwrap();

        // Even an outage no longer matters.
        h.queue
            .set_status(Err(StatusQueryError::BackendUnavailable("down".into())));
        assert_eq!(h.router.get_task_status(task.id()).await.unwrap().state, TaskState::Completed);
    }

    #[tokio::test]
    async fn pushed_status_uses_same_merge() {
        let h = harness();
        let task = TaskDescription::new("sync", "sync-crm").with_tag("external-integration");
        h.router.schedule_task(&task).await.unwrap();

        let status = h
            .router
            .record_pushed_status(task.id(), RawBackendStatus::new("running"))
            .unwrap();
        assert_eq!(status.state, TaskState::Running);

        let status = h
            .router
            .record_pushed_status(task.id(), RawBackendStatus::new("not-a-phase"))
            .unwrap();
        assert_eq!(status.state, TaskState::Unknown);

        h.router
            .record_pushed_status(task.id(), RawBackendStatus::new("success"))
            .unwrap();
        assert_eq!(h.router.get_task_status(task.id()).await.unwrap().state, TaskState::Completed);

        let changes = h
            .events
            .events()
            .into_iter()
            .filter(|e| matches!(e, RouterEvent::StatusChanged { .. }))
            .count();
        assert_eq!(changes, 2);
    }

    #[tokio::test]
    async fn eviction_respects_age_and_terminality() {
        let h = harness();
        for id in ["done", "live"] {
            h.router
                .schedule_task(&TaskDescription::new(id, "resize"))
                .await
                .unwrap();
        }
        h.router
            .record_pushed_status(&"done".into(), RawBackendStatus::new("completed"))
            .unwrap();

        h.clock.advance(chrono::Duration::minutes(30));
        assert_eq!(h.router.evict_older_than(Duration::from_secs(3600)), 0);

        h.clock.advance(chrono::Duration::hours(2));
        assert_eq!(h.router.evict_older_than(Duration::from_secs(3600)), 1);
        assert!(h.router.handle(&"done".into()).is_none());
        assert!(h.router.handle(&"live".into()).is_some());
    }

    #[tokio::test]
    async fn list_tasks_filters_by_kind_and_tag() {
        let h = harness();
        h.router
            .schedule_task(&TaskDescription::new("q", "resize").with_tag("nightly"))
            .await
            .unwrap();
        h.router
            .schedule_task(&TaskDescription::new("w", "migrate").durable().with_tag("nightly"))
            .await
            .unwrap();

        let nightly = h.router.list_tasks(&TaskFilter::all().with_tag("nightly"));
        assert_eq!(nightly.len(), 2);
        let workflows = h
            .router
            .list_tasks(&TaskFilter::all().with_backend(BackendKind::DurableWorkflow));
        assert_eq!(workflows.len(), 1);
        assert_eq!(workflows[0].task_id().as_str(), "w");
    }

    #[tokio::test]
    async fn persist_and_restore_registry() {
        let h = harness();
        h.router
            .schedule_task(&TaskDescription::new("t1", "resize"))
            .await
            .unwrap();
        assert!(h.router.persist().await.unwrap());

        let snapshot = h.router.snapshot();
        let other = harness();
        assert_eq!(other.router.restore(snapshot), 1);
        assert!(other.router.handle(&"t1".into()).is_some());
    }

    #[tokio::test]
    async fn failed_schedules_leave_no_locks_behind() {
        let h = harness();
        for i in 0..20 {
            h.queue.script(vec![Err(SubmissionError::rejected("bad payload"))]);
            let task = TaskDescription::new(format!("t{i}"), "resize");
            assert!(h.router.schedule_task(&task).await.is_err());
        }
        assert_eq!(h.router.task_count(), 0);
        assert!(h.router.schedule_locks.is_empty());

        // A successful id keeps its lock until eviction.
        h.router
            .schedule_task(&TaskDescription::new("ok", "resize"))
            .await
            .unwrap();
        assert_eq!(h.router.schedule_locks.len(), 1);
    }

    #[tokio::test]
    async fn blocked_submit_does_not_stall_other_ids() {
        let h = harness();
        let router = Arc::new(h.router);
        let gate = h.queue.gate("slow");

        let slow = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router
                    .schedule_task(&TaskDescription::new("slow", "resize"))
                    .await
            })
        };
        while h.queue.submits() == 0 {
            tokio::task::yield_now().await;
        }

        let fast = TaskDescription::new("fast", "resize");
        let handle = tokio::time::timeout(Duration::from_secs(1), router.schedule_task(&fast))
            .await
            .expect("other ids are not serialized behind a pending submit")
            .unwrap();
        let status = tokio::time::timeout(Duration::from_secs(1), router.get_task_status(handle.task_id()))
            .await
            .expect("status reads do not wait on a pending submit")
            .unwrap();
        assert_eq!(status.state, TaskState::Pending);
        assert_eq!(router.list_tasks(&TaskFilter::all()).len(), 1);
        assert!(!slow.is_finished());

        gate.notify_one();
        slow.await.unwrap().unwrap();
        assert_eq!(router.task_count(), 2);
    }

    #[tokio::test]
    async fn cancel_requested_task_is_not_resubmitted_until_settled() {
        let h = harness();
        let task = TaskDescription::new("t1", "resize");
        let first = h.router.schedule_task(&task).await.unwrap();
        assert!(h.router.cancel_task(task.id()).await.unwrap());

        // Backend still runs the original.
        h.queue.set_status(Ok(RawBackendStatus::new("active")));
        let again = h.router.schedule_task(&task).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(h.queue.submits(), 1);

        // Backend confirms: a new submission is allowed.
        h.queue.set_status(Ok(RawBackendStatus::new("failed").with_error("cancelled")));
        let fresh = h.router.schedule_task(&task).await.unwrap();
        assert_ne!(fresh.backend_native_id(), first.backend_native_id());
        assert_eq!(h.queue.submits(), 2);
    }
}
