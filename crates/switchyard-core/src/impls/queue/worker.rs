//! In-process workers for the in-memory queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::memory::InMemoryQueueBackend;
use crate::typed::{DynHandler, Handler, TypedHandler, TypedTask};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for job '{0}' is already registered")]
    DuplicateHandler(String),
}

/// Registry of handlers (job name -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable, shared via Arc).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type-erased handler under its `task_type()`.
    pub fn register(&mut self, handler: Arc<dyn DynHandler>) -> Result<(), RegistryError> {
        let name = handler.task_type().to_string();
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::DuplicateHandler(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn register_typed<T, H>(&mut self, handler: H) -> Result<(), RegistryError>
    where
        T: TypedTask,
        H: Handler<T> + 'static,
    {
        self.register(Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    pub fn get(&self, job_name: &str) -> Option<&Arc<dyn DynHandler>> {
        self.handlers.get(job_name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Worker group handle.
/// - `request_shutdown` でワーカー全体が止まる（実行中の handler は最後まで走る）
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers leasing from `lists` (in priority order).
    pub fn spawn(
        n: usize,
        queue: Arc<InMemoryQueueBackend>,
        lists: Vec<String>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let lists = Arc::new(lists);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let l = Arc::clone(&lists);
            let h = Arc::clone(&handlers);
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, q, l, h, &mut rx).await;
            }));
        }
        tracing::debug!(workers = n, "queue workers started");

        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<InMemoryQueueBackend>,
    lists: Arc<Vec<String>>,
    handlers: Arc<HandlerRegistry>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // lease は待つ可能性があるので shutdown と競合させる
        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped: the group is gone
                if changed.is_err() {
                    break;
                }
                continue;
            }
            lease = queue.lease(&lists) => lease,
        };

        let Some(handler) = handlers.get(&lease.name).cloned() else {
            tracing::warn!(worker_id, job_id = %lease.job_id, job = %lease.name, "no handler registered");
            let reason = format!("no handler registered for job '{}'", lease.name);
            lease.fail(reason).await;
            continue;
        };

        let job_id = lease.job_id.clone();
        let attempt = lease.attempt;
        tracing::debug!(worker_id, %job_id, attempt, job = %lease.name, "job started");

        match handler.handle_dyn(lease.data.clone()).await {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => {
                    lease.complete(value).await;
                    tracing::debug!(worker_id, %job_id, attempt, "job completed");
                }
                Err(e) => {
                    lease.fail(format!("unserializable result: {e}")).await;
                }
            },
            Err(err) => {
                let next = lease.fail(err.to_string()).await;
                tracing::info!(worker_id, %job_id, attempt, error = %err, next_state = next.as_str(), "job failed");
            }
        }
    }
}
