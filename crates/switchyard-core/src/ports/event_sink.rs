//! EventSink port - イベント記録の抽象化
//!
//! # 実装
//! - TracingEventSink: tracing に構造化ログとして流す（デフォルト）
//! - MemoryEventSink: テスト用に記録するだけ

use std::sync::Mutex;

use crate::domain::RouterEvent;

/// EventSink は Router のイベントを受け取る
///
/// emit は同期・非ブロッキングであること（Router は registry 更新直後に呼ぶ）。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RouterEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: RouterEvent) {
        match &event {
            RouterEvent::TaskScheduled { handle } => tracing::info!(
                task_id = %handle.task_id(),
                backend = %handle.backend_kind(),
                native_id = %handle.backend_native_id(),
                "task scheduled"
            ),
            RouterEvent::StatusChanged {
                task_id,
                backend,
                from,
                to,
            } => tracing::info!(
                task_id = %task_id,
                backend = %backend,
                from = ?from,
                to = ?to,
                "task status changed"
            ),
            RouterEvent::TaskCancelled { task_id, backend } => {
                tracing::info!(task_id = %task_id, backend = %backend, "task cancellation accepted")
            }
            RouterEvent::TaskEvicted { task_id } => {
                tracing::debug!(task_id = %task_id, "task evicted from registry")
            }
        }
    }
}

/// Records every event. Useful for tests and for embedding in dashboards.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<RouterEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RouterEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: RouterEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn emit(&self, event: RouterEvent) {
        (**self).emit(event)
    }
}
