//! Events - ドメインイベント
//!
//! Router が状態を書き換えたときに EventSink へ送るイベント。
//! ダッシュボードや通知はここを購読し、Router 本体には手を入れない。

use serde::{Deserialize, Serialize};

use super::handle::{BackendKind, TaskHandle};
use super::ids::TaskId;
use super::status::TaskState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RouterEvent {
    TaskScheduled {
        handle: TaskHandle,
    },
    StatusChanged {
        task_id: TaskId,
        backend: BackendKind,
        from: TaskState,
        to: TaskState,
    },
    TaskCancelled {
        task_id: TaskId,
        backend: BackendKind,
    },
    TaskEvicted {
        task_id: TaskId,
    },
}

impl RouterEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            RouterEvent::TaskScheduled { handle } => handle.task_id(),
            RouterEvent::StatusChanged { task_id, .. }
            | RouterEvent::TaskCancelled { task_id, .. }
            | RouterEvent::TaskEvicted { task_id } => task_id,
        }
    }
}
