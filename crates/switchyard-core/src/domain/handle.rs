//! TaskHandle: the router-issued reference to a scheduled task.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{NativeId, TaskId};

/// Which execution backend runs a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Queue,
    DurableWorkflow,
    ExternalIntegration,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Queue,
        BackendKind::DurableWorkflow,
        BackendKind::ExternalIntegration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Queue => "queue",
            BackendKind::DurableWorkflow => "durable_workflow",
            BackendKind::ExternalIntegration => "external_integration",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Created once when scheduling succeeds and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    task_id: TaskId,
    backend_kind: BackendKind,
    backend_native_id: NativeId,
    created_at: DateTime<Utc>,
}

impl TaskHandle {
    pub fn new(
        task_id: TaskId,
        backend_kind: BackendKind,
        backend_native_id: NativeId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            backend_kind,
            backend_native_id,
            created_at,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }

    pub fn backend_native_id(&self) -> &NativeId {
        &self.backend_native_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
