//! FlowComposer - WorkflowGraph を Router 上で葉から順に実行する
//!
//! # 状態遷移（node ごと）
//! Waiting → Scheduled → Finished
//! Waiting → Blocked（子が Failed / Cancelled。親は一度も submit されない）
//!
//! 親の実行可否は `FlowState` だけで判断します。`resume` 後、Waiting のはずの
//! node を Router が既に知っていれば（保存後に submit 済み）、submit し直さず
//! Router 側の状態をそのまま引き継ぎます。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::graph::WorkflowGraph;
use crate::app::Router;
use crate::domain::{ErrorInfo, RouterError, TaskHandle, TaskId, TaskState, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("flow state mentions task {0}, which is not in the graph")]
    UnknownNode(TaskId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum NodeState {
    Waiting,
    Scheduled { handle: TaskHandle, last: TaskStatus },
    Finished { status: TaskStatus },
    Blocked { status: TaskStatus },
}

impl NodeState {
    fn status(&self) -> TaskStatus {
        match self {
            NodeState::Waiting => TaskStatus::pending(),
            NodeState::Scheduled { last, .. } => last.clone(),
            NodeState::Finished { status } | NodeState::Blocked { status } => status.clone(),
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Finished { .. } | NodeState::Blocked { .. })
    }

    /// Terminal but not Completed: dependants can never run.
    fn blocks_parents(&self) -> bool {
        match self {
            NodeState::Finished { status } => status.state != TaskState::Completed,
            NodeState::Blocked { .. } => true,
            _ => false,
        }
    }

    fn is_completed(&self) -> bool {
        matches!(self, NodeState::Finished { status } if status.state == TaskState::Completed)
    }
}

/// Serializable progress of one flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    pub nodes: BTreeMap<TaskId, NodeState>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowProgress {
    pub waiting: usize,
    pub scheduled: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub blocked: usize,
}

impl FlowProgress {
    pub fn is_finished(&self) -> bool {
        self.waiting == 0 && self.scheduled == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowReport {
    pub statuses: BTreeMap<TaskId, TaskStatus>,
    pub progress: FlowProgress,
}

impl FlowReport {
    pub fn succeeded(&self) -> bool {
        self.statuses.values().all(|s| s.state == TaskState::Completed)
    }
}

pub struct FlowComposer {
    router: Arc<Router>,
    graph: WorkflowGraph,
    state: FlowState,
}

impl FlowComposer {
    pub fn new(router: Arc<Router>, graph: WorkflowGraph) -> Self {
        let nodes = graph
            .ids()
            .map(|id| (id.clone(), NodeState::Waiting))
            .collect();
        Self {
            router,
            graph,
            state: FlowState { nodes },
        }
    }

    /// Continues a flow from a saved `FlowState`. Nodes missing from the
    /// state start as Waiting.
    pub fn resume(router: Arc<Router>, graph: WorkflowGraph, state: FlowState) -> Result<Self, FlowError> {
        if let Some(unknown) = state.nodes.keys().find(|id| !graph.contains(id)) {
            return Err(FlowError::UnknownNode(unknown.clone()));
        }
        let mut composer = Self::new(router, graph);
        composer.state.nodes.extend(state.nodes);
        Ok(composer)
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn node_status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.state.nodes.get(id).map(NodeState::status)
    }

    /// Schedules every eligible node; on a fresh flow that is the leaves.
    pub async fn start(&mut self) -> Result<FlowProgress, FlowError> {
        self.propagate_failures();
        self.schedule_eligible().await?;
        self.propagate_failures();
        Ok(self.progress())
    }

    /// One cooperative pass: poll scheduled nodes, block dependants of
    /// failed nodes, schedule parents whose children all completed.
    pub async fn step(&mut self) -> Result<FlowProgress, FlowError> {
        self.poll_scheduled().await?;
        self.propagate_failures();
        self.schedule_eligible().await?;
        self.propagate_failures();
        Ok(self.progress())
    }

    /// `start`, then `step` every `poll_interval` until all nodes are terminal.
    pub async fn run(&mut self, poll_interval: Duration) -> Result<FlowReport, FlowError> {
        let mut progress = self.start().await?;
        while !progress.is_finished() {
            tokio::time::sleep(poll_interval).await;
            progress = self.step().await?;
        }
        tracing::info!(
            completed = progress.completed,
            failed = progress.failed,
            cancelled = progress.cancelled,
            blocked = progress.blocked,
            "flow finished"
        );
        Ok(self.report())
    }

    pub fn report(&self) -> FlowReport {
        FlowReport {
            statuses: self
                .state
                .nodes
                .iter()
                .map(|(id, node)| (id.clone(), node.status()))
                .collect(),
            progress: self.progress(),
        }
    }

    pub fn progress(&self) -> FlowProgress {
        let mut p = FlowProgress::default();
        for node in self.state.nodes.values() {
            match node {
                NodeState::Waiting => p.waiting += 1,
                NodeState::Scheduled { .. } => p.scheduled += 1,
                NodeState::Blocked { .. } => p.blocked += 1,
                NodeState::Finished { status } => match status.state {
                    TaskState::Completed => p.completed += 1,
                    TaskState::Cancelled => p.cancelled += 1,
                    _ => p.failed += 1,
                },
            }
        }
        p
    }

    async fn poll_scheduled(&mut self) -> Result<(), FlowError> {
        let scheduled: Vec<TaskId> = self
            .state
            .nodes
            .iter()
            .filter(|(_, node)| matches!(node, NodeState::Scheduled { .. }))
            .map(|(id, _)| id.clone())
            .collect();

        for id in scheduled {
            let observed = match self.router.get_task_status(&id).await {
                Ok(status) => status,
                // Evicted from under the flow; nothing will ever report on it again.
                Err(RouterError::TaskNotFound(_)) => {
                    TaskStatus::failed(ErrorInfo::new("task is no longer tracked by the router"))
                }
                Err(e) => return Err(e.into()),
            };

            let Some(node) = self.state.nodes.get_mut(&id) else {
                continue;
            };
            if observed.is_terminal() {
                tracing::debug!(task_id = %id, state = ?observed.state, "flow node finished");
                *node = NodeState::Finished { status: observed };
            } else if observed.state != TaskState::Unknown
                && let NodeState::Scheduled { last, .. } = node
            {
                *last = observed;
            }
        }
        Ok(())
    }

    /// Marks Waiting nodes Blocked while any child blocks them. Repeats until
    /// nothing changes so failures climb all the way up.
    fn propagate_failures(&mut self) {
        loop {
            let mut changed = false;
            let waiting: Vec<TaskId> = self
                .state
                .nodes
                .iter()
                .filter(|(_, node)| matches!(node, NodeState::Waiting))
                .map(|(id, _)| id.clone())
                .collect();

            for id in waiting {
                let blocker = self.graph.children(&id).find(|child| {
                    self.state
                        .nodes
                        .get(*child)
                        .is_some_and(NodeState::blocks_parents)
                });
                let Some(child) = blocker.cloned() else {
                    continue;
                };
                let reason = self
                    .state
                    .nodes
                    .get(&child)
                    .map(|n| n.status().state)
                    .unwrap_or(TaskState::Failed);
                tracing::warn!(task_id = %id, blocked_by = %child, ?reason, "flow node blocked by dependency");
                let status = TaskStatus::failed(ErrorInfo::blocked_by(
                    child.clone(),
                    format!("dependency {child} ended {reason:?}"),
                ));
                self.state.nodes.insert(id, NodeState::Blocked { status });
                changed = true;
            }

            if !changed {
                break;
            }
        }
    }

    async fn schedule_eligible(&mut self) -> Result<(), FlowError> {
        let eligible: Vec<TaskId> = self
            .state
            .nodes
            .iter()
            .filter(|(_, node)| matches!(node, NodeState::Waiting))
            .map(|(id, _)| id)
            .filter(|id| {
                self.graph.children(id).all(|child| {
                    self.state
                        .nodes
                        .get(child)
                        .is_some_and(NodeState::is_completed)
                })
            })
            .cloned()
            .collect();

        for id in eligible {
            let Some(task) = self.graph.task(&id) else {
                continue;
            };
            if let Some(adopted) = self.adopt_tracked(&id).await? {
                self.state.nodes.insert(id, adopted);
                continue;
            }
            let next = match self.router.schedule_task(task).await {
                Ok(handle) => {
                    tracing::debug!(task_id = %id, backend = %handle.backend_kind(), "flow node scheduled");
                    NodeState::Scheduled {
                        handle,
                        last: TaskStatus::pending(),
                    }
                }
                Err(err @ (RouterError::SchedulingFailed { .. } | RouterError::InvalidTask(_))) => {
                    tracing::warn!(task_id = %id, error = %err, "flow node could not be scheduled");
                    NodeState::Finished {
                        status: TaskStatus::failed(ErrorInfo::new(err.to_string())),
                    }
                }
                Err(e) => return Err(e.into()),
            };
            self.state.nodes.insert(id, next);
        }
        Ok(())
    }

    /// A Waiting node the router already tracks was submitted after the
    /// `FlowState` was saved. Take over what the router knows instead of
    /// submitting it again.
    async fn adopt_tracked(&self, id: &TaskId) -> Result<Option<NodeState>, FlowError> {
        let Some(handle) = self.router.handle(id) else {
            return Ok(None);
        };
        let status = match self.router.get_task_status(id).await {
            Ok(status) => status,
            // Evicted in between: schedule it normally.
            Err(RouterError::TaskNotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(task_id = %id, state = ?status.state, "flow node already tracked by router, adopting");
        let adopted = if status.is_terminal() {
            NodeState::Finished { status }
        } else {
            let last = if status.state == TaskState::Unknown {
                TaskStatus::pending()
            } else {
                status
            };
            NodeState::Scheduled { handle, last }
        };
        Ok(Some(adopted))
    }

    /// True once every node is terminal.
    pub fn is_finished(&self) -> bool {
        self.state.nodes.values().all(NodeState::is_terminal)
    }
}
