//! WorkflowGraph - 親子関係つきの task 集合
//!
//! Design:
//! - `children`: parent -> 待つ相手（子）の集合
//! - `parents`: child -> 自分を待っている親の集合（逆辺）
//! - Invariant: children と parents は常に同期している、グラフは常に DAG
//!
//! BTreeMap / BTreeSet を使うので走査順は決定的です。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::{TaskDescription, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("task {0} is not part of the graph")]
    UnknownNode(TaskId),

    #[error("task {0} is already part of the graph")]
    DuplicateNode(TaskId),

    #[error("dependency would create a cycle: {}", display_path(.0))]
    Cycle(Vec<TaskId>),
}

fn display_path(path: &[TaskId]) -> String {
    path.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// On the current DFS path.
    Gray,
    /// Fully explored.
    Black,
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    nodes: BTreeMap<TaskId, TaskDescription>,
    children: HashMap<TaskId, BTreeSet<TaskId>>,
    parents: HashMap<TaskId, BTreeSet<TaskId>>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: TaskDescription) -> Result<(), GraphError> {
        let id = task.id().clone();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.nodes.insert(id, task);
        Ok(())
    }

    /// Builder-style `add_task`.
    pub fn with_task(mut self, task: TaskDescription) -> Result<Self, GraphError> {
        self.add_task(task)?;
        Ok(self)
    }

    /// `parent` waits for `child`. Rejected if it would close a cycle.
    pub fn add_dependency(&mut self, parent: &TaskId, child: &TaskId) -> Result<(), GraphError> {
        for id in [parent, child] {
            if !self.nodes.contains_key(id) {
                return Err(GraphError::UnknownNode(id.clone()));
            }
        }

        let inserted = self
            .children
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
        if !inserted {
            return Ok(());
        }
        self.parents
            .entry(child.clone())
            .or_default()
            .insert(parent.clone());

        if let Some(cycle) = self.detect_cycle() {
            self.remove_dependency(parent, child);
            return Err(GraphError::Cycle(cycle));
        }
        Ok(())
    }

    pub fn with_dependency(mut self, parent: &TaskId, child: &TaskId) -> Result<Self, GraphError> {
        self.add_dependency(parent, child)?;
        Ok(self)
    }

    fn remove_dependency(&mut self, parent: &TaskId, child: &TaskId) {
        if let Some(set) = self.children.get_mut(parent) {
            set.remove(child);
            if set.is_empty() {
                self.children.remove(parent);
            }
        }
        if let Some(set) = self.parents.get_mut(child) {
            set.remove(parent);
            if set.is_empty() {
                self.parents.remove(child);
            }
        }
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskDescription> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: &TaskId) -> impl Iterator<Item = &TaskId> {
        self.children.get(id).into_iter().flatten()
    }

    pub fn parents(&self, id: &TaskId) -> impl Iterator<Item = &TaskId> {
        self.parents.get(id).into_iter().flatten()
    }

    /// Nodes without children: the ones a flow starts from.
    pub fn leaves(&self) -> Vec<TaskId> {
        self.nodes
            .keys()
            .filter(|id| self.children(id).next().is_none())
            .cloned()
            .collect()
    }

    /// First cycle found (as a parent -> child path ending where it started),
    /// or `None` for a DAG. Three-colour DFS over child edges.
    pub fn detect_cycle(&self) -> Option<Vec<TaskId>> {
        let mut colors: HashMap<&TaskId, Color> = HashMap::new();
        let mut path: Vec<&TaskId> = Vec::new();
        for start in self.nodes.keys() {
            if colors.contains_key(start) {
                continue;
            }
            if let Some(cycle) = self.dfs_cycle(start, &mut colors, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a TaskId,
        colors: &mut HashMap<&'a TaskId, Color>,
        path: &mut Vec<&'a TaskId>,
    ) -> Option<Vec<TaskId>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for child in self.children(node) {
            match colors.get(child) {
                Some(Color::Gray) => {
                    let start = path.iter().position(|id| *id == child).unwrap_or(0);
                    let mut cycle: Vec<TaskId> = path[start..].iter().map(|id| (*id).clone()).collect();
                    cycle.push(child.clone());
                    return Some(cycle);
                }
                Some(Color::Black) => {}
                None => {
                    if let Some(cycle) = self.dfs_cycle(child, colors, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        colors.insert(node, Color::Black);
        path.pop();
        None
    }
}
