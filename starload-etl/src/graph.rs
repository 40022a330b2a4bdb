//! Workflow task graph
//!
//! Tasks are added to a [`WorkflowBuilder`] and wired with explicit edges
//! ("`from` must complete before `to`"). [`WorkflowBuilder::build`] rejects
//! anything that is not a DAG bounded by exactly one start node and exactly
//! one end node. With a single source and a single sink, every node of an
//! acyclic graph is reachable from the start and reaches the end.

use crate::tasks::{Task, TaskKind};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Name of a task node, unique within a workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Graph construction and validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("workflow has no tasks")]
    Empty,

    #[error("task '{0}' is defined twice")]
    DuplicateTask(TaskId),

    #[error("edge references unknown task '{0}'")]
    UnknownTask(TaskId),

    #[error("task '{0}' cannot depend on itself")]
    SelfLoop(TaskId),

    #[error("edge '{from}' -> '{to}' is declared twice")]
    DuplicateEdge { from: TaskId, to: TaskId },

    #[error("dependency cycle through tasks {0:?}")]
    Cycle(Vec<TaskId>),

    #[error("expected exactly one start task, found {0:?}")]
    MultipleStarts(Vec<TaskId>),

    #[error("expected exactly one end task, found {0:?}")]
    MultipleEnds(Vec<TaskId>),

    #[error("task '{task}' is misconfigured: {reason}")]
    InvalidTask { task: TaskId, reason: String },
}

struct Node {
    id: TaskId,
    task: Arc<dyn Task>,
}

/// Collects tasks and edges before validation
#[derive(Default)]
pub struct WorkflowBuilder {
    name: String,
    nodes: Vec<Node>,
    index: HashMap<TaskId, usize>,
    edges: Vec<(usize, usize)>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a task node
    pub fn add_task(
        &mut self,
        id: impl Into<TaskId>,
        task: Arc<dyn Task>,
    ) -> Result<&mut Self, GraphError> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateTask(id));
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(Node { id, task });
        Ok(self)
    }

    /// Declare that `from` must complete before `to` starts
    pub fn add_edge(
        &mut self,
        from: impl Into<TaskId>,
        to: impl Into<TaskId>,
    ) -> Result<&mut Self, GraphError> {
        let from = from.into();
        let to = to.into();
        let a = self.lookup(&from)?;
        let b = self.lookup(&to)?;
        if a == b {
            return Err(GraphError::SelfLoop(from));
        }
        if self.edges.contains(&(a, b)) {
            return Err(GraphError::DuplicateEdge { from, to });
        }
        self.edges.push((a, b));
        Ok(self)
    }

    /// Edges from one task to each of several tasks
    pub fn fan_out<I, T>(&mut self, from: impl Into<TaskId>, to: I) -> Result<&mut Self, GraphError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        let from = from.into();
        for target in to {
            self.add_edge(from.clone(), target)?;
        }
        Ok(self)
    }

    /// Edges from each of several tasks into one task
    pub fn fan_in<I, T>(&mut self, from: I, to: impl Into<TaskId>) -> Result<&mut Self, GraphError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        let to = to.into();
        for source in from {
            self.add_edge(source, to.clone())?;
        }
        Ok(self)
    }

    fn lookup(&self, id: &TaskId) -> Result<usize, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask(id.clone()))
    }

    /// Validate and freeze the graph
    pub fn build(self) -> Result<WorkflowGraph, GraphError> {
        let n = self.nodes.len();
        if n == 0 {
            return Err(GraphError::Empty);
        }

        let mut upstream = vec![Vec::new(); n];
        let mut downstream = vec![Vec::new(); n];
        for &(a, b) in &self.edges {
            downstream[a].push(b);
            upstream[b].push(a);
        }

        // Kahn's algorithm, ties broken by insertion order
        let mut indegree: Vec<usize> = upstream.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| indegree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &j in &downstream[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }
        if order.len() < n {
            let stuck = (0..n)
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.nodes[i].id.clone())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        let starts: Vec<usize> = (0..n).filter(|&i| upstream[i].is_empty()).collect();
        if starts.len() != 1 {
            return Err(GraphError::MultipleStarts(
                starts.iter().map(|&i| self.nodes[i].id.clone()).collect(),
            ));
        }
        let ends: Vec<usize> = (0..n).filter(|&i| downstream[i].is_empty()).collect();
        if ends.len() != 1 {
            return Err(GraphError::MultipleEnds(
                ends.iter().map(|&i| self.nodes[i].id.clone()).collect(),
            ));
        }

        let mut depth = vec![0usize; n];
        for &i in &order {
            for &j in &downstream[i] {
                depth[j] = depth[j].max(depth[i] + 1);
            }
        }

        Ok(WorkflowGraph {
            name: self.name,
            nodes: self.nodes,
            index: self.index,
            upstream,
            downstream,
            order,
            depth,
            start: starts[0],
            end: ends[0],
        })
    }
}

/// An immutable, validated workflow DAG
pub struct WorkflowGraph {
    name: String,
    nodes: Vec<Node>,
    index: HashMap<TaskId, usize>,
    upstream: Vec<Vec<usize>>,
    downstream: Vec<Vec<usize>>,
    order: Vec<usize>,
    depth: Vec<usize>,
    start: usize,
    end: usize,
}

impl WorkflowGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn start(&self) -> &TaskId {
        &self.nodes[self.start].id
    }

    pub fn end(&self) -> &TaskId {
        &self.nodes[self.end].id
    }

    pub fn task(&self, id: &str) -> Option<&Arc<dyn Task>> {
        self.index
            .get(&TaskId::from(id))
            .map(|&i| &self.nodes[i].task)
    }

    pub fn kind(&self, id: &str) -> Option<TaskKind> {
        self.task(id).map(|t| t.kind())
    }

    /// Direct predecessors of a task
    pub fn upstream(&self, id: &str) -> Vec<&TaskId> {
        self.neighbours(id, &self.upstream)
    }

    /// Direct successors of a task
    pub fn downstream(&self, id: &str) -> Vec<&TaskId> {
        self.neighbours(id, &self.downstream)
    }

    fn neighbours<'a>(&'a self, id: &str, adjacency: &'a [Vec<usize>]) -> Vec<&'a TaskId> {
        match self.index.get(&TaskId::from(id)) {
            Some(&i) => adjacency[i].iter().map(|&j| &self.nodes[j].id).collect(),
            None => Vec::new(),
        }
    }

    /// Every edge as `(from, to)` in declaration order of `from`
    pub fn edges(&self) -> Vec<(&TaskId, &TaskId)> {
        self.downstream
            .iter()
            .enumerate()
            .flat_map(|(i, targets)| {
                targets
                    .iter()
                    .map(move |&j| (&self.nodes[i].id, &self.nodes[j].id))
            })
            .collect()
    }

    /// A dependency-respecting order
    pub fn topological_order(&self) -> Vec<&TaskId> {
        self.order.iter().map(|&i| &self.nodes[i].id).collect()
    }

    /// Tasks grouped by longest distance from the start; tasks in one layer
    /// never depend on each other
    pub fn layers(&self) -> Vec<Vec<&TaskId>> {
        let height = self.depth.iter().copied().max().unwrap_or(0) + 1;
        let mut layers = vec![Vec::new(); height];
        for &i in &self.order {
            layers[self.depth[i]].push(&self.nodes[i].id);
        }
        layers
    }

    pub(crate) fn index_of(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn node(&self, i: usize) -> (&TaskId, &Arc<dyn Task>) {
        let node = &self.nodes[i];
        (&node.id, &node.task)
    }

    pub(crate) fn upstream_of(&self, i: usize) -> &[usize] {
        &self.upstream[i]
    }

    pub(crate) fn downstream_of(&self, i: usize) -> &[usize] {
        &self.downstream[i]
    }
}

impl fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("name", &self.name)
            .field("tasks", &self.topological_order())
            .field("edges", &self.edges())
            .finish()
    }
}
