//! Task ownership for one solve call.
//!
//! Parents and subtasks reference each other by [`TaskId`]; the arena owns every task.

use serde::{Deserialize, Serialize};

use crate::core::types::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: TaskId,
    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,
    /// Remaining decomposition depth when this task was planned.
    pub depth: u32,
    pub task: Task,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArena {
    nodes: Vec<TaskNode>,
}

impl TaskArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task and link it under `parent`.
    ///
    /// Panics if `parent` does not belong to this arena.
    pub fn insert(&mut self, task: Task, parent: Option<TaskId>, depth: u32) -> TaskId {
        let id = TaskId(self.nodes.len());
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        self.nodes.push(TaskNode {
            id,
            parent,
            children: Vec::new(),
            depth,
            task,
        });
        id
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskNode> {
        self.nodes.get(id.0)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.nodes.get(id.0).map(|node| &node.task)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.nodes.get_mut(id.0).map(|node| &mut node.task)
    }

    pub fn children(&self, id: TaskId) -> &[TaskId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// Slash-separated function names from the root down to `id`.
    pub fn path(&self, id: TaskId) -> String {
        let mut names = Vec::new();
        let mut cursor = self.get(id);
        while let Some(node) = cursor {
            names.push(node.task.spec.function_name.as_str());
            cursor = node.parent.and_then(|parent| self.get(parent));
        }
        names.reverse();
        names.join("/")
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.iter()
    }
}
