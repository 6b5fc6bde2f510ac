//! JSON report of a finished solve.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::arena::TaskId;
use crate::io::config::write_atomic;
use crate::io::inference::TokenUsage;
use crate::orchestrator::SolveOutcome;

/// One task as it ended up after the solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,
    pub depth: u32,
    pub path: String,
    pub function_name: String,
    pub rating: f64,
    pub best_solution: String,
    pub template: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub root: TaskId,
    pub tasks: Vec<TaskReport>,
    pub usage: TokenUsage,
}

impl SolveReport {
    pub fn from_outcome(outcome: &SolveOutcome) -> Self {
        let tasks = outcome
            .arena
            .iter()
            .map(|node| TaskReport {
                id: node.id,
                parent: node.parent,
                children: node.children.clone(),
                depth: node.depth,
                path: outcome.arena.path(node.id),
                function_name: node.task.spec.function_name.clone(),
                rating: node.task.best_solution_rating,
                best_solution: node.task.best_solution.clone(),
                template: node.task.template.clone(),
                code: node.task.code.clone(),
            })
            .collect();
        Self {
            root: outcome.root,
            tasks,
            usage: outcome.usage,
        }
    }

    pub fn root(&self) -> Option<&TaskReport> {
        self.tasks.iter().find(|task| task.id == self.root)
    }
}

/// Atomically write the report as pretty JSON.
pub fn write_report(path: &Path, report: &SolveReport) -> Result<()> {
    debug!(path = %path.display(), tasks = report.tasks.len(), "writing solve report");
    let mut buf = serde_json::to_string_pretty(report).context("serialize solve report")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
