//! The models × architectures grid.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    /// One strategy straight from the problem statement, repaired in place.
    Simple,
    /// Full planner / decomposition / repair pipeline.
    MultiAgent,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::Simple => "simple",
            Architecture::MultiAgent => "multi-agent",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (model, architecture) benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub model: String,
    pub architecture: Architecture,
}

impl Cell {
    /// `<model>_<arch>` with path-hostile characters replaced.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", safe_model_name(&self.model), self.architecture)
    }

    pub fn result_path(&self, results_dir: &Path) -> PathBuf {
        results_dir.join(format!("{}.json", self.file_stem()))
    }

    pub fn checkpoint_path(&self, checkpoints_dir: &Path) -> PathBuf {
        checkpoints_dir.join(format!("checkpoint_{}.json", self.file_stem()))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.model, self.architecture)
    }
}

/// Hosted models are only benchmarked on the simple architecture.
pub fn is_cloud_model(model: &str) -> bool {
    model.contains("cloud")
}

/// Every runnable cell, models outermost, in config order.
pub fn build_grid(models: &[String], architectures: &[Architecture]) -> Vec<Cell> {
    models
        .iter()
        .flat_map(|model| {
            architectures
                .iter()
                .filter(move |arch| !(is_cloud_model(model) && **arch == Architecture::MultiAgent))
                .map(move |arch| Cell {
                    model: model.clone(),
                    architecture: *arch,
                })
        })
        .collect()
}

pub fn safe_model_name(model: &str) -> String {
    model
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}
