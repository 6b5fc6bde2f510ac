//! Resumable progress for one grid cell.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use solver::io::config::write_atomic;
use tracing::warn;

use crate::grid::Cell;
use crate::results::ProblemResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub model: String,
    pub architecture: String,
    pub results: Vec<ProblemResult>,
    pub saved_at: String,
}

impl Checkpoint {
    pub fn new(cell: &Cell) -> Self {
        Self {
            model: cell.model.clone(),
            architecture: cell.architecture.to_string(),
            results: Vec::new(),
            saved_at: String::new(),
        }
    }

    pub fn contains(&self, problem_id: &str) -> bool {
        self.results.iter().any(|r| r.problem_id == problem_id)
    }
}

/// Previous progress for `cell`, if a readable checkpoint exists.
///
/// An unreadable or mismatched checkpoint is ignored with a warning so the
/// cell starts over instead of failing.
pub fn load_checkpoint(dir: &Path, cell: &Cell) -> Option<Checkpoint> {
    let path = cell.checkpoint_path(dir);
    if !path.exists() {
        return None;
    }
    let parsed = fs::read_to_string(&path)
        .with_context(|| format!("read {}", path.display()))
        .and_then(|contents| {
            serde_json::from_str::<Checkpoint>(&contents).context("parse checkpoint")
        });
    match parsed {
        Ok(checkpoint)
            if checkpoint.model == cell.model
                && checkpoint.architecture == cell.architecture.as_str() =>
        {
            Some(checkpoint)
        }
        Ok(_) => {
            warn!(path = %path.display(), "checkpoint belongs to another cell, ignoring");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), error = %format!("{err:#}"), "checkpoint unreadable, ignoring");
            None
        }
    }
}

pub fn save_checkpoint(dir: &Path, cell: &Cell, checkpoint: &mut Checkpoint) -> Result<()> {
    checkpoint.saved_at = Utc::now().to_rfc3339();
    let contents = serde_json::to_string_pretty(checkpoint).context("serialize checkpoint")?;
    write_atomic(&cell.checkpoint_path(dir), &format!("{contents}\n"))
}

pub fn clear_checkpoint(dir: &Path, cell: &Cell) -> Result<()> {
    let path = cell.checkpoint_path(dir);
    if path.exists() {
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
    }
    Ok(())
}
