//! Benchmark configuration (`bench.toml`).
//!
//! Solver settings live under `[solver]` and are shared by every grid cell;
//! only the model name is overridden per cell.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use solver::io::config::SolverConfig;

use crate::grid::Architecture;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub models: Vec<String>,
    pub architectures: Vec<Architecture>,
    pub dataset: DatasetConfig,
    pub paths: PathsConfig,
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// JSONL file, one problem per line.
    pub path: PathBuf,
    pub easy_samples: usize,
    pub medium_samples: usize,
    pub hard_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub results: PathBuf,
    pub checkpoints: PathBuf,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            models: vec!["qwen2.5-coder:7b".to_string()],
            architectures: vec![Architecture::Simple, Architecture::MultiAgent],
            dataset: DatasetConfig::default(),
            paths: PathsConfig::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/problems.jsonl"),
            easy_samples: 30,
            medium_samples: 30,
            hard_samples: 30,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            results: PathBuf::from("results"),
            checkpoints: PathBuf::from(".checkpoints"),
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            bail!("models must list at least one model");
        }
        if self.models.iter().any(|model| model.trim().is_empty()) {
            bail!("models must not contain empty names");
        }
        if self.architectures.is_empty() {
            bail!("architectures must list at least one architecture");
        }
        self.solver.validate().context("invalid [solver] section")?;
        Ok(())
    }

    /// Solver settings for one model.
    pub fn solver_for(&self, model: &str) -> SolverConfig {
        let mut cfg = self.solver.clone();
        cfg.inference.model = model.to_string();
        cfg
    }
}

/// Load `bench.toml`; a missing file yields validated defaults.
pub fn load_bench_config(path: &Path) -> Result<BenchConfig> {
    if !path.exists() {
        let cfg = BenchConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BenchConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
