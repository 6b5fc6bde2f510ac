//! Solver configuration stored in `solver.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Solver configuration (TOML).
///
/// Missing fields default to values that work against a local Ollama install.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// How many levels of subtask decomposition the planner may open.
    pub max_depth: u32,

    /// Outer search rounds, and code generations per repair loop.
    pub max_retry: u32,

    /// Attempts the developer gets to produce syntactically valid code per round.
    pub generation_retry: u32,

    /// 0 = no judge reviews, 1 = review code before testing, 2 = also review the plan.
    pub judge_level: u8,

    /// Look up similar solved tasks when planning.
    pub use_similarity: bool,

    pub similarity_top_k: usize,

    /// Soft cap on the size of rendered user prompts.
    pub prompt_budget_bytes: usize,

    pub inference: InferenceConfig,
    pub executor: ExecutorConfig,
    pub similarity: SimilarityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub num_predict: u32,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            temperature: 0.5,
            num_predict: 8192,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Interpreter used for test runs and syntax checks.
    pub python: String,
    pub case_timeout_secs: u64,
    pub max_workers: usize,
    /// Truncate captured stdout/stderr per test case beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            case_timeout_secs: 5,
            max_workers: 12,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Oldest entries are evicted beyond this many tasks.
    pub capacity: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self { capacity: 5000 }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            max_retry: 3,
            generation_retry: 3,
            judge_level: 0,
            use_similarity: false,
            similarity_top_k: 3,
            prompt_budget_bytes: 60_000,
            inference: InferenceConfig::default(),
            executor: ExecutorConfig::default(),
            similarity: SimilarityConfig::default(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.generation_retry == 0 {
            return Err(anyhow!("generation_retry must be > 0"));
        }
        if self.judge_level > 2 {
            return Err(anyhow!("judge_level must be 0, 1 or 2"));
        }
        if self.use_similarity && self.similarity_top_k == 0 {
            return Err(anyhow!("similarity_top_k must be > 0 when use_similarity is set"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.inference.base_url.trim().is_empty() {
            return Err(anyhow!("inference.base_url must be set"));
        }
        if self.inference.model.trim().is_empty() {
            return Err(anyhow!("inference.model must be set"));
        }
        if self.inference.timeout_secs == 0 {
            return Err(anyhow!("inference.timeout_secs must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.inference.temperature) {
            return Err(anyhow!("inference.temperature must be within 0.0..=2.0"));
        }
        if self.executor.python.trim().is_empty() {
            return Err(anyhow!("executor.python must be set"));
        }
        if self.executor.case_timeout_secs == 0 {
            return Err(anyhow!("executor.case_timeout_secs must be > 0"));
        }
        if self.executor.max_workers == 0 {
            return Err(anyhow!("executor.max_workers must be > 0"));
        }
        if self.executor.output_limit_bytes == 0 {
            return Err(anyhow!("executor.output_limit_bytes must be > 0"));
        }
        if self.similarity.capacity == 0 {
            return Err(anyhow!("similarity.capacity must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SolverConfig::default()`.
pub fn load_config(path: &Path) -> Result<SolverConfig> {
    if !path.exists() {
        let cfg = SolverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SolverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SolverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write through a sibling `.tmp` file and rename over `path`.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
