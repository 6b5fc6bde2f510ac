//! Per-problem results and the per-cell summary written to `results/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use solver::io::config::write_atomic;

use crate::dataset::Difficulty;
use crate::grid::Cell;

/// Outcome of one problem in one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemResult {
    pub problem_id: String,
    pub difficulty: Difficulty,
    pub total_time_secs: f64,
    pub passed_tests: usize,
    pub total_tests: usize,
    pub success_rate: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Set when the solve itself failed; the problem then scores zero.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: String,
}

impl ProblemResult {
    /// Every private test passed.
    pub fn solved(&self) -> bool {
        self.total_tests > 0 && self.passed_tests == self.total_tests
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DifficultyStats {
    pub total: usize,
    pub passed: usize,
    pub percentage: f64,
}

/// Everything recorded for one (model, architecture) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchResult {
    pub model: String,
    pub architecture: String,
    pub total_problems: usize,
    /// Difficulty-weighted mean success rate, 0..=100.
    pub score: f64,
    pub difficulty_stats: BTreeMap<Difficulty, DifficultyStats>,
    pub total_time_secs: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub tokens_per_second: f64,
    pub completed_at: String,
    pub results: Vec<ProblemResult>,
}

/// Weighted mean of success rates (easy 1, medium 3, hard 5), scaled to 100.
pub fn weighted_score(results: &[ProblemResult]) -> f64 {
    let (weighted, weights) = results.iter().fold((0.0, 0.0), |(sum, total), result| {
        let weight = result.difficulty.weight();
        (sum + result.success_rate * weight, total + weight)
    });
    if weights == 0.0 {
        return 0.0;
    }
    (weighted / weights * 10_000.0).round() / 100.0
}

pub fn difficulty_stats(results: &[ProblemResult]) -> BTreeMap<Difficulty, DifficultyStats> {
    let mut stats: BTreeMap<Difficulty, DifficultyStats> = BTreeMap::new();
    for result in results {
        let entry = stats.entry(result.difficulty).or_default();
        entry.total += 1;
        if result.solved() {
            entry.passed += 1;
        }
    }
    for entry in stats.values_mut() {
        entry.percentage = (entry.passed as f64 / entry.total as f64 * 10_000.0).round() / 100.0;
    }
    stats
}

pub fn summarize(cell: &Cell, results: Vec<ProblemResult>) -> BenchResult {
    let total_time_secs: f64 = results.iter().map(|r| r.total_time_secs).sum();
    let total_input_tokens: u64 = results.iter().map(|r| r.input_tokens).sum();
    let total_output_tokens: u64 = results.iter().map(|r| r.output_tokens).sum();
    let tokens_per_second = if total_time_secs > 0.0 {
        total_output_tokens as f64 / total_time_secs
    } else {
        0.0
    };
    BenchResult {
        model: cell.model.clone(),
        architecture: cell.architecture.to_string(),
        total_problems: results.len(),
        score: weighted_score(&results),
        difficulty_stats: difficulty_stats(&results),
        total_time_secs,
        total_input_tokens,
        total_output_tokens,
        tokens_per_second,
        completed_at: Utc::now().to_rfc3339(),
        results,
    }
}

pub fn write_result(path: &Path, result: &BenchResult) -> Result<()> {
    let contents = serde_json::to_string_pretty(result).context("serialize result")?;
    write_atomic(path, &format!("{contents}\n"))
}

pub fn load_result(path: &Path) -> Result<BenchResult> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
pub(crate) fn result(id: &str, difficulty: Difficulty, success_rate: f64) -> ProblemResult {
    ProblemResult {
        problem_id: id.to_string(),
        difficulty,
        total_time_secs: 2.0,
        passed_tests: (success_rate * 4.0) as usize,
        total_tests: 4,
        success_rate,
        input_tokens: 100,
        output_tokens: 50,
        error: None,
        code: String::new(),
    }
}
