use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::dataset::Difficulty;
use crate::results::{BenchResult, load_result};

/// One line of the comparison table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub model: String,
    pub architecture: String,
    pub problems: usize,
    pub score: f64,
    /// `(passed, total)` per difficulty, in [`Difficulty::ALL`] order.
    pub by_difficulty: [(usize, usize); 3],
    pub errors: usize,
    pub total_time_secs: f64,
    pub tokens_per_second: f64,
}

impl ReportRow {
    fn from_result(result: &BenchResult) -> Self {
        let by_difficulty = Difficulty::ALL.map(|difficulty| {
            result
                .difficulty_stats
                .get(&difficulty)
                .map(|stats| (stats.passed, stats.total))
                .unwrap_or((0, 0))
        });
        Self {
            model: result.model.clone(),
            architecture: result.architecture.clone(),
            problems: result.total_problems,
            score: result.score,
            by_difficulty,
            errors: result.results.iter().filter(|r| r.error.is_some()).count(),
            total_time_secs: result.total_time_secs,
            tokens_per_second: result.tokens_per_second,
        }
    }
}

pub fn load_result_files(results_dir: &Path) -> Result<Vec<PathBuf>> {
    if !results_dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in
        fs::read_dir(results_dir).with_context(|| format!("read {}", results_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Rows for every readable result file, best score first.
pub fn aggregate(results_dir: &Path) -> Result<(Vec<ReportRow>, Vec<String>)> {
    let mut rows = Vec::new();
    let mut warnings = Vec::new();

    for path in load_result_files(results_dir)? {
        match load_result(&path) {
            Ok(result) => rows.push(ReportRow::from_result(&result)),
            Err(err) => warnings.push(format!("skip {}: {err:#}", path.display())),
        }
    }
    rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.model.cmp(&b.model))
            .then_with(|| a.architecture.cmp(&b.architecture))
    });
    Ok((rows, warnings))
}

pub fn render_table(rows: &[ReportRow]) -> String {
    let mut out = format!(
        "{:<32} {:<12} {:>7} {:>9} {:>9} {:>9} {:>6} {:>9} {:>7}\n",
        "model", "arch", "score", "easy", "medium", "hard", "errors", "secs", "tok/s"
    );
    for row in rows {
        let [easy, medium, hard] = row.by_difficulty.map(|(p, t)| format!("{p}/{t}"));
        out.push_str(&format!(
            "{:<32} {:<12} {:>7.2} {:>9} {:>9} {:>9} {:>6} {:>9.1} {:>7.1}\n",
            row.model,
            row.architecture,
            row.score,
            easy,
            medium,
            hard,
            row.errors,
            row.total_time_secs,
            row.tokens_per_second
        ));
    }
    out
}
