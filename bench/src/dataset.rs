//! Problem dataset: JSONL, one stdin/stdout problem per line.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use solver::core::types::{TaskSpec, TestCase, TestSuite};

use crate::config::DatasetConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Weight in the overall score.
    pub fn weight(self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Medium => 3.0,
            Difficulty::Hard => 5.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemCase {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub content: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub public_tests: Vec<ProblemCase>,
    #[serde(default)]
    pub private_tests: Vec<ProblemCase>,
}

impl Problem {
    /// The problem as a whole-program task read from stdin.
    pub fn spec(&self) -> TaskSpec {
        TaskSpec {
            definition: format!("{}\n\n{}", self.title.trim(), self.content.trim()),
            function_name: "main".to_string(),
            args: Vec::new(),
            definition_of_done:
                "Read the input from stdin and print the expected output to stdout.".to_string(),
            keywords: vec![self.difficulty.to_string()],
        }
    }

    /// Scoring suite: the private tests, or the public ones when none are private.
    pub fn suite(&self) -> TestSuite {
        let cases = if self.private_tests.is_empty() {
            &self.public_tests
        } else {
            &self.private_tests
        };
        TestSuite::standalone(
            cases
                .iter()
                .map(|case| TestCase {
                    input: case.input.clone(),
                    expected_output: case.output.clone(),
                })
                .collect(),
        )
    }
}

/// Parse a JSONL dataset. Blank lines are skipped.
pub fn load_dataset(path: &Path) -> Result<Vec<Problem>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut problems = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let problem: Problem = serde_json::from_str(line)
            .with_context(|| format!("parse {} line {}", path.display(), idx + 1))?;
        problems.push(problem);
    }
    debug!(path = %path.display(), problems = problems.len(), "dataset loaded");
    Ok(problems)
}

/// First `*_samples` problems of each difficulty, keeping file order.
pub fn sample(problems: Vec<Problem>, cfg: &DatasetConfig) -> Vec<Problem> {
    let mut taken = [0usize; 3];
    problems
        .into_iter()
        .filter(|problem| {
            let (slot, cap) = match problem.difficulty {
                Difficulty::Easy => (0, cfg.easy_samples),
                Difficulty::Medium => (1, cfg.medium_samples),
                Difficulty::Hard => (2, cfg.hard_samples),
            };
            if taken[slot] < cap {
                taken[slot] += 1;
                true
            } else {
                false
            }
        })
        .collect()
}
