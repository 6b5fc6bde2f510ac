//! Task files: a task spec plus an optional hand-written test suite (TOML).
//!
//! ```toml
//! [spec]
//! definition = "Sum two integers read from stdin."
//! function_name = "main"
//! dod = "Prints the sum."
//!
//! [[test_cases]]
//! input = "1 2"
//! expected_output = "3"
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::types::{IMPLEMENTATION_PLACEHOLDER, TaskSpec, TestCase, TestSuite};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    pub spec: TaskSpec,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    /// Harness wrapping the implementation. Defaults to the bare program.
    #[serde(default)]
    pub harness: Option<String>,
}

impl TaskFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let file: TaskFile =
            toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        file.validate()
            .with_context(|| format!("invalid task file {}", path.display()))?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        if self.spec.definition.trim().is_empty() {
            bail!("spec.definition must not be empty");
        }
        if self.spec.function_name.trim().is_empty() {
            bail!("spec.function_name must not be empty");
        }
        if let Some(harness) = &self.harness {
            if !harness.contains(IMPLEMENTATION_PLACEHOLDER) {
                bail!("harness must contain {IMPLEMENTATION_PLACEHOLDER}");
            }
        }
        Ok(())
    }

    /// The provided suite, or `None` when the QA agent should write one.
    pub fn suite(&self) -> Option<TestSuite> {
        if self.test_cases.is_empty() {
            return None;
        }
        let harness = self.harness.as_deref().unwrap_or(IMPLEMENTATION_PLACEHOLDER);
        Some(TestSuite::new(self.test_cases.clone(), harness))
    }
}
