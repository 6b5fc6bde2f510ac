//! Static checks on generated programs before they are tested.

use std::io::Write;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::instrument;

use crate::io::config::ExecutorConfig;
use crate::io::process::{ProcessLimits, run_limited};

const PARSE_SNIPPET: &str =
    "import ast, sys; ast.parse(open(sys.argv[1], encoding='utf-8').read(), sys.argv[1])";

/// Returns the problems found in `code`; empty means it compiles.
pub trait SyntaxChecker {
    fn check(&self, code: &str) -> Result<Vec<String>>;
}

/// Parses the program with Python's `ast` module without running it.
#[derive(Debug, Clone)]
pub struct PythonSyntaxChecker {
    python: String,
    output_limit_bytes: usize,
}

impl PythonSyntaxChecker {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            python: config.python.clone(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl SyntaxChecker for PythonSyntaxChecker {
    #[instrument(skip_all, fields(bytes = code.len()))]
    fn check(&self, code: &str) -> Result<Vec<String>> {
        let mut file = tempfile::Builder::new()
            .prefix("solver-check-")
            .suffix(".py")
            .tempfile()
            .context("create temp source")?;
        file.write_all(code.as_bytes())
            .context("write temp source")?;
        file.flush().context("flush temp source")?;

        let mut cmd = Command::new(&self.python);
        cmd.arg("-c").arg(PARSE_SNIPPET).arg(file.path());
        let output = run_limited(
            cmd,
            None,
            ProcessLimits {
                timeout: Duration::from_secs(30),
                output_limit_bytes: self.output_limit_bytes,
            },
        )
        .context("run python syntax check")?;

        if output.status.success() {
            return Ok(Vec::new());
        }
        let path = file.path().display().to_string();
        let problems = output
            .stderr_text()
            .lines()
            .map(|line| line.replace(&path, "<program>"))
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>();
        if problems.is_empty() {
            return Ok(vec![format!(
                "syntax check exited with code {}",
                output.exit_code()
            )]);
        }
        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_available() -> bool {
        Command::new("python3")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn accepts_valid_program() {
        if !python_available() {
            return;
        }
        let checker = PythonSyntaxChecker::new(&ExecutorConfig::default());
        let problems = checker
            .check("def f(x):\n    return x + 1\n")
            .expect("check");
        assert!(problems.is_empty());
    }

    #[test]
    fn reports_syntax_error() {
        if !python_available() {
            return;
        }
        let checker = PythonSyntaxChecker::new(&ExecutorConfig::default());
        let problems = checker.check("def f(x)\n    return x\n").expect("check");
        assert!(!problems.is_empty());
        assert!(problems.iter().any(|line| line.contains("SyntaxError")));
    }

    #[test]
    fn missing_interpreter_is_an_error() {
        let checker = PythonSyntaxChecker::new(&ExecutorConfig {
            python: "definitely-not-python".to_string(),
            ..ExecutorConfig::default()
        });
        assert!(checker.check("x = 1").is_err());
    }
}
