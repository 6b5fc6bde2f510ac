//! Running candidate programs against a test suite.

use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::mpsc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::types::{ErrorDetail, TestCase, TestSuite, TestsResult};
use crate::io::config::ExecutorConfig;
use crate::io::process::{ProcessLimits, run_limited};

/// Executes a program against a suite.
///
/// Failing cases are data in the returned [`TestsResult`]. `Err` means the run
/// could not happen at all (no interpreter, no temp dir).
pub trait TestExecutor {
    fn run(&self, code: &str, suite: &TestSuite) -> Result<TestsResult>;
}

/// Runs each case as `python <script>` with the case input on stdin.
#[derive(Debug, Clone)]
pub struct PythonTestRunner {
    python: String,
    case_timeout: Duration,
    max_workers: usize,
    output_limit_bytes: usize,
}

#[derive(Debug)]
enum CaseOutcome {
    Passed,
    Failed(ErrorDetail),
}

impl PythonTestRunner {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            python: config.python.clone(),
            case_timeout: Duration::from_secs(config.case_timeout_secs),
            max_workers: config.max_workers.max(1),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn run_case(&self, script: &Path, case: &TestCase) -> CaseOutcome {
        let mut cmd = Command::new(&self.python);
        cmd.arg(script).env("PYTHONIOENCODING", "utf-8");
        let limits = ProcessLimits {
            timeout: self.case_timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        let failure = |actual: String, message: String| {
            CaseOutcome::Failed(ErrorDetail {
                input: case.input.clone(),
                expected_output: case.expected_output.clone(),
                actual_output: actual,
                error_message: message,
            })
        };

        let output = match run_limited(cmd, Some(case.input.as_bytes()), limits) {
            Ok(output) => output,
            Err(err) => {
                return failure(
                    String::new(),
                    format!("Infrastructure Execution Error: {err:#}"),
                );
            }
        };
        if output.timed_out {
            return failure(
                String::new(),
                format!("Timeout exceeded ({}s)", self.case_timeout.as_secs()),
            );
        }
        let actual = normalize_output(&output.stdout_text());
        if !output.status.success() {
            return failure(
                actual,
                format!(
                    "Runtime Error (Exit Code {}): {}",
                    output.exit_code(),
                    output.stderr_text().trim()
                ),
            );
        }
        if actual == normalize_output(&case.expected_output) {
            CaseOutcome::Passed
        } else {
            failure(actual, "Output mismatch".to_string())
        }
    }
}

impl TestExecutor for PythonTestRunner {
    #[instrument(skip_all, fields(cases = suite.len(), workers = self.max_workers))]
    fn run(&self, code: &str, suite: &TestSuite) -> Result<TestsResult> {
        let total = suite.len();
        if total == 0 {
            debug!("empty suite");
            return Ok(TestsResult::from_counts(code, 0.0, 0, 0, Vec::new()));
        }

        let mut script = tempfile::Builder::new()
            .prefix("solver-")
            .suffix(".py")
            .tempfile()
            .context("create temp script")?;
        script
            .write_all(suite.program_for(code).as_bytes())
            .context("write temp script")?;
        script.flush().context("flush temp script")?;

        let started = Instant::now();
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();
        let workers = self.max_workers.min(total);
        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                let path = script.path();
                scope.spawn(move || {
                    loop {
                        let idx = next.fetch_add(1, Ordering::Relaxed);
                        let Some(case) = suite.test_cases.get(idx) else {
                            break;
                        };
                        if tx.send((idx, self.run_case(path, case))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(tx);

        let mut outcomes: Vec<Option<CaseOutcome>> = (0..total).map(|_| None).collect();
        for (idx, outcome) in rx {
            outcomes[idx] = Some(outcome);
        }

        let mut passed = 0;
        let mut errors = Vec::new();
        for (outcome, case) in outcomes.into_iter().zip(&suite.test_cases) {
            match outcome {
                Some(CaseOutcome::Passed) => passed += 1,
                Some(CaseOutcome::Failed(detail)) => errors.push(detail),
                None => errors.push(ErrorDetail {
                    input: case.input.clone(),
                    expected_output: case.expected_output.clone(),
                    actual_output: String::new(),
                    error_message: "Infrastructure Execution Error: case was not run".to_string(),
                }),
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        let result = TestsResult::from_counts(code, elapsed, passed, total, errors);
        info!(
            passed,
            total,
            success_rate = result.success_rate,
            elapsed_secs = elapsed,
            "test run finished"
        );
        Ok(result)
    }
}

/// Trim surrounding whitespace and unify line endings.
pub fn normalize_output(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}
