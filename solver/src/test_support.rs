//! Scripted collaborators and builders for tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::json;

use crate::core::types::{ErrorDetail, TaskSpec, TestCase, TestSuite, TestsResult};
use crate::io::config::SolverConfig;
use crate::io::inference::{ChatReply, ChatRequest, ChatRole, LanguageModel};
use crate::io::syntax::SyntaxChecker;
use crate::io::test_runner::TestExecutor;

/// Headings that identify each system prompt.
pub mod marker {
    pub const PLANNER: &str = "Planner Contract";
    pub const DECISION_EXTRACTION: &str = "Decision Extraction Contract";
    pub const SUBTASK_PLANNING: &str = "Subtask Planning Contract";
    pub const SOLUTION_PLANNING: &str = "Solution Planning Contract";
    pub const DEVELOPER: &str = "Developer Contract";
    pub const JOIN: &str = "Join Contract";
    pub const CRITIQUE: &str = "Critique Contract";
    pub const REVIEW_CODE: &str = "Review Contract (code)";
    pub const REVIEW_PLAN: &str = "Review Contract (plan)";
    pub const QA: &str = "QA Contract";
    pub const RESOLUTION: &str = "Resolution Contract";

    /// Extraction prompt for the structured type named `kind`.
    pub fn extract(kind: &str) -> String {
        format!("Structured Extraction Contract ({kind})")
    }
}

#[derive(Debug)]
struct Route {
    marker: String,
    replies: VecDeque<String>,
    calls: usize,
}

/// Language model that answers by matching a marker in the system prompt.
///
/// Each route replays its replies in order and repeats the last one forever.
/// A request no route matches is an error.
#[derive(Debug, Default)]
pub struct RoutedModel {
    routes: RefCell<Vec<Route>>,
    requests: RefCell<Vec<ChatRequest>>,
}

impl RoutedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, marker: impl Into<String>, replies: &[impl AsRef<str>]) -> Self {
        self.routes.borrow_mut().push(Route {
            marker: marker.into(),
            replies: replies.iter().map(|r| r.as_ref().to_string()).collect(),
            calls: 0,
        });
        self
    }

    pub fn calls(&self, marker: &str) -> usize {
        self.routes
            .borrow()
            .iter()
            .filter(|route| route.marker == marker)
            .map(|route| route.calls)
            .sum()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.borrow().clone()
    }
}

impl LanguageModel for RoutedModel {
    fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        let system = request
            .messages
            .iter()
            .find(|message| message.role == ChatRole::System)
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        let mut routes = self.routes.borrow_mut();
        let route = routes
            .iter_mut()
            .find(|route| system.contains(&route.marker))
            .ok_or_else(|| {
                anyhow!(
                    "no scripted route for prompt {:?}",
                    system.lines().next().unwrap_or_default()
                )
            })?;
        route.calls += 1;
        let content = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
        .ok_or_else(|| anyhow!("route {:?} has no replies", route.marker))?;
        self.requests.borrow_mut().push(request.clone());
        Ok(ChatReply {
            content,
            input_tokens: 10,
            output_tokens: 5,
            elapsed: Duration::from_millis(1),
        })
    }
}

#[derive(Debug)]
struct Outcome {
    needle: String,
    passed: VecDeque<usize>,
}

/// Test executor that scores programs by substring.
///
/// The first rule whose needle occurs in the code decides how many cases pass
/// (in order, repeating the last count). Code no rule matches passes nothing.
#[derive(Debug, Default)]
pub struct ScriptedTests {
    rules: RefCell<Vec<Outcome>>,
    runs: RefCell<Vec<String>>,
}

impl ScriptedTests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(self, needle: &str, passed: &[usize]) -> Self {
        self.rules.borrow_mut().push(Outcome {
            needle: needle.to_string(),
            passed: passed.iter().copied().collect(),
        });
        self
    }

    /// Programs run so far, in order.
    pub fn runs(&self) -> Vec<String> {
        self.runs.borrow().clone()
    }
}

impl TestExecutor for ScriptedTests {
    fn run(&self, code: &str, suite: &TestSuite) -> Result<TestsResult> {
        self.runs.borrow_mut().push(code.to_string());
        let total = suite.len();
        let passed = {
            let mut rules = self.rules.borrow_mut();
            match rules.iter_mut().find(|rule| code.contains(&rule.needle)) {
                Some(rule) if rule.passed.len() > 1 => rule.passed.pop_front().unwrap_or(0),
                Some(rule) => rule.passed.front().copied().unwrap_or(0),
                None => 0,
            }
        }
        .min(total);
        let errors = suite.test_cases[passed..]
            .iter()
            .map(|case| ErrorDetail {
                input: case.input.clone(),
                expected_output: case.expected_output.clone(),
                actual_output: String::new(),
                error_message: "Output mismatch".to_string(),
            })
            .collect();
        Ok(TestsResult::from_counts(code, 0.01, passed, total, errors))
    }
}

/// Executor whose infrastructure is always down.
#[derive(Debug, Default)]
pub struct BrokenTests;

impl TestExecutor for BrokenTests {
    fn run(&self, _code: &str, _suite: &TestSuite) -> Result<TestsResult> {
        Err(anyhow!("sandbox unavailable"))
    }
}

/// Syntax checker that accepts everything.
#[derive(Debug, Default)]
pub struct AcceptAllSyntax;

impl SyntaxChecker for AcceptAllSyntax {
    fn check(&self, _code: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Syntax checker that rejects programs containing a needle.
#[derive(Debug)]
pub struct RejectSyntax {
    needle: String,
}

impl RejectSyntax {
    pub fn new(needle: &str) -> Self {
        Self {
            needle: needle.to_string(),
        }
    }
}

impl SyntaxChecker for RejectSyntax {
    fn check(&self, code: &str) -> Result<Vec<String>> {
        if code.contains(&self.needle) {
            return Ok(vec![format!(
                "SyntaxError: invalid syntax near {:?}",
                self.needle
            )]);
        }
        Ok(Vec::new())
    }
}

/// Deterministic task spec named after its function.
pub fn spec(function_name: &str) -> TaskSpec {
    TaskSpec {
        definition: format!("Implement {function_name} for the puzzle"),
        function_name: function_name.to_string(),
        args: Vec::new(),
        definition_of_done: format!("{function_name} prints the right answer"),
        keywords: vec!["puzzle".to_string()],
    }
}

/// Standalone suite with `n` echo cases.
pub fn suite(n: usize) -> TestSuite {
    TestSuite::standalone(
        (0..n)
            .map(|i| TestCase {
                input: i.to_string(),
                expected_output: i.to_string(),
            })
            .collect(),
    )
}

/// Small budgets for orchestrator tests.
pub fn config() -> SolverConfig {
    SolverConfig {
        max_depth: 1,
        max_retry: 3,
        generation_retry: 2,
        judge_level: 0,
        use_similarity: false,
        ..SolverConfig::default()
    }
}

/// `code` wrapped in a python fence.
pub fn fenced(code: &str) -> String {
    format!("```python\n{code}\n```")
}

/// JSON reply for a solution set.
pub fn solution_set_json(strategies: &[(&str, &str)]) -> String {
    let solutions: Vec<_> = strategies
        .iter()
        .map(|(context, plan)| json!({ "context": context, "propose_solution": plan }))
        .collect();
    json!({ "solutions": solutions }).to_string()
}

/// JSON reply for a subtask plan with one subtask per function name.
pub fn subtask_plan_json(skeleton: &str, functions: &[&str]) -> String {
    let subtasks: Vec<_> = functions
        .iter()
        .map(|name| {
            json!({
                "definition": format!("Implement {name} for the puzzle"),
                "function_name": name,
                "args": [],
                "definition_of_done": format!("{name} prints the right answer"),
                "keywords": ["puzzle"],
            })
        })
        .collect();
    json!({ "skeleton": skeleton, "subtasks": subtasks }).to_string()
}

/// JSON reply for a QA suite with `n` echo cases.
pub fn suite_json(n: usize) -> String {
    let cases: Vec<_> = (0..n)
        .map(|i| json!({ "input": i.to_string(), "expected_output": i.to_string() }))
        .collect();
    json!({ "test_cases": cases, "harness": crate::core::types::IMPLEMENTATION_PLACEHOLDER })
        .to_string()
}
