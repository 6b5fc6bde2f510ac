//! Domain types shared by the planner, the repair loop and the adapters.

use serde::{Deserialize, Serialize};

/// Success rate of a solution that has never been tested.
pub const UNTRIED_RATE: f64 = -1.0;

/// Marker in a harness where the implementation under test is spliced in.
pub const IMPLEMENTATION_PLACEHOLDER: &str = "# FUNCTION_IMPLEMENTATION_HERE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionArg {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub description: String,
}

/// What a task asks for, before any test suite or solution exists.
///
/// Used for the root problem and for every subtask a plan synthesizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub definition: String,
    pub function_name: String,
    #[serde(default)]
    pub args: Vec<FunctionArg>,
    #[serde(alias = "dod")]
    pub definition_of_done: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl TaskSpec {
    /// Python-style signature line, e.g. `parse(text: str, strict: bool)`.
    pub fn signature(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|arg| format!("{}: {}", arg.name, arg.ty))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({args})", self.function_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

/// Ordered test cases plus the harness program they run against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    pub test_cases: Vec<TestCase>,
    pub harness: String,
}

impl TestSuite {
    pub fn new(test_cases: Vec<TestCase>, harness: impl Into<String>) -> Self {
        let harness = harness.into();
        let harness = if harness.contains(IMPLEMENTATION_PLACEHOLDER) {
            harness
        } else {
            IMPLEMENTATION_PLACEHOLDER.to_string()
        };
        Self {
            test_cases,
            harness,
        }
    }

    /// Suite whose program is the implementation itself (stdin/stdout problems).
    pub fn standalone(test_cases: Vec<TestCase>) -> Self {
        Self::new(test_cases, IMPLEMENTATION_PLACEHOLDER)
    }

    pub fn len(&self) -> usize {
        self.test_cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_cases.is_empty()
    }

    /// Full program for one implementation.
    pub fn program_for(&self, implementation: &str) -> String {
        self.harness
            .replacen(IMPLEMENTATION_PLACEHOLDER, implementation, 1)
    }

    /// Human-readable listing used in prompts.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (idx, case) in self.test_cases.iter().enumerate() {
            out.push_str(&format!(
                "Test {}:\nInput:\n{}\nExpected output:\n{}\n\n",
                idx + 1,
                case.input.trim_end(),
                case.expected_output.trim_end()
            ));
        }
        out.trim_end().to_string()
    }
}

/// One failing test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub error_message: String,
}

/// Aggregate outcome of running one program against a suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestsResult {
    pub raw_code: String,
    pub total_time_secs: f64,
    pub passed: usize,
    pub total: usize,
    pub success_rate: f64,
    pub errors: Vec<ErrorDetail>,
}

impl TestsResult {
    pub fn from_counts(
        raw_code: impl Into<String>,
        total_time_secs: f64,
        passed: usize,
        total: usize,
        errors: Vec<ErrorDetail>,
    ) -> Self {
        Self {
            raw_code: raw_code.into(),
            total_time_secs,
            passed,
            total,
            success_rate: success_rate(passed, total),
            errors,
        }
    }

    /// Zero-score result for a run the executor could not perform at all.
    pub fn infrastructure_failure(
        raw_code: impl Into<String>,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let error = ErrorDetail {
            input: String::new(),
            expected_output: String::new(),
            actual_output: String::new(),
            error_message: format!("Infrastructure Execution Error: {}", message.into()),
        };
        Self::from_counts(raw_code, 0.0, 0, total, vec![error])
    }

    /// Every case passed. Decided on counts, never on the ratio.
    pub fn is_perfect(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }

    /// Failure report handed to the critic.
    pub fn report(&self) -> String {
        if self.errors.is_empty() {
            return "No failing test cases.".to_string();
        }
        let mut out = String::new();
        for (idx, error) in self.errors.iter().enumerate() {
            out.push_str(&format!(
                "Error {}:\nInput:\n{}\nExpected:\n{}\nActual:\n{}\nMessage: {}\n\n",
                idx + 1,
                error.input.trim_end(),
                error.expected_output.trim_end(),
                error.actual_output.trim_end(),
                error.error_message
            ));
        }
        out.trim_end().to_string()
    }
}

/// Exact `passed / total`; 0.0 for an empty suite. Round only when printing.
pub fn success_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    passed as f64 / total as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    Developer,
    Judge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

/// Rationale plus plan. Produced by the planner as a seed and by the critic as a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub context: String,
    pub propose_solution: String,
}

/// A candidate approach and its attempt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub context: String,
    pub propose_solution: String,
    pub best_code: String,
    pub success_rate: f64,
    pub history: Vec<HistoryEntry>,
}

impl Solution {
    pub fn from_seed(seed: Strategy) -> Self {
        Self {
            context: seed.context,
            propose_solution: seed.propose_solution,
            best_code: String::new(),
            success_rate: UNTRIED_RATE,
            history: Vec::new(),
        }
    }

    /// Solution that already holds an untested program (the composer's merged code).
    pub fn with_program(context: String, propose_solution: String, code: String) -> Self {
        Self {
            context,
            propose_solution,
            best_code: code.clone(),
            success_rate: 0.0,
            history: vec![HistoryEntry {
                role: HistoryRole::Developer,
                content: code,
            }],
        }
    }

    pub fn record_developer(&mut self, code: impl Into<String>) {
        self.history.push(HistoryEntry {
            role: HistoryRole::Developer,
            content: code.into(),
        });
    }

    pub fn record_judge(&mut self, critique: impl Into<String>) {
        self.history.push(HistoryEntry {
            role: HistoryRole::Judge,
            content: critique.into(),
        });
    }

    /// Most recent developer entry.
    pub fn last_code(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|entry| entry.role == HistoryRole::Developer)
            .map(|entry| entry.content.as_str())
    }

    pub fn count(&self, role: HistoryRole) -> usize {
        self.history.iter().filter(|entry| entry.role == role).count()
    }

    /// Keep `code` as the best program when `rate` ties or beats the current one.
    ///
    /// Returns whether the best program changed. Ties favour the newer attempt.
    pub fn record_score(&mut self, code: &str, rate: f64) -> bool {
        if rate >= self.success_rate {
            self.best_code = code.to_string();
            self.success_rate = rate;
            return true;
        }
        false
    }

    /// A round whose code could not be generated scores 0.0 without replacing any program.
    pub fn record_generation_failure(&mut self) {
        if self.success_rate < 0.0 {
            self.success_rate = 0.0;
        }
    }

    /// Append the critic's diagnosis to the narrative and adopt its plan.
    pub fn apply_revision(&mut self, revision: Strategy) {
        let diagnosis = revision.context.trim();
        if !diagnosis.is_empty() {
            if !self.context.is_empty() {
                self.context.push_str("\n\n");
            }
            self.context.push_str(diagnosis);
        }
        self.propose_solution = revision.propose_solution;
    }
}

/// Decomposition proposal: a skeleton program plus its subtasks in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskPlan {
    pub skeleton: String,
    pub subtasks: Vec<TaskSpec>,
}

/// Candidate strategies for solving a task directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionSet {
    pub solutions: Vec<Strategy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Subtasks,
    Solutions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Subtasks(SubtaskPlan),
    Solutions(Vec<Strategy>),
}

/// Planner output. Exactly one branch is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanResponse {
    pub reasoning: String,
    pub plan: Plan,
}

impl PlanResponse {
    pub fn kind(&self) -> PlanKind {
        match self.plan {
            Plan::Subtasks(_) => PlanKind::Subtasks,
            Plan::Solutions(_) => PlanKind::Solutions,
        }
    }
}

/// Judge verdict on a plan or a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_correct: bool,
    pub feedback: String,
}

/// A task with its test suite and the best result found for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub spec: TaskSpec,
    pub test_suite: TestSuite,
    pub template: String,
    pub best_solution: String,
    pub best_solution_rating: f64,
    pub code: String,
}

impl Task {
    pub fn new(spec: TaskSpec, test_suite: TestSuite) -> Self {
        Self {
            spec,
            test_suite,
            template: String::new(),
            best_solution: String::new(),
            best_solution_rating: 0.0,
            code: String::new(),
        }
    }

    /// Take over a solution's plan and program unless it rates below what is stored.
    pub fn adopt(&mut self, solution: &Solution) -> bool {
        if solution.success_rate < self.best_solution_rating {
            return false;
        }
        self.best_solution = solution.propose_solution.clone();
        self.best_solution_rating = solution.success_rate;
        self.code = solution.best_code.clone();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Strategy {
        Strategy {
            context: "sum the list".to_string(),
            propose_solution: "loop and add".to_string(),
        }
    }

    #[test]
    fn success_rate_is_the_exact_ratio() {
        assert_eq!(success_rate(1, 4), 0.25);
        assert_eq!(success_rate(399, 400), 0.9975);
        assert_eq!(success_rate(4, 4), 1.0);
        assert_eq!(success_rate(0, 0), 0.0);
    }

    #[test]
    fn one_failing_case_is_never_perfect() {
        let almost = TestsResult::from_counts("almost", 0.1, 399, 400, Vec::new());
        assert!(almost.success_rate < 1.0);
        assert!(!almost.is_perfect());
        assert!(TestsResult::from_counts("exact", 0.1, 400, 400, Vec::new()).is_perfect());
        assert!(!TestsResult::from_counts("empty", 0.0, 0, 0, Vec::new()).is_perfect());
    }

    #[test]
    fn record_score_prefers_newer_attempt_on_tie() {
        let mut solution = Solution::from_seed(seed());
        assert!(solution.record_score("first", 0.5));
        assert!(solution.record_score("second", 0.5));
        assert!(!solution.record_score("third", 0.25));
        assert_eq!(solution.best_code, "second");
        assert_eq!(solution.success_rate, 0.5);
    }

    #[test]
    fn generation_failure_only_lifts_untried_rate() {
        let mut solution = Solution::from_seed(seed());
        solution.record_generation_failure();
        assert_eq!(solution.success_rate, 0.0);
        solution.record_score("code", 0.5);
        solution.record_generation_failure();
        assert_eq!(solution.success_rate, 0.5);
        assert_eq!(solution.best_code, "code");
    }

    #[test]
    fn revision_appends_context_and_replaces_plan() {
        let mut solution = Solution::from_seed(seed());
        solution.apply_revision(Strategy {
            context: "off by one on empty input".to_string(),
            propose_solution: "handle empty list first".to_string(),
        });
        assert_eq!(solution.context, "sum the list\n\noff by one on empty input");
        assert_eq!(solution.propose_solution, "handle empty list first");
    }

    #[test]
    fn last_code_skips_judge_entries() {
        let mut solution = Solution::from_seed(seed());
        solution.record_developer("v1");
        solution.record_judge("wrong");
        assert_eq!(solution.last_code(), Some("v1"));
        assert_eq!(solution.count(HistoryRole::Judge), 1);
    }

    #[test]
    fn task_adopt_never_lowers_rating() {
        let spec = TaskSpec {
            definition: "d".to_string(),
            function_name: "f".to_string(),
            args: Vec::new(),
            definition_of_done: "done".to_string(),
            keywords: Vec::new(),
        };
        let mut task = Task::new(spec, TestSuite::standalone(Vec::new()));
        let mut good = Solution::from_seed(seed());
        good.record_score("good", 0.75);
        assert!(task.adopt(&good));

        let mut worse = Solution::from_seed(seed());
        worse.record_score("worse", 0.5);
        assert!(!task.adopt(&worse));
        assert_eq!(task.code, "good");
        assert_eq!(task.best_solution_rating, 0.75);
    }

    #[test]
    fn untried_solution_is_not_adopted() {
        let spec = TaskSpec {
            definition: "d".to_string(),
            function_name: "f".to_string(),
            args: Vec::new(),
            definition_of_done: "done".to_string(),
            keywords: Vec::new(),
        };
        let mut task = Task::new(spec, TestSuite::standalone(Vec::new()));
        assert!(!task.adopt(&Solution::from_seed(seed())));
    }

    #[test]
    fn harness_without_placeholder_is_replaced() {
        let suite = TestSuite::new(Vec::new(), "print(solve())");
        assert_eq!(suite.program_for("def solve(): return 1"), "def solve(): return 1");

        let suite = TestSuite::new(
            Vec::new(),
            format!("{IMPLEMENTATION_PLACEHOLDER}\nprint(solve())"),
        );
        assert_eq!(
            suite.program_for("def solve(): return 1"),
            "def solve(): return 1\nprint(solve())"
        );
    }

    #[test]
    fn signature_lists_typed_args() {
        let spec = TaskSpec {
            definition: "d".to_string(),
            function_name: "parse".to_string(),
            args: vec![
                FunctionArg {
                    name: "text".to_string(),
                    ty: "str".to_string(),
                    description: String::new(),
                },
                FunctionArg {
                    name: "strict".to_string(),
                    ty: "bool".to_string(),
                    description: String::new(),
                },
            ],
            definition_of_done: "done".to_string(),
            keywords: Vec::new(),
        };
        assert_eq!(spec.signature(), "parse(text: str, strict: bool)");
    }
}
