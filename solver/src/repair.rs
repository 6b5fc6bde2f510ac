//! Repair loop driver.
//!
//! Performs the side effects of each [`RepairState`] and feeds the resulting
//! events back through [`RepairState::on`]. A loop is advanced one cycle at a
//! time so solution search can interleave candidates.

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::agents::developer::{Developer, GenerationError};
use crate::agents::judge::Judge;
use crate::core::budget::RetryBudget;
use crate::core::repair::{DoneReason, RepairEvent, RepairState};
use crate::core::types::{Solution, TaskSpec, TestSuite, TestsResult};
use crate::io::inference::TokenUsage;
use crate::io::test_runner::TestExecutor;

/// Everything the repair loop calls out to.
pub struct Crew<'a> {
    pub developer: Developer<'a>,
    pub judge: Judge<'a>,
    pub executor: &'a dyn TestExecutor,
    pub judge_level: u8,
}

/// One solution's repair loop.
#[derive(Debug, Clone)]
pub struct RepairLoop {
    state: RepairState,
    budget: RetryBudget,
    last_result: Option<TestsResult>,
}

impl RepairLoop {
    /// Loop for a solution with no program yet. `generations` bounds code generation.
    pub fn fresh(generations: u32) -> Self {
        Self::starting(false, generations)
    }

    /// Loop for a solution that already carries an untested program.
    pub fn from_program(generations: u32) -> Self {
        Self::starting(true, generations)
    }

    fn starting(has_program: bool, generations: u32) -> Self {
        Self {
            state: RepairState::start(has_program, generations),
            budget: RetryBudget::new(generations),
            last_result: None,
        }
    }

    pub fn state(&self) -> RepairState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    pub fn generations_used(&self) -> u32 {
        self.budget.used()
    }

    pub fn last_result(&self) -> Option<&TestsResult> {
        self.last_result.as_ref()
    }

    /// Run one cycle: stop after a critique (next step is generation) or when done.
    #[instrument(skip_all, fields(function = %spec.function_name, state = ?self.state))]
    pub fn advance(
        &mut self,
        crew: &Crew<'_>,
        spec: &TaskSpec,
        suite: &TestSuite,
        solution: &mut Solution,
        usage: &mut TokenUsage,
    ) -> Result<()> {
        loop {
            let event = match self.state {
                RepairState::Done(_) => return Ok(()),
                RepairState::Generating => {
                    if !self.budget.try_consume() {
                        return Err(anyhow!("repair loop generating with no budget left"));
                    }
                    self.generate(crew, spec, suite, solution, usage)?
                }
                RepairState::Testing => self.test(crew, suite, solution),
                RepairState::Critiquing => self.critique(crew, suite, solution, usage)?,
            };
            let next = self.state.on(event, self.budget.remaining())?;
            debug!(from = ?self.state, to = ?next, "repair transition");
            let cycle_over = next == RepairState::Generating;
            self.state = next;
            if let RepairState::Done(reason) = next {
                info!(
                    ?reason,
                    success_rate = solution.success_rate,
                    generations = self.budget.used(),
                    "repair loop finished"
                );
                return Ok(());
            }
            if cycle_over {
                return Ok(());
            }
        }
    }

    /// Advance until done.
    pub fn run_to_completion(
        &mut self,
        crew: &Crew<'_>,
        spec: &TaskSpec,
        suite: &TestSuite,
        solution: &mut Solution,
        usage: &mut TokenUsage,
    ) -> Result<DoneReason> {
        loop {
            if let RepairState::Done(reason) = self.state {
                return Ok(reason);
            }
            self.advance(crew, spec, suite, solution, usage)?;
        }
    }

    fn generate(
        &mut self,
        crew: &Crew<'_>,
        spec: &TaskSpec,
        suite: &TestSuite,
        solution: &mut Solution,
        usage: &mut TokenUsage,
    ) -> Result<RepairEvent> {
        if crew.judge_level >= 2 {
            let verdict = crew.judge.review_plan(spec, solution, usage)?;
            if !verdict.is_correct {
                solution.record_judge(format!("Plan review: {}", verdict.feedback));
            }
        }

        let code = match generation(crew.developer.generate(spec, suite, solution, usage))? {
            Some(code) => code,
            None => {
                solution.record_generation_failure();
                return Ok(RepairEvent::GenerationFailed);
            }
        };
        solution.record_developer(code.as_str());

        if crew.judge_level >= 1 {
            let verdict = crew.judge.review_code(spec, solution, &code, usage)?;
            if !verdict.is_correct {
                solution.record_judge(format!("Code review: {}", verdict.feedback));
                if let Some(revised) =
                    generation(crew.developer.generate(spec, suite, solution, usage))?
                {
                    solution.record_developer(revised);
                }
            }
        }
        Ok(RepairEvent::Generated)
    }

    fn test(&mut self, crew: &Crew<'_>, suite: &TestSuite, solution: &mut Solution) -> RepairEvent {
        let code = solution.last_code().unwrap_or_default().to_string();
        let result = match crew.executor.run(&code, suite) {
            Ok(result) => result,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "test executor failed, scoring 0");
                TestsResult::infrastructure_failure(&code, suite.len(), format!("{err:#}"))
            }
        };
        let event = RepairEvent::Tested {
            passed: result.passed,
            total: result.total,
        };
        if solution.record_score(&code, result.success_rate) {
            debug!(success_rate = result.success_rate, "best program updated");
        }
        self.last_result = Some(result);
        event
    }

    fn critique(
        &mut self,
        crew: &Crew<'_>,
        suite: &TestSuite,
        solution: &mut Solution,
        usage: &mut TokenUsage,
    ) -> Result<RepairEvent> {
        let result = self
            .last_result
            .as_ref()
            .ok_or_else(|| anyhow!("critique requested before any test run"))?;
        let critique = crew.judge.critique(solution, suite, result, usage)?;
        solution.record_judge(critique.raw);
        solution.apply_revision(critique.revision);
        Ok(RepairEvent::Critiqued)
    }
}

/// `Ok(None)` when the developer ran out of generation retries; other errors propagate.
fn generation(result: Result<String>) -> Result<Option<String>> {
    match result {
        Ok(code) => Ok(Some(code)),
        Err(err) => {
            if let Some(failure) = err.downcast_ref::<GenerationError>() {
                warn!(attempts = failure.attempts, "code generation failed, round scores 0");
                return Ok(None);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentContext;
    use crate::core::types::{HistoryRole, Strategy};
    use crate::io::inference::InferenceAdapter;
    use crate::io::prompt::PromptBuilder;
    use crate::test_support::{
        AcceptAllSyntax, BrokenTests, RejectSyntax, RoutedModel, ScriptedTests, fenced, marker,
        spec, suite,
    };

    fn seed() -> Solution {
        Solution::from_seed(Strategy {
            context: "echo".to_string(),
            propose_solution: "print input".to_string(),
        })
    }

    fn crew<'a>(
        model: &'a RoutedModel,
        prompts: &'a PromptBuilder,
        executor: &'a dyn TestExecutor,
        checker: &'a dyn crate::io::syntax::SyntaxChecker,
        judge_level: u8,
    ) -> Crew<'a> {
        let ctx = AgentContext::new(InferenceAdapter::new(model), prompts);
        Crew {
            developer: Developer::new(ctx, checker, 2),
            judge: Judge::new(ctx),
            executor,
            judge_level,
        }
    }

    const CRITIQUE: &str = "<context>missed a case</context><propose_solution>fix it</propose_solution>";

    #[test]
    fn one_cycle_stops_after_critique() {
        let model = RoutedModel::new()
            .route(marker::DEVELOPER, &[fenced("v1"), fenced("v2")])
            .route(marker::CRITIQUE, &[CRITIQUE]);
        let prompts = PromptBuilder::new(10_000);
        let tests = ScriptedTests::new().when("v1", &[1]).when("v2", &[2]);
        let crew = crew(&model, &prompts, &tests, &AcceptAllSyntax, 0);
        let mut solution = seed();
        let mut usage = TokenUsage::default();
        let mut repair = RepairLoop::fresh(3);

        repair
            .advance(&crew, &spec("echo"), &suite(2), &mut solution, &mut usage)
            .expect("advance");
        assert_eq!(repair.state(), RepairState::Generating);
        assert_eq!(solution.success_rate, 0.5);
        assert_eq!(solution.propose_solution, "fix it");

        repair
            .advance(&crew, &spec("echo"), &suite(2), &mut solution, &mut usage)
            .expect("advance");
        assert_eq!(repair.state(), RepairState::Done(DoneReason::Solved));
        assert_eq!(solution.best_code, "v2");
        assert_eq!(repair.generations_used(), 2);
    }

    #[test]
    fn exhausted_generation_scores_zero_and_retries() {
        let model = RoutedModel::new().route(marker::DEVELOPER, &[fenced("broken")]);
        let prompts = PromptBuilder::new(10_000);
        let tests = ScriptedTests::new();
        let checker = RejectSyntax::new("broken");
        let crew = crew(&model, &prompts, &tests, &checker, 0);
        let mut solution = seed();
        let mut usage = TokenUsage::default();
        let mut repair = RepairLoop::fresh(2);

        let reason = repair
            .run_to_completion(&crew, &spec("echo"), &suite(1), &mut solution, &mut usage)
            .expect("run");
        assert_eq!(reason, DoneReason::BudgetExhausted);
        assert_eq!(solution.success_rate, 0.0);
        assert!(tests.runs().is_empty());
        // Two rounds of two syntax attempts each.
        assert_eq!(model.calls(marker::DEVELOPER), 4);
    }

    #[test]
    fn executor_failure_scores_zero() {
        let model = RoutedModel::new().route(marker::DEVELOPER, &[fenced("v1")]);
        let prompts = PromptBuilder::new(10_000);
        let crew = crew(&model, &prompts, &BrokenTests, &AcceptAllSyntax, 0);
        let mut solution = seed();
        let mut usage = TokenUsage::default();
        let mut repair = RepairLoop::fresh(1);

        repair
            .run_to_completion(&crew, &spec("echo"), &suite(3), &mut solution, &mut usage)
            .expect("run");
        assert_eq!(solution.success_rate, 0.0);
        let result = repair.last_result().expect("result");
        assert!(result.errors[0].error_message.contains("sandbox unavailable"));
    }

    #[test]
    fn program_loop_tests_before_generating() {
        let model = RoutedModel::new();
        let prompts = PromptBuilder::new(10_000);
        let tests = ScriptedTests::new().when("merged", &[2]);
        let crew = crew(&model, &prompts, &tests, &AcceptAllSyntax, 0);
        let mut solution = Solution::with_program(
            "task".to_string(),
            "skeleton".to_string(),
            "merged".to_string(),
        );
        let mut usage = TokenUsage::default();
        let mut repair = RepairLoop::from_program(3);

        let reason = repair
            .run_to_completion(&crew, &spec("echo"), &suite(2), &mut solution, &mut usage)
            .expect("run");
        assert_eq!(reason, DoneReason::Solved);
        assert_eq!(model.total_calls(), 0);
        assert_eq!(repair.generations_used(), 0);
    }

    #[test]
    fn code_review_rejection_regenerates_once() {
        let model = RoutedModel::new()
            .route(marker::DEVELOPER, &[fenced("v1"), fenced("v2")])
            .route(
                marker::REVIEW_CODE,
                &["<is_correct>false</is_correct><feedback>off by one</feedback>"],
            );
        let prompts = PromptBuilder::new(10_000);
        let tests = ScriptedTests::new().when("v2", &[1]);
        let crew = crew(&model, &prompts, &tests, &AcceptAllSyntax, 1);
        let mut solution = seed();
        let mut usage = TokenUsage::default();
        let mut repair = RepairLoop::fresh(1);

        repair
            .run_to_completion(&crew, &spec("echo"), &suite(1), &mut solution, &mut usage)
            .expect("run");
        assert_eq!(tests.runs(), vec!["v2".to_string()]);
        assert_eq!(solution.count(HistoryRole::Developer), 2);
        assert_eq!(solution.count(HistoryRole::Judge), 1);
        assert_eq!(repair.generations_used(), 1);
    }

    #[test]
    fn zero_budget_never_generates() {
        let repair = RepairLoop::fresh(0);
        assert_eq!(repair.state(), RepairState::Done(DoneReason::BudgetExhausted));
    }
}
