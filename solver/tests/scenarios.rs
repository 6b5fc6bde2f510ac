//! End-to-end solves against scripted collaborators.
//!
//! Models are routed by system-prompt heading and test runs are scored by
//! substring, so every scenario is deterministic and needs no network or Python.

use solver::agents::AgentContext;
use solver::agents::developer::Developer;
use solver::agents::judge::Judge;
use solver::agents::qa::ProvidedSuite;
use solver::core::repair::RepairState;
use solver::core::types::{HistoryRole, Solution, Strategy, Task};
use solver::io::config::SolverConfig;
use solver::io::inference::{InferenceAdapter, TokenUsage};
use solver::io::prompt::PromptBuilder;
use solver::io::similarity::KeywordIndex;
use solver::io::syntax::SyntaxChecker;
use solver::io::test_runner::TestExecutor;
use solver::orchestrator::{Collaborators, Orchestrator, SolveOutcome};
use solver::repair::{Crew, RepairLoop};
use solver::search::search;
use solver::test_support::{
    AcceptAllSyntax, BrokenTests, RejectSyntax, RoutedModel, ScriptedTests, config, fenced,
    marker, solution_set_json, spec, subtask_plan_json, suite,
};

const CRITIQUE: &str =
    "<context>the parser drops the last line</context><propose_solution>read all lines</propose_solution>";

fn one_strategy() -> String {
    solution_set_json(&[("echo the input", "print what was read")])
}

fn flat_config(max_retry: u32) -> SolverConfig {
    SolverConfig {
        max_depth: 0,
        max_retry,
        ..config()
    }
}

fn deps<'a>(
    model: &'a RoutedModel,
    tests: &'a dyn TestExecutor,
    checker: &'a dyn SyntaxChecker,
) -> Collaborators<'a> {
    Collaborators {
        model,
        executor: tests,
        checker,
        tests: None,
        index: None,
    }
}

fn root(outcome: &SolveOutcome) -> &Task {
    outcome.root_task().expect("root task")
}

#[test]
fn scenario_a_first_attempt_passes() {
    let model = RoutedModel::new()
        .route(marker::SOLUTION_PLANNING, &[one_strategy()])
        .route(marker::DEVELOPER, &[fenced("print(input())")])
        .route(marker::RESOLUTION, &["echo template"]);
    let tests = ScriptedTests::new().when("print(input())", &[2]);
    let orchestrator =
        Orchestrator::new(flat_config(3), deps(&model, &tests, &AcceptAllSyntax)).expect("new");

    let outcome = orchestrator
        .solve_with_suite(spec("echo"), suite(2))
        .expect("solve");
    let task = root(&outcome);
    assert_eq!(task.best_solution_rating, 1.0);
    assert_eq!(task.code, "print(input())");
    assert_eq!(task.template, "echo template");
    assert_eq!(model.calls(marker::DEVELOPER), 1);
    assert_eq!(model.calls(marker::CRITIQUE), 0);
    assert_eq!(tests.runs().len(), 1);
}

fn crew<'a>(
    model: &'a RoutedModel,
    prompts: &'a PromptBuilder,
    tests: &'a dyn TestExecutor,
    checker: &'a dyn SyntaxChecker,
) -> Crew<'a> {
    let ctx = AgentContext::new(InferenceAdapter::new(model), prompts);
    Crew {
        developer: Developer::new(ctx, checker, 2),
        judge: Judge::new(ctx),
        executor: tests,
        judge_level: 0,
    }
}

#[test]
fn scenario_b_critique_fixes_the_plan() {
    let model = RoutedModel::new()
        .route(marker::DEVELOPER, &[fenced("attempt_one"), fenced("attempt_two")])
        .route(marker::CRITIQUE, &[CRITIQUE]);
    let tests = ScriptedTests::new()
        .when("attempt_one", &[1])
        .when("attempt_two", &[4]);
    let prompts = PromptBuilder::new(60_000);
    let crew = crew(&model, &prompts, &tests, &AcceptAllSyntax);
    let mut task = Task::new(spec("lines"), suite(4));
    let mut usage = TokenUsage::default();

    let outcome = search(
        &mut task,
        vec![Strategy {
            context: "line reader".to_string(),
            propose_solution: "read one line".to_string(),
        }],
        &crew,
        3,
        &mut usage,
    )
    .expect("search");

    let best = outcome.best.expect("winner");
    assert_eq!(best.success_rate, 1.0);
    assert_eq!(best.count(HistoryRole::Developer), 2);
    assert_eq!(best.count(HistoryRole::Judge), 1);
    assert_eq!(best.propose_solution, "read all lines");
    assert!(best.context.contains("drops the last line"));
    assert_eq!(task.best_solution_rating, 1.0);
    assert_eq!(task.code, "attempt_two");
}

#[test]
fn scenario_c_budget_caps_cycles_and_ties_prefer_later() {
    let model = RoutedModel::new()
        .route(marker::SOLUTION_PLANNING, &[one_strategy()])
        .route(marker::DEVELOPER, &[fenced("early"), fenced("late")])
        .route(marker::CRITIQUE, &[CRITIQUE])
        .route(marker::RESOLUTION, &["half"]);
    let tests = ScriptedTests::new().when("early", &[2]).when("late", &[2]);
    let orchestrator =
        Orchestrator::new(flat_config(2), deps(&model, &tests, &AcceptAllSyntax)).expect("new");

    let outcome = orchestrator
        .solve_with_suite(spec("half"), suite(4))
        .expect("solve");
    let task = root(&outcome);
    assert_eq!(tests.runs(), vec!["early".to_string(), "late".to_string()]);
    assert_eq!(model.calls(marker::DEVELOPER), 2);
    assert_eq!(model.calls(marker::CRITIQUE), 1);
    assert_eq!(task.best_solution_rating, 0.5);
    assert_eq!(task.code, "late");
}

#[test]
fn scenario_d_unreadable_decision_defaults_to_solutions() {
    let model = RoutedModel::new()
        .route(marker::PLANNER, &["Hard to say; both approaches have merit."])
        .route(marker::DECISION_EXTRACTION, &["I cannot tell."])
        .route(marker::SOLUTION_PLANNING, &[one_strategy()])
        .route(marker::DEVELOPER, &[fenced("print(input())")])
        .route(marker::RESOLUTION, &["direct"]);
    let tests = ScriptedTests::new().when("print(input())", &[1]);
    let orchestrator =
        Orchestrator::new(config(), deps(&model, &tests, &AcceptAllSyntax)).expect("new");

    let outcome = orchestrator
        .solve_with_suite(spec("echo"), suite(1))
        .expect("solve");
    assert_eq!(model.calls(marker::PLANNER), 1);
    assert_eq!(model.calls(marker::DECISION_EXTRACTION), 1);
    assert_eq!(model.calls(marker::SUBTASK_PLANNING), 0);
    assert_eq!(outcome.arena.len(), 1);
    assert_eq!(root(&outcome).best_solution_rating, 1.0);
}

#[test]
fn scenario_e_composer_repairs_the_merged_program() {
    let model = RoutedModel::new()
        .route(marker::PLANNER, &["Parsing and scoring are separate. FINAL DECISION: subtasks"])
        .route(
            marker::SUBTASK_PLANNING,
            &[subtask_plan_json("def main():\n    print(score(parse()))", &["parse", "score"])],
        )
        .route(marker::SOLUTION_PLANNING, &[one_strategy()])
        .route(
            marker::DEVELOPER,
            &[
                fenced("def parse(): ..."),
                fenced("def score(): ..."),
                fenced("repaired_program"),
            ],
        )
        .route(marker::JOIN, &[fenced("joined_program")])
        .route(marker::CRITIQUE, &[CRITIQUE])
        .route(marker::RESOLUTION, &["composed"]);
    let tests = ScriptedTests::new()
        .when("def parse", &[2])
        .when("def score", &[2])
        .when("joined_program", &[2])
        .when("repaired_program", &[3]);
    let subtask_suite = ProvidedSuite(suite(2));
    let orchestrator = Orchestrator::new(
        config(),
        Collaborators {
            tests: Some(&subtask_suite),
            ..deps(&model, &tests, &AcceptAllSyntax)
        },
    )
    .expect("new");

    let outcome = orchestrator
        .solve_with_suite(spec("main"), suite(3))
        .expect("solve");

    assert_eq!(outcome.arena.len(), 3);
    let children = outcome.arena.children(outcome.root);
    assert_eq!(children.len(), 2);
    for child in children {
        let task = outcome.arena.task(*child).expect("child");
        assert_eq!(task.best_solution_rating, 1.0);
    }
    assert_eq!(outcome.arena.path(children[1]), "main/score");

    let task = root(&outcome);
    assert_eq!(task.best_solution_rating, 1.0);
    assert_eq!(task.code, "repaired_program");
    assert_eq!(model.calls(marker::JOIN), 1);
    assert_eq!(model.calls(marker::CRITIQUE), 1);
    // Two subtask programs plus one regeneration of the merge.
    assert_eq!(model.calls(marker::DEVELOPER), 3);
    // Subtasks sit at the final depth and skip the decision step.
    assert_eq!(model.calls(marker::PLANNER), 1);
    assert_eq!(model.calls(marker::RESOLUTION), 3);
}

fn composing_model(join_reply: &str) -> RoutedModel {
    RoutedModel::new()
        .route(marker::PLANNER, &["Parsing and scoring are separate. FINAL DECISION: subtasks"])
        .route(
            marker::SUBTASK_PLANNING,
            &[subtask_plan_json("def main():\n    print(score(parse()))", &["parse", "score"])],
        )
        .route(marker::SOLUTION_PLANNING, &[one_strategy()])
        .route(
            marker::DEVELOPER,
            &[
                fenced("def parse(): ..."),
                fenced("def score(): ..."),
                fenced("repaired_program"),
            ],
        )
        .route(marker::JOIN, &[fenced(join_reply)])
        .route(marker::CRITIQUE, &[CRITIQUE])
        .route(marker::RESOLUTION, &["composed"])
}

#[test]
fn failed_join_is_repaired_from_an_empty_program() {
    let model = composing_model("broken_join");
    let tests = ScriptedTests::new()
        .when("def parse", &[2])
        .when("def score", &[2])
        .when("repaired_program", &[3]);
    let checker = RejectSyntax::new("broken_join");
    let subtask_suite = ProvidedSuite(suite(2));
    let orchestrator = Orchestrator::new(
        config(),
        Collaborators {
            tests: Some(&subtask_suite),
            ..deps(&model, &tests, &checker)
        },
    )
    .expect("new");

    let outcome = orchestrator
        .solve_with_suite(spec("main"), suite(3))
        .expect("solve");

    // Every join attempt was rejected by the syntax check.
    assert_eq!(model.calls(marker::JOIN), config().generation_retry as usize);
    let runs = tests.runs();
    let empty = runs
        .iter()
        .position(String::is_empty)
        .expect("empty program tested");
    assert_eq!(runs[empty + 1..], ["repaired_program".to_string()]);
    assert!(runs.iter().all(|code| !code.contains("broken_join")));

    let task = root(&outcome);
    assert_eq!(task.best_solution_rating, 1.0);
    assert_eq!(task.code, "repaired_program");
    assert_eq!(model.calls(marker::CRITIQUE), 1);
    // The critique of the empty program starts from the skeleton plan.
    let critique = model
        .requests()
        .into_iter()
        .find(|request| request.messages[0].content.contains(marker::CRITIQUE))
        .expect("critique request");
    assert!(
        critique
            .messages
            .iter()
            .any(|message| message.content.contains("print(score(parse()))"))
    );
}

#[test]
fn merged_program_survives_a_broken_executor() {
    let model = composing_model("joined_program");
    let subtask_suite = ProvidedSuite(suite(2));
    let cfg = SolverConfig {
        max_retry: 1,
        ..config()
    };
    let orchestrator = Orchestrator::new(
        cfg,
        Collaborators {
            tests: Some(&subtask_suite),
            ..deps(&model, &BrokenTests, &AcceptAllSyntax)
        },
    )
    .expect("new");

    let outcome = orchestrator
        .solve_with_suite(spec("main"), suite(3))
        .expect("infrastructure failures score zero instead of aborting");

    assert_eq!(model.calls(marker::JOIN), 1);
    let task = root(&outcome);
    assert_eq!(task.best_solution_rating, 0.0);
    // The merge scored zero, was critiqued once, and the regenerated program won the tie.
    assert_eq!(task.code, "repaired_program");
    assert_eq!(model.calls(marker::CRITIQUE), 1);
}

#[test]
fn final_depth_never_decomposes() {
    let model = RoutedModel::new()
        .route(marker::PLANNER, &["FINAL DECISION: subtasks"])
        .route(marker::SUBTASK_PLANNING, &[subtask_plan_json("skeleton", &["a", "b"])])
        .route(marker::SOLUTION_PLANNING, &[one_strategy()])
        .route(marker::DEVELOPER, &[fenced("x")])
        .route(marker::RESOLUTION, &["t"]);
    let tests = ScriptedTests::new();
    let orchestrator =
        Orchestrator::new(flat_config(1), deps(&model, &tests, &AcceptAllSyntax)).expect("new");

    let outcome = orchestrator
        .solve_with_suite(spec("main"), suite(1))
        .expect("solve");
    assert_eq!(outcome.arena.len(), 1);
    assert_eq!(model.calls(marker::PLANNER), 0);
    assert_eq!(model.calls(marker::SUBTASK_PLANNING), 0);
}

#[test]
fn stored_best_never_regresses() {
    let model = RoutedModel::new()
        .route(
            marker::DEVELOPER,
            &[fenced("v_a"), fenced("v_b"), fenced("v_c"), fenced("v_d")],
        )
        .route(marker::CRITIQUE, &[CRITIQUE]);
    let tests = ScriptedTests::new()
        .when("v_a", &[3])
        .when("v_b", &[1])
        .when("v_c", &[2])
        .when("v_d", &[0]);
    let prompts = PromptBuilder::new(60_000);
    let crew = crew(&model, &prompts, &tests, &AcceptAllSyntax);
    let mut solution = Solution::from_seed(Strategy {
        context: "c".to_string(),
        propose_solution: "p".to_string(),
    });
    let mut repair = RepairLoop::fresh(4);
    let mut usage = TokenUsage::default();

    let mut previous = solution.success_rate;
    while !repair.is_done() {
        repair
            .advance(&crew, &spec("m"), &suite(4), &mut solution, &mut usage)
            .expect("advance");
        assert!(solution.success_rate >= previous);
        previous = solution.success_rate;
    }
    assert_eq!(solution.success_rate, 0.75);
    assert_eq!(solution.best_code, "v_a");
    assert_eq!(repair.generations_used(), 4);
    assert_eq!(
        repair.last_result().expect("result").raw_code,
        "v_d".to_string()
    );
}

#[test]
fn hostile_model_output_still_terminates() {
    for budget in 0..4u32 {
        let model = RoutedModel::new()
            .route(marker::SOLUTION_PLANNING, &["loop forever ```"])
            .route(marker::extract("solution_set"), &["{not json"])
            .route(marker::DEVELOPER, &["while True: pass ```python\nwhile True"])
            .route(marker::CRITIQUE, &["keep going"])
            .route(marker::extract("strategy"), &["nope"])
            .route(marker::RESOLUTION, &["again"]);
        let tests = ScriptedTests::new();
        let checker = RejectSyntax::new("while True");
        let cfg = SolverConfig {
            generation_retry: 2,
            ..flat_config(budget)
        };
        let orchestrator =
            Orchestrator::new(cfg, deps(&model, &tests, &checker)).expect("new");

        let outcome = orchestrator
            .solve_with_suite(spec("spin"), suite(2))
            .expect("solve");
        assert_eq!(root(&outcome).best_solution_rating, 0.0);
        // Planning (2) + resolution (1) + per round at most 2 developer calls.
        let bound = 3 + 2 * budget as usize;
        assert!(
            model.total_calls() <= bound,
            "budget {budget}: {} calls > {bound}",
            model.total_calls()
        );
        assert!(tests.runs().is_empty());
    }
}

#[test]
fn executor_outage_scores_zero_instead_of_failing() {
    let model = RoutedModel::new()
        .route(marker::SOLUTION_PLANNING, &[one_strategy()])
        .route(marker::DEVELOPER, &[fenced("print(1)")])
        .route(marker::CRITIQUE, &[CRITIQUE])
        .route(marker::RESOLUTION, &["none"]);
    let orchestrator =
        Orchestrator::new(flat_config(2), deps(&model, &BrokenTests, &AcceptAllSyntax))
            .expect("new");

    let outcome = orchestrator
        .solve_with_suite(spec("one"), suite(2))
        .expect("solve");
    let task = root(&outcome);
    assert_eq!(task.best_solution_rating, 0.0);
    assert_eq!(task.code, "print(1)");
}

#[test]
fn judge_level_two_reviews_plan_and_code() {
    let model = RoutedModel::new()
        .route(marker::SOLUTION_PLANNING, &[one_strategy()])
        .route(
            marker::REVIEW_PLAN,
            &["<is_correct>false</is_correct><feedback>plan ignores empty input</feedback>"],
        )
        .route(
            marker::REVIEW_CODE,
            &["<is_correct>true</is_correct><feedback>looks right</feedback>"],
        )
        .route(marker::DEVELOPER, &[fenced("print(input())")])
        .route(marker::RESOLUTION, &["reviewed"]);
    let tests = ScriptedTests::new().when("print(input())", &[1]);
    let cfg = SolverConfig {
        judge_level: 2,
        ..flat_config(2)
    };
    let orchestrator = Orchestrator::new(cfg, deps(&model, &tests, &AcceptAllSyntax)).expect("new");

    let outcome = orchestrator
        .solve_with_suite(spec("echo"), suite(1))
        .expect("solve");
    assert_eq!(root(&outcome).best_solution_rating, 1.0);
    assert_eq!(model.calls(marker::REVIEW_PLAN), 1);
    assert_eq!(model.calls(marker::REVIEW_CODE), 1);

    // The plan review reaches the developer as judge feedback.
    let developer_request = model
        .requests()
        .into_iter()
        .find(|request| request.messages[0].content.contains(marker::DEVELOPER))
        .expect("developer request");
    assert!(
        developer_request
            .messages
            .iter()
            .any(|message| message.content.contains("plan ignores empty input"))
    );
}

#[test]
fn qa_agent_writes_the_suite_when_none_is_given() {
    let model = RoutedModel::new()
        .route(marker::QA, &["two echo cases"])
        .route(marker::extract("test_suite"), &[solver::test_support::suite_json(2)])
        .route(marker::SOLUTION_PLANNING, &[one_strategy()])
        .route(marker::DEVELOPER, &[fenced("print(input())")])
        .route(marker::RESOLUTION, &["qa"]);
    let tests = ScriptedTests::new().when("print(input())", &[2]);
    let orchestrator =
        Orchestrator::new(flat_config(1), deps(&model, &tests, &AcceptAllSyntax)).expect("new");

    let outcome = orchestrator.solve(spec("echo")).expect("solve");
    let task = root(&outcome);
    assert_eq!(task.test_suite.len(), 2);
    assert_eq!(task.best_solution_rating, 1.0);
    assert_eq!(outcome.usage.calls as usize, model.total_calls());
}

#[test]
fn direct_solve_skips_planning() {
    let model = RoutedModel::new()
        .route(marker::DEVELOPER, &[fenced("print(input())")])
        .route(marker::RESOLUTION, &["direct"]);
    let tests = ScriptedTests::new().when("print(input())", &[2]);
    let orchestrator =
        Orchestrator::new(config(), deps(&model, &tests, &AcceptAllSyntax)).expect("new");

    let outcome = orchestrator
        .solve_direct(spec("echo"), suite(2))
        .expect("solve");
    assert_eq!(root(&outcome).best_solution_rating, 1.0);
    assert_eq!(model.calls(marker::SOLUTION_PLANNING), 0);
    assert_eq!(model.calls(marker::PLANNER), 0);
}

#[test]
fn solved_tasks_are_remembered_for_later_solves() {
    let index = KeywordIndex::new(10);
    let model = RoutedModel::new()
        .route(marker::SOLUTION_PLANNING, &[one_strategy()])
        .route(marker::DEVELOPER, &[fenced("print(input())")])
        .route(marker::RESOLUTION, &["echo by reading stdin"]);
    let tests = ScriptedTests::new().when("print(input())", &[1]);
    let cfg = SolverConfig {
        use_similarity: true,
        ..flat_config(1)
    };
    let orchestrator = Orchestrator::new(
        cfg,
        Collaborators {
            index: Some(&index),
            ..deps(&model, &tests, &AcceptAllSyntax)
        },
    )
    .expect("new");

    orchestrator
        .solve_with_suite(spec("echo"), suite(1))
        .expect("first solve");
    assert_eq!(index.len(), 1);
    orchestrator
        .solve_with_suite(spec("echo"), suite(1))
        .expect("second solve");

    let planning = model
        .requests()
        .into_iter()
        .rev()
        .find(|request| request.messages[0].content.contains(marker::SOLUTION_PLANNING))
        .expect("planning request");
    assert!(planning.messages[1].content.contains("echo by reading stdin"));
}

#[test]
fn similarity_without_index_is_a_config_error() {
    let model = RoutedModel::new();
    let tests = ScriptedTests::new();
    let cfg = SolverConfig {
        use_similarity: true,
        ..config()
    };
    assert!(Orchestrator::new(cfg, deps(&model, &tests, &AcceptAllSyntax)).is_err());

    let cfg = SolverConfig {
        generation_retry: 0,
        ..config()
    };
    assert!(Orchestrator::new(cfg, deps(&model, &tests, &AcceptAllSyntax)).is_err());
}

#[test]
fn repair_loop_from_program_starts_by_testing() {
    assert_eq!(RepairLoop::from_program(0).state(), RepairState::Testing);
}
