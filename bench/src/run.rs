//! Running one grid cell over the sampled problems.
//!
//! Each problem is solved by a fresh orchestrator, then its root program is
//! re-scored against the problem's private tests. Progress is checkpointed
//! after every problem so an interrupted cell resumes where it stopped.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use solver::io::config::SolverConfig;
use solver::io::inference::LanguageModel;
use solver::io::similarity::{KeywordIndex, SimilarityIndex};
use solver::io::syntax::SyntaxChecker;
use solver::io::test_runner::TestExecutor;
use solver::orchestrator::{Collaborators, Orchestrator, SolveOutcome};

use crate::checkpoint::{Checkpoint, clear_checkpoint, load_checkpoint, save_checkpoint};
use crate::config::PathsConfig;
use crate::dataset::Problem;
use crate::grid::{Architecture, Cell};
use crate::results::{BenchResult, ProblemResult, summarize, write_result};

/// Services shared by every problem in a cell.
#[derive(Clone, Copy)]
pub struct Backend<'a> {
    pub model: &'a dyn LanguageModel,
    pub executor: &'a dyn TestExecutor,
    pub checker: &'a dyn SyntaxChecker,
}

#[derive(Debug)]
pub struct CellOutcome {
    pub result: BenchResult,
    pub result_path: PathBuf,
    /// Problems taken from a checkpoint instead of being solved again.
    pub resumed: usize,
}

#[instrument(skip_all, fields(model = %cell.model, architecture = %cell.architecture))]
pub fn run_cell(
    cell: &Cell,
    problems: &[Problem],
    solver_cfg: &SolverConfig,
    paths: &PathsConfig,
    backend: Backend<'_>,
    resume: bool,
) -> Result<CellOutcome> {
    let mut checkpoint = if resume {
        load_checkpoint(&paths.checkpoints, cell).unwrap_or_else(|| Checkpoint::new(cell))
    } else {
        Checkpoint::new(cell)
    };
    let resumed = checkpoint.results.len();
    if resumed > 0 {
        info!(resumed, "resuming from checkpoint");
    }

    // One index per cell so solved problems can inform later ones.
    let index = KeywordIndex::new(solver_cfg.similarity.capacity);
    for (n, problem) in problems.iter().enumerate() {
        if checkpoint.contains(&problem.id) {
            continue;
        }
        info!(
            problem = %problem.id,
            difficulty = %problem.difficulty,
            progress = %format!("{}/{}", n + 1, problems.len()),
            "solving"
        );
        let result = solve_problem(cell.architecture, problem, solver_cfg, backend, &index);
        info!(
            problem = %problem.id,
            passed = result.passed_tests,
            total = result.total_tests,
            secs = result.total_time_secs,
            "solved"
        );
        checkpoint.results.push(result);
        save_checkpoint(&paths.checkpoints, cell, &mut checkpoint)
            .with_context(|| format!("checkpoint {cell}"))?;
    }

    let result = summarize(cell, checkpoint.results);
    let result_path = cell.result_path(&paths.results);
    write_result(&result_path, &result).with_context(|| format!("write results for {cell}"))?;
    clear_checkpoint(&paths.checkpoints, cell)?;
    info!(score = result.score, path = %result_path.display(), "cell finished");
    Ok(CellOutcome {
        result,
        result_path,
        resumed,
    })
}

/// Solve one problem and score the root program against its private tests.
///
/// Failures never abort the cell: they are recorded on the result, which then
/// scores zero.
pub fn solve_problem(
    architecture: Architecture,
    problem: &Problem,
    solver_cfg: &SolverConfig,
    backend: Backend<'_>,
    index: &KeywordIndex,
) -> ProblemResult {
    let suite = problem.suite();
    let started = Instant::now();
    let solved = solve(architecture, problem, solver_cfg, backend, index);
    let mut result = ProblemResult {
        problem_id: problem.id.clone(),
        difficulty: problem.difficulty,
        total_time_secs: 0.0,
        passed_tests: 0,
        total_tests: suite.len(),
        success_rate: 0.0,
        input_tokens: 0,
        output_tokens: 0,
        error: None,
        code: String::new(),
    };

    let outcome = match solved {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(problem = %problem.id, error = %format!("{err:#}"), "solve failed");
            result.total_time_secs = started.elapsed().as_secs_f64();
            result.error = Some(format!("{err:#}"));
            return result;
        }
    };
    result.input_tokens = outcome.usage.input_tokens;
    result.output_tokens = outcome.usage.output_tokens;
    result.code = outcome
        .root_task()
        .map(|task| task.code.clone())
        .unwrap_or_default();

    match backend.executor.run(&result.code, &suite) {
        Ok(scored) => {
            result.passed_tests = scored.passed;
            result.total_tests = scored.total;
            result.success_rate = scored.success_rate;
        }
        Err(err) => {
            warn!(problem = %problem.id, error = %format!("{err:#}"), "scoring failed");
            result.error = Some(format!("scoring: {err:#}"));
        }
    }
    result.total_time_secs = started.elapsed().as_secs_f64();
    result
}

fn solve(
    architecture: Architecture,
    problem: &Problem,
    solver_cfg: &SolverConfig,
    backend: Backend<'_>,
    index: &KeywordIndex,
) -> Result<SolveOutcome> {
    let deps = Collaborators {
        model: backend.model,
        executor: backend.executor,
        checker: backend.checker,
        tests: None,
        index: solver_cfg
            .use_similarity
            .then_some(index as &dyn SimilarityIndex),
    };
    let orchestrator = Orchestrator::new(solver_cfg.clone(), deps)?;
    match architecture {
        Architecture::Simple => orchestrator.solve_direct(problem.spec(), problem.suite()),
        Architecture::MultiAgent => orchestrator.solve_with_suite(problem.spec(), problem.suite()),
    }
}
