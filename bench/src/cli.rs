//! CLI command implementations.

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use solver::io::inference::OllamaClient;
use solver::io::syntax::PythonSyntaxChecker;
use solver::io::test_runner::PythonTestRunner;

use crate::checkpoint::load_checkpoint;
use crate::config::BenchConfig;
use crate::dataset::{load_dataset, sample};
use crate::grid::{Architecture, Cell, build_grid};
use crate::report::{aggregate, render_table};
use crate::run::{Backend, run_cell};

/// Print every grid cell with its state on disk.
pub fn list_grid(cfg: &BenchConfig) -> Result<()> {
    for cell in build_grid(&cfg.models, &cfg.architectures) {
        let state = if cell.result_path(&cfg.paths.results).exists() {
            "done".to_string()
        } else if let Some(checkpoint) = load_checkpoint(&cfg.paths.checkpoints, &cell) {
            format!("partial({})", checkpoint.results.len())
        } else {
            "pending".to_string()
        };
        println!(
            "cell: model={} arch={} state={}",
            cell.model, cell.architecture, state
        );
    }
    Ok(())
}

/// Run every selected cell of the grid.
pub fn run_grid(
    cfg: &BenchConfig,
    model: Option<&str>,
    architecture: Option<Architecture>,
    resume: bool,
) -> Result<()> {
    let cells: Vec<Cell> = build_grid(&cfg.models, &cfg.architectures)
        .into_iter()
        .filter(|cell| model.is_none_or(|m| cell.model == m))
        .filter(|cell| architecture.is_none_or(|a| cell.architecture == a))
        .collect();
    if cells.is_empty() {
        bail!("no grid cell matches the selection");
    }

    let problems = sample(
        load_dataset(&cfg.dataset.path).context("load dataset")?,
        &cfg.dataset,
    );
    if problems.is_empty() {
        bail!("dataset {} has no problems to run", cfg.dataset.path.display());
    }
    debug!(cells = cells.len(), problems = problems.len(), "grid selected");

    info!(cells = cells.len(), problems = problems.len(), "starting grid");
    for cell in cells {
        let solver_cfg = cfg.solver_for(&cell.model);
        let model = OllamaClient::new(&solver_cfg.inference)
            .with_context(|| format!("client for {}", cell.model))?;
        let executor = PythonTestRunner::new(&solver_cfg.executor);
        let checker = PythonSyntaxChecker::new(&solver_cfg.executor);
        let backend = Backend {
            model: &model,
            executor: &executor,
            checker: &checker,
        };
        let outcome = run_cell(&cell, &problems, &solver_cfg, &cfg.paths, backend, resume)
            .with_context(|| format!("run {cell}"))?;
        println!(
            "run: model={} arch={} score={:.2} problems={} resumed={} results={}",
            cell.model,
            cell.architecture,
            outcome.result.score,
            outcome.result.total_problems,
            outcome.resumed,
            outcome.result_path.display()
        );
    }
    Ok(())
}

/// Show the comparison table over all result files.
pub fn report(cfg: &BenchConfig) -> Result<()> {
    let (rows, warnings) = aggregate(&cfg.paths.results)?;
    println!("report: cells={}", rows.len());
    print!("{}", render_table(&rows));
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}
