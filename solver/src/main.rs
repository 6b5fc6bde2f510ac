//! Multi-agent program synthesis CLI.
//!
//! `solver solve --task task.toml` plans, writes, tests and repairs a program
//! for the task, then prints the best program found.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use solver::exit_codes;
use solver::io::config::{SolverConfig, load_config, write_config};
use solver::io::inference::OllamaClient;
use solver::io::report::{SolveReport, write_report};
use solver::io::similarity::{KeywordIndex, SimilarityIndex};
use solver::io::syntax::PythonSyntaxChecker;
use solver::io::task_file::TaskFile;
use solver::io::test_runner::PythonTestRunner;
use solver::orchestrator::{Collaborators, Orchestrator};

const DEFAULT_CONFIG: &str = "solver.toml";

#[derive(Parser)]
#[command(
    name = "solver",
    version,
    about = "Multi-agent program synthesis with test-driven repair"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Check the config and, optionally, a task file.
    Validate {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        #[arg(long)]
        task: Option<PathBuf>,
    },
    /// Solve a task file and print the best program.
    Solve {
        #[arg(long)]
        task: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Write a JSON report of every task to this path.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Skip planning and repair a single direct strategy.
        #[arg(long)]
        direct: bool,
    },
}

fn main() {
    solver::logging::init("warn");
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { config, force } => cmd_init(&config, force),
        Command::Validate { config, task } => cmd_validate(&config, task.as_deref()),
        Command::Solve {
            task,
            config,
            out,
            direct,
        } => cmd_solve(&task, &config, out.as_deref(), direct),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("init: {} exists, keeping it", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &SolverConfig::default())?;
    println!("init: wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(config: &Path, task: Option<&Path>) -> Result<i32> {
    load_config(config).with_context(|| format!("validate {}", config.display()))?;
    if let Some(task) = task {
        TaskFile::load(task)?;
    }
    println!("validate: ok");
    Ok(exit_codes::OK)
}

fn cmd_solve(task_path: &Path, config_path: &Path, out: Option<&Path>, direct: bool) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let task = TaskFile::load(task_path)?;

    let model = OllamaClient::new(&cfg.inference)?;
    let executor = PythonTestRunner::new(&cfg.executor);
    let checker = PythonSyntaxChecker::new(&cfg.executor);
    let index = KeywordIndex::new(cfg.similarity.capacity);
    let deps = Collaborators {
        model: &model,
        executor: &executor,
        checker: &checker,
        tests: None,
        index: cfg
            .use_similarity
            .then_some(&index as &dyn SimilarityIndex),
    };
    let orchestrator = Orchestrator::new(cfg, deps)?;

    let suite = task.suite();
    let outcome = match (direct, suite) {
        (true, Some(suite)) => orchestrator.solve_direct(task.spec, suite)?,
        (true, None) => bail!("--direct needs test_cases in the task file"),
        (false, Some(suite)) => orchestrator.solve_with_suite(task.spec, suite)?,
        (false, None) => orchestrator.solve(task.spec)?,
    };

    let report = SolveReport::from_outcome(&outcome);
    if let Some(out) = out {
        write_report(out, &report)?;
        info!(path = %out.display(), "report written");
    }
    let root = report.root().context("solve produced no root task")?;
    println!("{}", root.code);
    eprintln!(
        "solve: rating={:.2} tasks={} calls={} tokens={}",
        root.rating,
        report.tasks.len(),
        report.usage.calls,
        report.usage.total_tokens()
    );
    if root.rating >= 1.0 {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::PARTIAL)
    }
}
