mod checkpoint;
mod cli;
mod config;
mod dataset;
mod grid;
mod report;
mod results;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::load_bench_config;
use crate::grid::Architecture;

#[derive(Parser)]
#[command(name = "bench", version, about = "Benchmark grid for the solver")]
struct Cli {
    #[arg(long, global = true, default_value = "bench.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    List,
    Run {
        /// Only run cells for this model.
        #[arg(long)]
        model: Option<String>,
        /// Only run cells for this architecture (`simple` or `multi-agent`).
        #[arg(long, value_parser = parse_architecture)]
        arch: Option<Architecture>,
        /// Ignore checkpoints and start every cell over.
        #[arg(long)]
        no_resume: bool,
    },
    Report,
}

fn parse_architecture(value: &str) -> Result<Architecture, String> {
    match value {
        "simple" => Ok(Architecture::Simple),
        "multi-agent" => Ok(Architecture::MultiAgent),
        other => Err(format!("unknown architecture {other:?}")),
    }
}

fn main() -> Result<()> {
    solver::logging::init("bench=info,solver=warn");
    let cli = Cli::parse();
    let cfg = load_bench_config(&cli.config)?;
    match cli.command {
        Command::List => cli::list_grid(&cfg),
        Command::Run {
            model,
            arch,
            no_resume,
        } => cli::run_grid(&cfg, model.as_deref(), arch, !no_resume),
        Command::Report => cli::report(&cfg),
    }
}
