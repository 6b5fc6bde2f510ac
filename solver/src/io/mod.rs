//! Side-effecting collaborators: model calls, program execution, config and reports.

pub mod config;
pub mod inference;
pub mod process;
pub mod prompt;
pub mod report;
pub mod similarity;
pub mod syntax;
pub mod task_file;
pub mod test_runner;
