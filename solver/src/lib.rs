//! Multi-agent program synthesis harness.
//!
//! A task (natural-language definition plus a test suite) is either solved
//! directly by racing candidate strategies through a generate/test/critique
//! repair loop, or split into subtasks that are solved recursively and merged.
//!
//! - **[`core`]**: Pure logic (data model, repair state machine, task arena,
//!   reply parsing). No I/O.
//! - **[`io`]**: Side effects behind traits (language model, test execution,
//!   syntax checks, similarity memory) plus config and reports.
//! - **[`agents`]**: The LLM roles, built on an [`io::inference::InferenceAdapter`].
//!
//! [`orchestrator`] drives a solve; [`search`], [`compose`] and [`repair`]
//! implement its two strategies and their shared repair loop.

pub mod agents;
pub mod compose;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod repair;
pub mod search;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
