//! QA agent: builds the test suite a task is scored against.

use anyhow::Result;
use minijinja::context;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::agents::AgentContext;
use crate::core::types::{IMPLEMENTATION_PLACEHOLDER, TaskSpec, TestCase, TestSuite};
use crate::io::inference::{Message, Structured, TokenUsage};
use crate::io::prompt::Template;

/// Source of the test suite for a task.
pub trait TestSuiteSource {
    fn build_test_suite(&self, spec: &TaskSpec, usage: &mut TokenUsage) -> Result<TestSuite>;
}

/// A fixed suite, e.g. the private tests of a dataset problem.
#[derive(Debug, Clone)]
pub struct ProvidedSuite(pub TestSuite);

impl TestSuiteSource for ProvidedSuite {
    fn build_test_suite(&self, _spec: &TaskSpec, _usage: &mut TokenUsage) -> Result<TestSuite> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SuiteDraft {
    pub test_cases: Vec<TestCase>,
    pub harness: String,
}

impl Structured for SuiteDraft {
    const NAME: &'static str = "test_suite";
    const SCHEMA: &'static str = include_str!("../../schemas/test_suite.schema.json");
}

/// Writes cases and a harness with the model.
pub struct QaAgent<'a> {
    ctx: AgentContext<'a>,
}

impl<'a> QaAgent<'a> {
    pub fn new(ctx: AgentContext<'a>) -> Self {
        Self { ctx }
    }
}

impl TestSuiteSource for QaAgent<'_> {
    #[instrument(skip_all, fields(function = %spec.function_name))]
    fn build_test_suite(&self, spec: &TaskSpec, usage: &mut TokenUsage) -> Result<TestSuite> {
        let system = self.ctx.prompts.render(
            Template::Qa,
            context! { placeholder => IMPLEMENTATION_PLACEHOLDER },
        )?;
        let brief = self.ctx.prompts.render(
            Template::TaskBrief,
            context! { spec => spec, signature => spec.signature() },
        )?;
        let reasoning = self
            .ctx
            .inference
            .text(&[Message::system(system), Message::user(brief)], usage)?;
        let draft = self
            .ctx
            .resolve(&reasoning, usage, || SuiteDraft {
                test_cases: Vec::new(),
                harness: IMPLEMENTATION_PLACEHOLDER.to_string(),
            })?
            .into_value();

        if draft.test_cases.is_empty() {
            warn!("QA produced no test cases; the task cannot reach a passing score");
        }
        if !draft.harness.contains(IMPLEMENTATION_PLACEHOLDER) {
            warn!("harness has no implementation placeholder, running programs bare");
        }
        info!(cases = draft.test_cases.len(), "test suite built");
        Ok(TestSuite::new(draft.test_cases, draft.harness))
    }
}
