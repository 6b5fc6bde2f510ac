//! Judge agent: failure critiques and optional plan/code reviews.

use anyhow::Result;
use minijinja::context;
use tracing::{debug, instrument};

use crate::agents::AgentContext;
use crate::core::decision::{tagged_revision, tagged_verdict};
use crate::core::types::{Solution, Strategy, TaskSpec, TestSuite, TestsResult, Verdict};
use crate::io::inference::{Message, TokenUsage};
use crate::io::prompt::Template;

/// A critique as written, and the revision read out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Critique {
    pub raw: String,
    pub revision: Strategy,
}

pub struct Judge<'a> {
    ctx: AgentContext<'a>,
}

impl<'a> Judge<'a> {
    pub fn new(ctx: AgentContext<'a>) -> Self {
        Self { ctx }
    }

    /// Diagnose a failing run and propose a revised plan.
    ///
    /// Unparseable critiques become both the new context and the new plan.
    #[instrument(skip_all, fields(passed = result.passed, total = result.total))]
    pub fn critique(
        &self,
        solution: &Solution,
        suite: &TestSuite,
        result: &TestsResult,
        usage: &mut TokenUsage,
    ) -> Result<Critique> {
        let system = self.ctx.prompts.render(Template::Critique, context! {})?;
        let brief = self.ctx.prompts.render(
            Template::CritiqueBrief,
            context! {
                plan => solution.propose_solution.as_str(),
                code => result.raw_code.as_str(),
                passed => result.passed,
                total => result.total,
                report => result.report(),
                context => solution.context.as_str(),
                tests => suite.summary(),
            },
        )?;
        let raw = self
            .ctx
            .inference
            .text(&[Message::system(system), Message::user(brief)], usage)?;
        let resolved = self.ctx.resolve_with(tagged_revision(&raw), &raw, usage, || Strategy {
            context: raw.clone(),
            propose_solution: raw.clone(),
        })?;
        debug!(tier = ?resolved.tier, "critique parsed");
        Ok(Critique {
            revision: resolved.into_value(),
            raw,
        })
    }

    /// Does `code` implement the plan? Runs before the program is tested.
    pub fn review_code(
        &self,
        spec: &TaskSpec,
        solution: &Solution,
        code: &str,
        usage: &mut TokenUsage,
    ) -> Result<Verdict> {
        let brief = self.ctx.prompts.render(
            Template::ReviewBrief,
            context! {
                spec => spec,
                signature => spec.signature(),
                plan => solution.propose_solution.as_str(),
                code => code,
            },
        )?;
        self.review("code", brief, usage)
    }

    /// Does the plan solve the task? Runs before any code is written.
    pub fn review_plan(
        &self,
        spec: &TaskSpec,
        solution: &Solution,
        usage: &mut TokenUsage,
    ) -> Result<Verdict> {
        let brief = self.ctx.prompts.render(
            Template::SolutionBrief,
            context! {
                spec => spec,
                signature => spec.signature(),
                plan => solution.propose_solution.as_str(),
                context => solution.context.as_str(),
            },
        )?;
        self.review("plan", brief, usage)
    }

    #[instrument(skip_all, fields(subject = subject))]
    fn review(&self, subject: &str, brief: String, usage: &mut TokenUsage) -> Result<Verdict> {
        let system = self
            .ctx
            .prompts
            .render(Template::Review, context! { subject => subject })?;
        let raw = self
            .ctx
            .inference
            .text(&[Message::system(system), Message::user(brief)], usage)?;
        let resolved = self.ctx.resolve_with(tagged_verdict(&raw), &raw, usage, || Verdict {
            is_correct: false,
            feedback: "Unable to parse judgment feedback".to_string(),
        })?;
        debug!(tier = ?resolved.tier, is_correct = resolved.value.is_correct, "review parsed");
        Ok(resolved.into_value())
    }
}
