//! Developer agent: writes programs from a plan and joins subtask programs.

use anyhow::Result;
use minijinja::context;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::agents::AgentContext;
use crate::core::code::{Extracted, extract_code};
use crate::core::types::{
    HistoryRole, IMPLEMENTATION_PLACEHOLDER, Solution, TaskSpec, TestSuite,
};
use crate::io::inference::{Message, TokenUsage};
use crate::io::prompt::Template;
use crate::io::syntax::SyntaxChecker;

/// The developer used up its generation retries without a valid program.
#[derive(Debug, Error)]
#[error("no valid program after {attempts} attempts: {last_problem}")]
pub struct GenerationError {
    pub attempts: u32,
    pub last_problem: String,
}

/// A solved subtask handed to [`Developer::join`].
#[derive(Debug, Clone, Serialize)]
pub struct JoinPart {
    pub function_name: String,
    pub rating: f64,
    pub code: String,
}

pub struct Developer<'a> {
    ctx: AgentContext<'a>,
    checker: &'a dyn SyntaxChecker,
    generation_retry: u32,
}

impl<'a> Developer<'a> {
    pub fn new(ctx: AgentContext<'a>, checker: &'a dyn SyntaxChecker, generation_retry: u32) -> Self {
        Self {
            ctx,
            checker,
            generation_retry: generation_retry.max(1),
        }
    }

    /// Write a program for the solution's current plan, replaying its history.
    #[instrument(skip_all, fields(function = %spec.function_name))]
    pub fn generate(
        &self,
        spec: &TaskSpec,
        suite: &TestSuite,
        solution: &Solution,
        usage: &mut TokenUsage,
    ) -> Result<String> {
        let system = self.ctx.prompts.render(
            Template::Developer,
            context! { standalone => is_standalone(suite) },
        )?;
        let mut messages = vec![Message::system(system)];
        messages.extend(solution.history.iter().map(|entry| match entry.role {
            HistoryRole::Developer => Message::assistant(entry.content.as_str()),
            HistoryRole::Judge => Message::user(entry.content.as_str()),
        }));
        let brief = self.ctx.prompts.render(
            Template::SolutionBrief,
            context! {
                spec => spec,
                signature => spec.signature(),
                plan => solution.propose_solution.as_str(),
                context => solution.context.as_str(),
            },
        )?;
        messages.push(Message::user(brief));
        self.generate_checked(messages, usage)
    }

    /// Merge subtask programs into the parent's skeleton.
    #[instrument(skip_all, fields(function = %spec.function_name, parts = parts.len()))]
    pub fn join(
        &self,
        spec: &TaskSpec,
        skeleton: &str,
        parts: &[JoinPart],
        usage: &mut TokenUsage,
    ) -> Result<String> {
        let system = self.ctx.prompts.render(Template::Join, context! {})?;
        let brief = self.ctx.prompts.render(
            Template::JoinBrief,
            context! {
                spec => spec,
                signature => spec.signature(),
                skeleton => skeleton,
                subtasks => parts,
            },
        )?;
        self.generate_checked(vec![Message::system(system), Message::user(brief)], usage)
    }

    /// Ask until a reply yields one program that passes the syntax check.
    fn generate_checked(&self, mut messages: Vec<Message>, usage: &mut TokenUsage) -> Result<String> {
        let mut last_problem = String::new();
        for attempt in 1..=self.generation_retry {
            let reply = self.ctx.inference.text(&messages, usage)?;
            let problems = match extract_code(&reply) {
                Extracted::Code(code) => match self.checker.check(&code) {
                    Ok(problems) if problems.is_empty() => return Ok(code),
                    Ok(problems) => problems,
                    Err(err) => {
                        warn!(err = %format!("{err:#}"), "syntax check unavailable, keeping program");
                        return Ok(code);
                    }
                },
                other => other.problem().into_iter().collect(),
            };
            last_problem = problems.join("\n");
            debug!(attempt, problem = %last_problem, "program rejected");
            messages.push(Message::assistant(reply));
            messages.push(Message::user(format!(
                "The program was rejected:\n{last_problem}\n\nFix it and return the whole program again."
            )));
        }
        Err(GenerationError {
            attempts: self.generation_retry,
            last_problem,
        }
        .into())
    }
}

fn is_standalone(suite: &TestSuite) -> bool {
    suite.harness.trim() == IMPLEMENTATION_PLACEHOLDER
}
