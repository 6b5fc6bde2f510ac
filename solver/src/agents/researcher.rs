//! Researcher agent: decides how to attack a task and writes its resolution template.

use anyhow::Result;
use minijinja::context;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::agents::AgentContext;
use crate::core::decision::{final_decision, mentioned_decision};
use crate::core::fallback::best_effort;
use crate::core::types::{
    Plan, PlanKind, PlanResponse, SolutionSet, Strategy, SubtaskPlan, Task, TaskSpec, TestSuite,
};
use crate::io::inference::{Message, TokenUsage};
use crate::io::prompt::Template;
use crate::io::similarity::SimilarityIndex;

const NO_SIMILAR_TASKS: &str = "No similar tasks found.";
const MAX_SOLUTIONS: usize = 4;

pub struct Researcher<'a> {
    ctx: AgentContext<'a>,
    index: Option<&'a dyn SimilarityIndex>,
    top_k: usize,
}

impl<'a> Researcher<'a> {
    pub fn new(ctx: AgentContext<'a>, index: Option<&'a dyn SimilarityIndex>, top_k: usize) -> Self {
        Self { ctx, index, top_k }
    }

    /// Choose between decomposition and direct solutions.
    ///
    /// At the final depth the decision step is skipped and only solutions are planned.
    #[instrument(skip_all, fields(function = %spec.function_name, is_final_depth = is_final_depth))]
    pub fn decide(
        &self,
        spec: &TaskSpec,
        suite: &TestSuite,
        is_final_depth: bool,
        use_similarity: bool,
        usage: &mut TokenUsage,
    ) -> Result<PlanResponse> {
        let similar = if use_similarity {
            self.similar_tasks(spec)
        } else {
            NO_SIMILAR_TASKS.to_string()
        };
        let brief = self.ctx.prompts.render(
            Template::TaskBrief,
            context! {
                spec => spec,
                signature => spec.signature(),
                tests => suite.summary(),
                similar => similar,
            },
        )?;

        let mut reasoning = String::new();
        if !is_final_depth {
            let (kind, decision_reasoning) = self.decide_kind(&brief, usage)?;
            reasoning = decision_reasoning;
            if kind == PlanKind::Subtasks {
                let plan = self.plan_subtasks(&brief, usage)?;
                if plan.subtasks.len() >= 2 {
                    info!(subtasks = plan.subtasks.len(), "decomposing");
                    return Ok(PlanResponse {
                        reasoning,
                        plan: Plan::Subtasks(plan),
                    });
                }
                debug!(
                    subtasks = plan.subtasks.len(),
                    "too few subtasks, solving directly"
                );
            }
        }

        let (seeds, solution_reasoning) = self.plan_solutions(spec, &brief, usage)?;
        if reasoning.is_empty() {
            reasoning = solution_reasoning;
        }
        info!(solutions = seeds.len(), "solving directly");
        Ok(PlanResponse {
            reasoning,
            plan: Plan::Solutions(seeds),
        })
    }

    /// Summarise the solved task for reuse. Falls back to the best plan text.
    #[instrument(skip_all, fields(function = %task.spec.function_name))]
    pub fn summarize_resolution(&self, task: &Task, usage: &mut TokenUsage) -> String {
        let payload = json!({
            "definition": task.spec.definition,
            "dod": task.spec.definition_of_done,
            "best_solution": task.best_solution,
            "best_solution_rating": task.best_solution_rating,
            "function_name": task.spec.function_name,
            "code_snippet": task.code,
        });
        let attempt = self
            .ctx
            .prompts
            .render(Template::Resolution, context! {})
            .and_then(|system| {
                self.ctx
                    .inference
                    .text(&[Message::system(system), Message::user(payload.to_string())], usage)
            });
        match attempt {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => task.best_solution.clone(),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "resolution template unavailable");
                task.best_solution.clone()
            }
        }
    }

    /// Offer a solved task to the similarity index.
    pub fn remember(&self, task: &Task) {
        if let Some(index) = self.index {
            index.add(task);
        }
    }

    fn similar_tasks(&self, spec: &TaskSpec) -> String {
        let Some(index) = self.index else {
            return NO_SIMILAR_TASKS.to_string();
        };
        let hits = index.search(spec, self.top_k);
        if hits.is_empty() {
            return NO_SIMILAR_TASKS.to_string();
        }
        hits.iter()
            .enumerate()
            .map(|(idx, hit)| {
                format!(
                    "{}. {} (rated {:.2})\n{}",
                    idx + 1,
                    hit.definition.trim(),
                    hit.rating,
                    hit.template.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Reasoning pass, then the last "final decision" marker, then an extraction pass.
    fn decide_kind(&self, brief: &str, usage: &mut TokenUsage) -> Result<(PlanKind, String)> {
        let system = self.ctx.prompts.render(Template::PlanDecision, context! {})?;
        let reasoning = self
            .ctx
            .inference
            .text(&[Message::system(system), Message::user(brief)], usage)?;
        let resolved = best_effort(
            final_decision(&reasoning),
            || {
                let system = self
                    .ctx
                    .prompts
                    .render(Template::DecisionExtract, context! {})?;
                let reply = self.ctx.inference.text(
                    &[Message::system(system), Message::user(reasoning.as_str())],
                    usage,
                )?;
                Ok(mentioned_decision(&reply))
            },
            || PlanKind::Solutions,
        )?;
        debug!(decision = ?resolved.value, tier = ?resolved.tier, "plan decision");
        Ok((resolved.value, reasoning))
    }

    fn plan_subtasks(&self, brief: &str, usage: &mut TokenUsage) -> Result<SubtaskPlan> {
        let system = self.ctx.prompts.render(Template::SubtaskPlan, context! {})?;
        let reasoning = self
            .ctx
            .inference
            .text(&[Message::system(system), Message::user(brief)], usage)?;
        let resolved = self.ctx.resolve(&reasoning, usage, || SubtaskPlan {
            skeleton: String::new(),
            subtasks: Vec::new(),
        })?;
        Ok(resolved.into_value())
    }

    fn plan_solutions(
        &self,
        spec: &TaskSpec,
        brief: &str,
        usage: &mut TokenUsage,
    ) -> Result<(Vec<Strategy>, String)> {
        let system = self.ctx.prompts.render(Template::SolutionPlan, context! {})?;
        let reasoning = self
            .ctx
            .inference
            .text(&[Message::system(system), Message::user(brief)], usage)?;
        let mut seeds = self
            .ctx
            .resolve(&reasoning, usage, || SolutionSet {
                solutions: vec![direct_seed(spec)],
            })?
            .into_value()
            .solutions;
        if seeds.is_empty() {
            seeds.push(direct_seed(spec));
        }
        seeds.truncate(MAX_SOLUTIONS);
        Ok((seeds, reasoning))
    }
}

/// Seed built from the task itself when no strategy could be read.
pub fn direct_seed(spec: &TaskSpec) -> Strategy {
    Strategy {
        context: spec.definition.clone(),
        propose_solution: format!(
            "Implement `{}` directly so that: {}",
            spec.signature(),
            spec.definition_of_done
        ),
    }
}
