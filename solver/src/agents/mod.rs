//! LLM roles: planner (researcher), developer, judge and QA.
//!
//! Agents are thin views over a shared [`AgentContext`]; they own no state
//! between calls. Every free-text answer goes through the same best-effort
//! ladder (local parse, one extraction call, fixed default).

use anyhow::{Context, Result};
use minijinja::context;
use serde_json::Value;
use tracing::warn;

use crate::core::fallback::{Resolved, best_effort};
use crate::core::types::{SolutionSet, Strategy, SubtaskPlan, Verdict};
use crate::io::inference::{InferenceAdapter, Message, Structured, TokenUsage, parse_structured};
use crate::io::prompt::{PromptBuilder, Template};

pub mod developer;
pub mod judge;
pub mod qa;
pub mod researcher;

impl Structured for SubtaskPlan {
    const NAME: &'static str = "subtask_plan";
    const SCHEMA: &'static str = include_str!("../../schemas/subtask_plan.schema.json");
}

impl Structured for SolutionSet {
    const NAME: &'static str = "solution_set";
    const SCHEMA: &'static str = include_str!("../../schemas/solution_set.schema.json");
}

impl Structured for Strategy {
    const NAME: &'static str = "strategy";
    const SCHEMA: &'static str = include_str!("../../schemas/strategy.schema.json");
}

impl Structured for Verdict {
    const NAME: &'static str = "verdict";
    const SCHEMA: &'static str = include_str!("../../schemas/verdict.schema.json");
}

/// What every agent borrows: the model and the prompt templates.
#[derive(Clone, Copy)]
pub struct AgentContext<'a> {
    pub inference: InferenceAdapter<'a>,
    pub prompts: &'a PromptBuilder,
}

impl<'a> AgentContext<'a> {
    pub fn new(inference: InferenceAdapter<'a>, prompts: &'a PromptBuilder) -> Self {
        Self { inference, prompts }
    }

    /// Ask the model to restate `source` as `T`.
    pub(crate) fn extract<T: Structured>(
        &self,
        source: &str,
        usage: &mut TokenUsage,
    ) -> Result<Option<T>> {
        let system = self.prompts.render(
            Template::Extract,
            context! { kind => T::NAME, schema => T::SCHEMA },
        )?;
        let generation = self
            .inference
            .structured::<T>(&[Message::system(system), Message::user(source)], usage)?;
        if let Some(raw) = generation.raw() {
            warn!(kind = T::NAME, bytes = raw.len(), "extraction did not match schema");
        }
        Ok(generation.into_structured())
    }

    /// `text` parsed as `T` directly, else via one extraction call, else `default`.
    pub(crate) fn resolve<T: Structured>(
        &self,
        text: &str,
        usage: &mut TokenUsage,
        default: impl FnOnce() -> T,
    ) -> Result<Resolved<T>> {
        let schema: Value = serde_json::from_str(T::SCHEMA)
            .with_context(|| format!("parse embedded {} schema", T::NAME))?;
        let primary = parse_structured::<T>(text, &schema).into_structured();
        self.resolve_with(primary, text, usage, default)
    }

    /// `primary` if a local parse already succeeded, else the extraction ladder over `text`.
    pub(crate) fn resolve_with<T: Structured>(
        &self,
        primary: Option<T>,
        text: &str,
        usage: &mut TokenUsage,
        default: impl FnOnce() -> T,
    ) -> Result<Resolved<T>> {
        best_effort(primary, || self.extract::<T>(text, usage), default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fallback::Tier;
    use crate::test_support::{RoutedModel, marker};

    #[test]
    fn embedded_schemas_are_valid_json_schema() {
        for schema in [
            SubtaskPlan::SCHEMA,
            SolutionSet::SCHEMA,
            Strategy::SCHEMA,
            Verdict::SCHEMA,
            qa::SuiteDraft::SCHEMA,
        ] {
            let value: Value = serde_json::from_str(schema).expect("json");
            jsonschema::validator_for(&value).expect("schema compiles");
        }
    }

    #[test]
    fn resolve_prefers_direct_json() {
        let model = RoutedModel::new();
        let prompts = PromptBuilder::new(10_000);
        let ctx = AgentContext::new(InferenceAdapter::new(&model), &prompts);
        let mut usage = TokenUsage::default();
        let resolved = ctx
            .resolve::<Verdict>(
                r#"{"is_correct": true, "feedback": "fine"}"#,
                &mut usage,
                || unreachable!("direct parse succeeds"),
            )
            .expect("resolve");
        assert_eq!(resolved.tier, Tier::Primary);
        assert_eq!(model.total_calls(), 0);
    }

    #[test]
    fn resolve_falls_back_to_default_after_failed_extraction() {
        let model = RoutedModel::new().route(marker::extract("verdict"), &["still prose"]);
        let prompts = PromptBuilder::new(10_000);
        let ctx = AgentContext::new(InferenceAdapter::new(&model), &prompts);
        let mut usage = TokenUsage::default();
        let resolved = ctx
            .resolve::<Verdict>("it seems right", &mut usage, || Verdict {
                is_correct: false,
                feedback: "default".to_string(),
            })
            .expect("resolve");
        assert_eq!(resolved.tier, Tier::Default);
        assert_eq!(resolved.value.feedback, "default");
        assert_eq!(model.calls(&marker::extract("verdict")), 1);
        assert_eq!(usage.calls, 1);
    }
}
