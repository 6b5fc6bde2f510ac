//! Prompt rendering for every agent role.
//!
//! Templates live next to this file as markdown and are compiled in. User-facing
//! briefs mark their parts with `<!-- section:KEY required|droppable -->` so a
//! byte budget can drop the least useful parts first.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, Value};
use regex::Regex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    PlanDecision,
    DecisionExtract,
    TaskBrief,
    SubtaskPlan,
    SolutionPlan,
    Extract,
    Developer,
    SolutionBrief,
    Join,
    JoinBrief,
    Critique,
    CritiqueBrief,
    Review,
    ReviewBrief,
    Qa,
    Resolution,
}

impl Template {
    const ALL: [Template; 16] = [
        Template::PlanDecision,
        Template::DecisionExtract,
        Template::TaskBrief,
        Template::SubtaskPlan,
        Template::SolutionPlan,
        Template::Extract,
        Template::Developer,
        Template::SolutionBrief,
        Template::Join,
        Template::JoinBrief,
        Template::Critique,
        Template::CritiqueBrief,
        Template::Review,
        Template::ReviewBrief,
        Template::Qa,
        Template::Resolution,
    ];

    fn name(self) -> &'static str {
        match self {
            Template::PlanDecision => "plan_decision",
            Template::DecisionExtract => "decision_extract",
            Template::TaskBrief => "task_brief",
            Template::SubtaskPlan => "subtask_plan",
            Template::SolutionPlan => "solution_plan",
            Template::Extract => "extract",
            Template::Developer => "developer",
            Template::SolutionBrief => "solution_brief",
            Template::Join => "join",
            Template::JoinBrief => "join_brief",
            Template::Critique => "critique",
            Template::CritiqueBrief => "critique_brief",
            Template::Review => "review",
            Template::ReviewBrief => "review_brief",
            Template::Qa => "qa",
            Template::Resolution => "resolution",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Template::PlanDecision => include_str!("prompts/plan_decision.md"),
            Template::DecisionExtract => include_str!("prompts/decision_extract.md"),
            Template::TaskBrief => include_str!("prompts/task_brief.md"),
            Template::SubtaskPlan => include_str!("prompts/subtask_plan.md"),
            Template::SolutionPlan => include_str!("prompts/solution_plan.md"),
            Template::Extract => include_str!("prompts/extract.md"),
            Template::Developer => include_str!("prompts/developer.md"),
            Template::SolutionBrief => include_str!("prompts/solution_brief.md"),
            Template::Join => include_str!("prompts/join.md"),
            Template::JoinBrief => include_str!("prompts/join_brief.md"),
            Template::Critique => include_str!("prompts/critique.md"),
            Template::CritiqueBrief => include_str!("prompts/critique_brief.md"),
            Template::Review => include_str!("prompts/review.md"),
            Template::ReviewBrief => include_str!("prompts/review_brief.md"),
            Template::Qa => include_str!("prompts/qa.md"),
            Template::Resolution => include_str!("prompts/resolution.md"),
        }
    }
}

/// Renders templates and keeps briefs within a byte budget.
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        let mut env = Environment::new();
        for template in Template::ALL {
            env.add_template(template.name(), template.source())
                .expect("bundled prompt templates should be valid");
        }
        Self { env, budget_bytes }
    }

    /// Render `template` with `ctx`, applying the section budget when the template has sections.
    pub fn render(&self, template: Template, ctx: Value) -> Result<String> {
        let rendered = self
            .env
            .get_template(template.name())?
            .render(ctx)
            .with_context(|| format!("render {} prompt", template.name()))?;
        let mut sections = parse_sections(&rendered);
        if sections.is_empty() {
            return Ok(rendered.trim().to_string());
        }
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section regex")
});

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::new();
    for (idx, (_, end, key, required)) in markers.iter().enumerate() {
        let stop = markers
            .get(idx + 1)
            .map(|next| next.0)
            .unwrap_or(rendered.len());
        let content = rendered[*end..stop].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

/// Drop order for droppable sections, least useful first.
const DROP_ORDER: [&str; 4] = ["similar", "tests", "context", "code"];

fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let over = total_len(sections);
    if over <= budget {
        return;
    }
    let others: usize = sections
        .iter()
        .rev()
        .skip(1)
        .map(|s| s.content.len())
        .sum();
    let allowed = budget.saturating_sub(others);
    if let Some(last) = sections.last_mut() {
        let before_len = last.content.len();
        let marker = "\n[truncated]";
        let keep = floor_char_boundary(&last.content, allowed.saturating_sub(marker.len()));
        last.content.truncate(keep);
        last.content.push_str(marker);
        debug!(
            section = last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
