//! Parsing of the planner's free-text answers.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{PlanKind, Strategy, Verdict};

static FINAL_DECISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:final\s+decision|decision)[:\s*]*([a-z]+)").expect("decision regex")
});

/// Decision named by the last "final decision" marker in `reasoning`.
pub fn final_decision(reasoning: &str) -> Option<PlanKind> {
    let lowered = reasoning.to_lowercase();
    let word = FINAL_DECISION_RE
        .captures_iter(&lowered)
        .filter_map(|caps| caps.get(1))
        .last()?
        .as_str();
    if word.starts_with("subtask") {
        Some(PlanKind::Subtasks)
    } else if word.starts_with("solution") {
        Some(PlanKind::Solutions)
    } else {
        None
    }
}

/// Decision mentioned by an extraction reply. `subtasks` wins if both appear.
pub fn mentioned_decision(reply: &str) -> Option<PlanKind> {
    let lowered = reply.to_lowercase();
    if lowered.contains("subtask") {
        Some(PlanKind::Subtasks)
    } else if lowered.contains("solution") {
        Some(PlanKind::Solutions)
    } else {
        None
    }
}

/// Trimmed body of the first `<tag>...</tag>` pair.
pub fn tagged(text: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"(?is)<{0}>\s*(.*?)\s*</{0}>", regex::escape(tag));
    let re = Regex::new(&pattern).ok()?;
    let body = re.captures(text)?.get(1)?.as_str().trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Critique revision from `<context>` and `<propose_solution>` tags.
pub fn tagged_revision(text: &str) -> Option<Strategy> {
    Some(Strategy {
        context: tagged(text, "context")?,
        propose_solution: tagged(text, "propose_solution")?,
    })
}

/// Judge verdict from `<is_correct>` and `<feedback>` tags.
pub fn tagged_verdict(text: &str) -> Option<Verdict> {
    let flag = tagged(text, "is_correct")?.to_lowercase();
    let feedback = tagged(text, "feedback").unwrap_or_default();
    Some(Verdict {
        is_correct: matches!(flag.as_str(), "true" | "correct" | "pass"),
        feedback,
    })
}
