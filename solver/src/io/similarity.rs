//! Memory of solved tasks used to prime the planner.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{Task, TaskSpec};

/// What the planner sees about a previously solved task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub definition: String,
    pub definition_of_done: String,
    pub rating: f64,
    pub template: String,
}

/// Nearest-neighbour lookup over solved tasks. Best effort: a miss is an empty list.
pub trait SimilarityIndex {
    fn search(&self, spec: &TaskSpec, top_k: usize) -> Vec<TaskSummary>;
    fn add(&self, task: &Task);
}

#[derive(Debug, Clone)]
struct Entry {
    tokens: BTreeSet<String>,
    summary: TaskSummary,
}

/// In-memory index scoring by token overlap. Evicts the oldest entry when full.
#[derive(Debug)]
pub struct KeywordIndex {
    capacity: usize,
    entries: RefCell<VecDeque<Entry>>,
}

impl KeywordIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RefCell::new(VecDeque::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl SimilarityIndex for KeywordIndex {
    fn search(&self, spec: &TaskSpec, top_k: usize) -> Vec<TaskSummary> {
        let query = tokens(spec);
        let entries = self.entries.borrow();
        let mut scored: Vec<(f64, &Entry)> = entries
            .iter()
            .map(|entry| (jaccard(&query, &entry.tokens), entry))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        debug!(candidates = scored.len(), top_k, "similarity search");
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, entry)| entry.summary.clone())
            .collect()
    }

    fn add(&self, task: &Task) {
        let mut entries = self.entries.borrow_mut();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(Entry {
            tokens: tokens(&task.spec),
            summary: TaskSummary {
                definition: task.spec.definition.clone(),
                definition_of_done: task.spec.definition_of_done.clone(),
                rating: task.best_solution_rating,
                template: task.template.clone(),
            },
        });
    }
}

/// Lower-cased alphanumeric tokens of "definition | keywords | definition of done".
fn tokens(spec: &TaskSpec) -> BTreeSet<String> {
    let text = format!(
        "{} | {} | {}",
        spec.definition,
        spec.keywords.join(", "),
        spec.definition_of_done
    );
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|token| token.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
