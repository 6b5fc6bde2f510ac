//! Solution search: race several candidate strategies through their repair loops.
//!
//! Each round ranks the candidates by success rate (best first, stable on ties)
//! and advances every unfinished one by a single repair cycle. The search stops
//! as soon as any candidate passes every case, or after `max_retry` rounds.

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::ranking::sort_by_rate_desc;
use crate::core::repair::{DoneReason, RepairState};
use crate::core::types::{Solution, Strategy, Task, UNTRIED_RATE};
use crate::io::inference::TokenUsage;
use crate::repair::{Crew, RepairLoop};

/// What a search produced.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The winning candidate, if any candidate was seeded.
    pub best: Option<Solution>,
    pub rounds: u32,
    /// Whether the task adopted the winner.
    pub adopted: bool,
}

struct Candidate {
    id: usize,
    solution: Solution,
    repair: RepairLoop,
}

/// Search over `seeds` and let `task` adopt the best candidate.
///
/// The best candidate only changes on a strictly higher rate, so the first
/// candidate to reach a score keeps it. Within that candidate the newest
/// program wins ties.
#[instrument(skip_all, fields(function = %task.spec.function_name, candidates = seeds.len()))]
pub fn search(
    task: &mut Task,
    seeds: Vec<Strategy>,
    crew: &Crew<'_>,
    max_retry: u32,
    usage: &mut TokenUsage,
) -> Result<SearchOutcome> {
    let mut candidates: Vec<Candidate> = seeds
        .into_iter()
        .enumerate()
        .map(|(id, seed)| Candidate {
            id,
            solution: Solution::from_seed(seed),
            repair: RepairLoop::fresh(max_retry),
        })
        .collect();

    let mut best: Option<(usize, f64)> = None;
    let mut solved = false;
    let mut rounds = 0;
    for round in 1..=max_retry {
        if candidates.iter().all(|candidate| candidate.repair.is_done()) {
            break;
        }
        rounds = round;
        sort_by_rate_desc(&mut candidates, |candidate| candidate.solution.success_rate);

        for candidate in candidates.iter_mut() {
            if candidate.repair.is_done() {
                continue;
            }
            candidate.repair.advance(
                crew,
                &task.spec,
                &task.test_suite,
                &mut candidate.solution,
                usage,
            )?;
            let rate = candidate.solution.success_rate;
            let best_rate = best.map_or(UNTRIED_RATE, |(_, rate)| rate);
            if rate > best_rate {
                debug!(round, candidate = candidate.id, rate, "new best candidate");
                best = Some((candidate.id, rate));
            }
            if candidate.repair.state() == RepairState::Done(DoneReason::Solved) {
                solved = true;
                break;
            }
        }

        if solved {
            break;
        }
    }

    let winner = match best {
        Some((id, _)) => Some(
            candidates
                .into_iter()
                .find(|candidate| candidate.id == id)
                .map(|candidate| candidate.solution)
                .ok_or_else(|| anyhow!("best candidate {id} vanished"))?,
        ),
        None => None,
    };
    let adopted = winner
        .as_ref()
        .is_some_and(|solution| task.adopt(solution));
    info!(
        rounds,
        rating = task.best_solution_rating,
        adopted,
        "solution search finished"
    );
    Ok(SearchOutcome {
        best: winner,
        rounds,
        adopted,
    })
}
