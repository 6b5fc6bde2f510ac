//! Composition: solve each subtask, merge the programs, then repair the merge.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::agents::developer::{GenerationError, JoinPart};
use crate::core::arena::TaskId;
use crate::core::repair::DoneReason;
use crate::core::types::{Solution, SubtaskPlan};
use crate::orchestrator::{Orchestrator, Session};
use crate::repair::RepairLoop;

/// Solve `plan`'s subtasks one level down and let `task_id` adopt the repaired merge.
///
/// Subtasks are solved in plan order. A merge the developer cannot produce
/// starts the repair loop from an empty program.
#[instrument(skip_all, fields(task = %task_id, subtasks = plan.subtasks.len(), depth = depth))]
pub(crate) fn compose(
    orchestrator: &Orchestrator<'_>,
    session: &mut Session,
    task_id: TaskId,
    plan: SubtaskPlan,
    depth: u32,
) -> Result<DoneReason> {
    let child_depth = depth.saturating_sub(1);
    let mut parts = Vec::with_capacity(plan.subtasks.len());
    for subtask in plan.subtasks {
        let child = orchestrator.solve_node(session, subtask, None, child_depth, Some(task_id))?;
        let solved = session
            .arena
            .task(child)
            .with_context(|| format!("subtask {child} missing from arena"))?;
        parts.push(JoinPart {
            function_name: solved.spec.function_name.clone(),
            rating: solved.best_solution_rating,
            code: solved.code.clone(),
        });
    }

    let (spec, suite) = {
        let task = session
            .arena
            .task(task_id)
            .with_context(|| format!("task {task_id} missing from arena"))?;
        (task.spec.clone(), task.test_suite.clone())
    };
    let crew = orchestrator.crew();
    let merged = match crew
        .developer
        .join(&spec, &plan.skeleton, &parts, &mut session.usage)
    {
        Ok(code) => code,
        Err(err) if err.downcast_ref::<GenerationError>().is_some() => {
            warn!(err = %err, "join failed, repairing from an empty program");
            String::new()
        }
        Err(err) => return Err(err),
    };

    let mut solution = Solution::with_program(spec.definition.clone(), plan.skeleton, merged);
    let reason = RepairLoop::from_program(orchestrator.config().max_retry).run_to_completion(
        &crew,
        &spec,
        &suite,
        &mut solution,
        &mut session.usage,
    )?;

    let task = session
        .arena
        .task_mut(task_id)
        .with_context(|| format!("task {task_id} missing from arena"))?;
    let adopted = task.adopt(&solution);
    info!(
        ?reason,
        rating = task.best_solution_rating,
        adopted,
        "composition finished"
    );
    Ok(reason)
}
