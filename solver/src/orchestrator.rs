//! Recursive solve: build the suite, plan, then search or compose.
//!
//! Every task visited lands in a [`TaskArena`]; children point at their parent
//! by [`TaskId`]. Depth counts down from `max_depth`, and a task at depth 0 is
//! always solved directly.

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::agents::AgentContext;
use crate::agents::developer::Developer;
use crate::agents::judge::Judge;
use crate::agents::qa::{QaAgent, TestSuiteSource};
use crate::agents::researcher::{Researcher, direct_seed};
use crate::compose::compose;
use crate::core::arena::{TaskArena, TaskId};
use crate::core::types::{Plan, Task, TaskSpec, TestSuite};
use crate::io::config::SolverConfig;
use crate::io::inference::{InferenceAdapter, LanguageModel, TokenUsage};
use crate::io::prompt::PromptBuilder;
use crate::io::similarity::SimilarityIndex;
use crate::io::syntax::SyntaxChecker;
use crate::io::test_runner::TestExecutor;
use crate::repair::Crew;
use crate::search::search;

/// External services the solver talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub model: &'a dyn LanguageModel,
    pub executor: &'a dyn TestExecutor,
    pub checker: &'a dyn SyntaxChecker,
    /// Replaces the QA agent for every task when set.
    pub tests: Option<&'a dyn TestSuiteSource>,
    pub index: Option<&'a dyn SimilarityIndex>,
}

/// Result of one top-level solve.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub arena: TaskArena,
    pub root: TaskId,
    pub usage: TokenUsage,
}

impl SolveOutcome {
    pub fn root_task(&self) -> Option<&Task> {
        self.arena.task(self.root)
    }
}

/// Mutable state threaded through one solve.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub arena: TaskArena,
    pub usage: TokenUsage,
}

pub struct Orchestrator<'a> {
    config: SolverConfig,
    deps: Collaborators<'a>,
    prompts: PromptBuilder,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: SolverConfig, deps: Collaborators<'a>) -> Result<Self> {
        config.validate().context("invalid solver config")?;
        if config.use_similarity && deps.index.is_none() {
            bail!("use_similarity is enabled but no similarity index was provided");
        }
        let prompts = PromptBuilder::new(config.prompt_budget_bytes);
        Ok(Self {
            config,
            deps,
            prompts,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve `spec` with a suite written by the QA agent (or the configured source).
    pub fn solve(&self, spec: TaskSpec) -> Result<SolveOutcome> {
        self.run(spec, None)
    }

    /// Solve `spec` against a known suite. Subtasks still get their own suites.
    pub fn solve_with_suite(&self, spec: TaskSpec, suite: TestSuite) -> Result<SolveOutcome> {
        self.run(spec, Some(suite))
    }

    /// Single-strategy baseline: no planning, no decomposition.
    #[instrument(skip_all, fields(function = %spec.function_name))]
    pub fn solve_direct(&self, spec: TaskSpec, suite: TestSuite) -> Result<SolveOutcome> {
        let mut session = Session::default();
        let seeds = vec![direct_seed(&spec)];
        let root = session.arena.insert(Task::new(spec, suite), None, 0);
        let crew = self.crew();
        let task = session
            .arena
            .task_mut(root)
            .with_context(|| format!("task {root} missing from arena"))?;
        search(task, seeds, &crew, self.config.max_retry, &mut session.usage)?;
        self.finish(&mut session, root)?;
        Ok(SolveOutcome {
            arena: session.arena,
            root,
            usage: session.usage,
        })
    }

    fn run(&self, spec: TaskSpec, suite: Option<TestSuite>) -> Result<SolveOutcome> {
        let mut session = Session::default();
        let root = self.solve_node(&mut session, spec, suite, self.config.max_depth, None)?;
        let outcome = SolveOutcome {
            arena: session.arena,
            root,
            usage: session.usage,
        };
        if let Some(task) = outcome.root_task() {
            info!(
                tasks = outcome.arena.len(),
                rating = task.best_solution_rating,
                calls = outcome.usage.calls,
                tokens = outcome.usage.total_tokens(),
                "solve finished"
            );
        }
        Ok(outcome)
    }

    /// Solve one task and everything below it; returns the task's id.
    #[instrument(skip_all, fields(function = %spec.function_name, depth = depth))]
    pub(crate) fn solve_node(
        &self,
        session: &mut Session,
        spec: TaskSpec,
        suite: Option<TestSuite>,
        depth: u32,
        parent: Option<TaskId>,
    ) -> Result<TaskId> {
        let suite = match suite {
            Some(suite) => suite,
            None => self.build_suite(&spec, &mut session.usage)?,
        };
        let response = self.researcher().decide(
            &spec,
            &suite,
            depth == 0,
            self.config.use_similarity,
            &mut session.usage,
        )?;
        let id = session.arena.insert(Task::new(spec, suite), parent, depth);
        info!(task = %id, path = %session.arena.path(id), kind = ?response.kind(), "planned");

        match response.plan {
            Plan::Subtasks(plan) => {
                compose(self, session, id, plan, depth)?;
            }
            Plan::Solutions(seeds) => {
                let crew = self.crew();
                let task = session
                    .arena
                    .task_mut(id)
                    .with_context(|| format!("task {id} missing from arena"))?;
                search(task, seeds, &crew, self.config.max_retry, &mut session.usage)?;
            }
        }
        self.finish(session, id)?;
        Ok(id)
    }

    pub(crate) fn crew(&self) -> Crew<'_> {
        let ctx = self.agents();
        Crew {
            developer: Developer::new(ctx, self.deps.checker, self.config.generation_retry),
            judge: Judge::new(ctx),
            executor: self.deps.executor,
            judge_level: self.config.judge_level,
        }
    }

    fn agents(&self) -> AgentContext<'_> {
        AgentContext::new(InferenceAdapter::new(self.deps.model), &self.prompts)
    }

    fn researcher(&self) -> Researcher<'_> {
        Researcher::new(self.agents(), self.deps.index, self.config.similarity_top_k)
    }

    fn build_suite(&self, spec: &TaskSpec, usage: &mut TokenUsage) -> Result<TestSuite> {
        match self.deps.tests {
            Some(source) => source.build_test_suite(spec, usage),
            None => QaAgent::new(self.agents()).build_test_suite(spec, usage),
        }
    }

    /// Write the resolution template and offer the task to the index.
    fn finish(&self, session: &mut Session, id: TaskId) -> Result<()> {
        let researcher = self.researcher();
        let task = session
            .arena
            .task_mut(id)
            .with_context(|| format!("task {id} missing from arena"))?;
        task.template = researcher.summarize_resolution(task, &mut session.usage);
        researcher.remember(task);
        Ok(())
    }
}
