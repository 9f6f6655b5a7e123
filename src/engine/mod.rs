//! Execution engine module
//!
//! Runs a step tree level by level with bounded concurrency.
//!
//! # Overview
//!
//! The engine module provides:
//! - `run_steps` - The entry point: validates, resolves skips, executes
//! - `StepRunner` - Owns the options for one or more runs
//! - `StepToRun` / `Level` / `Branch` - The step tree
//! - `RunStepOptions` - Fail fast, concurrency, skip/keep, extra params
//!
//! # Scheduling
//!
//! Levels run strictly in order. Members of a parallel level run as
//! concurrent futures on the current task; a shared semaphore caps the
//! number of steps in flight across the whole tree (nested trees never hold
//! a permit themselves). A step is dispatched once it holds a permit.
//!
//! Under fail fast, the first FAILURE stops all scheduling: later levels and
//! steps still waiting for a permit become SKIPPED, dispatched steps run to
//! completion. Without fail fast, only dependents of the failed step are
//! skipped.

mod options;
mod resolver;
mod types;

pub use options::{RunStepOptions, RunStepOptionsBuilder, DEFAULT_CONCURRENCY};
pub use resolver::{compute_skip_set, plan, validate_tree, PlannedStep};
pub use types::{
    step_ids, visit_level, visit_steps, ArgsFn, AsyncArgsFn, Branch, Level, StepArgsSource,
    StepToRun, StepTree,
};

use crate::error::{Error, Result};
use crate::step::{self, StepResult, StepResults};
use crate::types::format_duration;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, RwLock, Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};

const FAIL_FAST_REASON: &str = "Skipped because a previous step failed (fail fast)";
const OPTIONS_REASON: &str = "Skipped by run options";

/// Run a step tree and return every step's result keyed by id
///
/// Configuration errors are returned before any step runs. Unexpected
/// errors raised while resolving arguments or running steps are collected
/// and returned together as [`Error::StepErrors`] once the run settles. The
/// aggregate also carries the results of every step, see
/// [`Error::take_results`].
pub async fn run_steps(tree: StepTree, options: &RunStepOptions) -> Result<StepResults> {
    StepRunner::new(options.clone()).run(tree).await
}

/// Step tree runner
#[derive(Debug, Clone, Default)]
pub struct StepRunner {
    options: RunStepOptions,
}

/// Shared state of one run
struct RunState {
    /// Completed results; written once per step
    results: RwLock<StepResults>,
    /// Unexpected errors, in completion order
    errors: Mutex<Vec<Error>>,
    semaphore: Semaphore,
    skip_set: HashSet<String>,
    /// Step id -> configuration error for rejected extra params
    rejected_params: HashMap<String, String>,
    halted: AtomicBool,
}

impl RunState {
    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}

impl StepRunner {
    /// Create a runner with the given options
    pub fn new(options: RunStepOptions) -> Self {
        Self { options }
    }

    /// Get the run options
    pub fn options(&self) -> &RunStepOptions {
        &self.options
    }

    /// Run a step tree
    pub async fn run(&self, mut tree: StepTree) -> Result<StepResults> {
        validate_tree(&tree)?;
        let skip_set = compute_skip_set(&tree, &self.options)?;
        let rejected_params = self.apply_step_params(&mut tree);

        let total = step_ids(&tree).len();
        info!(
            "Running {total} step(s) (concurrency: {}, fail fast: {})",
            self.options.concurrency(),
            self.options.fail_fast()
        );
        if !skip_set.is_empty() {
            debug!("Pre-skipped steps: {:?}", skip_set);
        }

        let started = Instant::now();
        let state = RunState {
            results: RwLock::new(StepResults::with_capacity(total)),
            errors: Mutex::new(Vec::new()),
            semaphore: Semaphore::new(self.options.concurrency().min(Semaphore::MAX_PERMITS)),
            skip_set,
            rejected_params,
            halted: AtomicBool::new(false),
        };

        self.run_levels(&tree, &state, true).await;

        let results = state.results.into_inner();
        let errors = state.errors.into_inner();
        info!(
            "Completed {} step(s) in {}",
            results.len(),
            format_duration(started.elapsed())
        );

        if errors.is_empty() {
            Ok(results)
        } else {
            Err(Error::step_errors(errors, results))
        }
    }

    /// Apply `step_params` to the steps, returning rejections by step id
    fn apply_step_params(&self, tree: &mut StepTree) -> HashMap<String, String> {
        let params = self.options.step_params();
        let mut rejected = HashMap::new();
        let mut known = HashSet::new();

        types::visit_steps_mut(tree, &mut |step| {
            let Some(step_params) = params.get(&step.id) else {
                return;
            };
            known.insert(step.id.clone());
            if step_params.is_empty() {
                return;
            }

            let outcome = if step.step.accepts_params() {
                step.step.set_params(step_params.clone())
            } else {
                let mut flags: Vec<_> = step_params.keys().cloned().collect();
                flags.sort();
                Err(Error::unsupported_params(&step.id, flags.join(", ")))
            };

            if let Err(e) = outcome {
                warn!("{e}");
                rejected.insert(step.id.clone(), e.to_string());
            }
        });

        for id in params.keys().filter(|id| !known.contains(*id)) {
            warn!("Ignoring extra parameters for unknown step '{id}'");
        }
        rejected
    }

    /// Run levels in order
    ///
    /// `check_first` is false for the first level of a nested tree: its
    /// parallel group already passed the fail fast check when launched.
    fn run_levels<'a>(
        &'a self,
        levels: &'a [Level],
        state: &'a RunState,
        check_first: bool,
    ) -> BoxFuture<'a, ()> {
        async move {
            for (index, level) in levels.iter().enumerate() {
                if (index > 0 || check_first) && state.is_halted() {
                    self.skip_level(level, state, FAIL_FAST_REASON).await;
                    continue;
                }

                match level {
                    Level::Step(step) => {
                        let permit = state.semaphore.try_acquire().ok();
                        self.run_step(step, state, permit).await;
                    }
                    Level::Parallel(branches) => {
                        debug!("Starting parallel group of {} member(s)", branches.len());
                        // Permits are taken in declaration order before any member is polled
                        let tasks: Vec<BoxFuture<'a, ()>> = branches
                            .iter()
                            .map(|branch| match branch {
                                Branch::Step(step) => {
                                    let permit = state.semaphore.try_acquire().ok();
                                    self.run_step(step, state, permit).boxed()
                                }
                                Branch::Tree(tree) => self.run_levels(tree, state, false),
                            })
                            .collect();
                        join_all(tasks).await;
                    }
                }
            }
        }
        .boxed()
    }

    /// Run one step, recording exactly one result for it
    async fn run_step(
        &self,
        step: &StepToRun,
        state: &RunState,
        permit: Option<SemaphorePermit<'_>>,
    ) {
        if let Some(reason) = self.skip_reason(step, state).await {
            self.record(step, state, step.step.skip(&reason)).await;
            return;
        }

        let _permit = match permit {
            Some(permit) => permit,
            None => {
                debug!("{} is waiting for a concurrency slot", step.id);
                let Ok(permit) = state.semaphore.acquire().await else {
                    self.record(step, state, step.step.skip("Runner shut down"))
                        .await;
                    return;
                };
                // A sibling may have failed while this step was waiting
                if state.is_halted() {
                    self.record(step, state, step.step.skip(FAIL_FAST_REASON))
                        .await;
                    return;
                }
                permit
            }
        };

        if let Some(message) = state.rejected_params.get(&step.id) {
            let result = StepResult::failure(step.title()).with_error(message.clone());
            self.on_failure(step, state);
            self.record(step, state, result).await;
            return;
        }

        let results = state.results.read().await.clone();
        let outcome = AssertUnwindSafe(self.invoke(step, &results))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(Error::step_execution(
                    &step.id,
                    format!("step panicked: {}", panic_message(panic.as_ref())),
                ))
            });

        match outcome {
            Ok(result) => {
                if result.is_failure() {
                    self.on_failure(step, state);
                }
                self.record(step, state, result).await;
            }
            Err(e) => {
                error!("{}: unexpected error: {e}", step.id);
                let result = StepResult::failure(step.title()).with_error(e.to_string());
                self.on_failure(step, state);
                self.record(step, state, result).await;
                state.errors.lock().await.push(e);
            }
        }
    }

    /// Resolve arguments, then execute
    async fn invoke(&self, step: &StepToRun, results: &StepResults) -> Result<StepResult> {
        let args = step
            .args
            .resolve(&step.id, results)
            .await
            .map_err(|e| match e {
                Error::InvalidArguments { .. } => e,
                other => Error::invalid_args(&step.id, other.to_string()),
            })?;

        step::execute(step.step.as_ref(), &args)
            .await
            .map_err(|e| Error::step_execution(&step.id, e.to_string()))
    }

    /// Why a step must be skipped before it is dispatched, if at all
    async fn skip_reason(&self, step: &StepToRun, state: &RunState) -> Option<String> {
        if state.skip_set.contains(&step.id) {
            return Some(OPTIONS_REASON.to_string());
        }

        let results = state.results.read().await;
        for dep in &step.depends_on {
            match results.get(dep) {
                Some(result) if result.is_success() => {}
                Some(result) => {
                    return Some(format!(
                        "Skipped because dependency '{dep}' is {}",
                        result.status
                    ));
                }
                None => {
                    return Some(format!(
                        "Skipped because dependency '{dep}' has no result"
                    ));
                }
            }
        }
        None
    }

    /// Mark every step of a level as skipped
    async fn skip_level(&self, level: &Level, state: &RunState, reason: &str) {
        let mut steps = Vec::new();
        visit_level(level, &mut |step| steps.push(step));
        for step in steps {
            self.record(step, state, step.step.skip(reason)).await;
        }
    }

    fn on_failure(&self, step: &StepToRun, state: &RunState) {
        if self.options.fail_fast() && !state.halted.swap(true, Ordering::SeqCst) {
            warn!(
                "{} failed, no further steps will be scheduled (fail fast)",
                step.id
            );
        }
    }

    async fn record(&self, step: &StepToRun, state: &RunState, result: StepResult) {
        let result = result.redacted(self.options.secrets_to_mask());
        state.results.write().await.insert(step.id.clone(), result);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
