//! Step tree types
//!
//! A step tree is an ordered list of levels. Levels run one after another;
//! the members of a parallel level run concurrently and may themselves be
//! nested trees.

use crate::error::{Error, Result};
use crate::step::{Step, StepResults};
use crate::types::{JsonValue, StepArgs};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Sync argument resolver: results so far -> arguments
pub type ArgsFn = dyn Fn(&StepResults) -> Result<JsonValue> + Send + Sync;

/// Async argument resolver: results so far -> arguments
pub type AsyncArgsFn = dyn Fn(StepResults) -> BoxFuture<'static, Result<JsonValue>> + Send + Sync;

// ============================================================================
// Step Arguments
// ============================================================================

/// Where a step gets its keyword arguments from
#[derive(Clone)]
pub enum StepArgsSource {
    /// A fixed mapping
    Static(StepArgs),
    /// Computed from the results of earlier steps
    Resolver(Arc<ArgsFn>),
    /// Computed asynchronously from the results of earlier steps
    AsyncResolver(Arc<AsyncArgsFn>),
}

impl Default for StepArgsSource {
    fn default() -> Self {
        Self::Static(StepArgs::new())
    }
}

impl fmt::Debug for StepArgsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(args) => f.debug_tuple("Static").field(args).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
            Self::AsyncResolver(_) => f.write_str("AsyncResolver(..)"),
        }
    }
}

impl StepArgsSource {
    /// Arguments computed by a function of prior results
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&StepResults) -> Result<JsonValue> + Send + Sync + 'static,
    {
        Self::Resolver(Arc::new(f))
    }

    /// Arguments computed by an async function of prior results
    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(StepResults) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue>> + Send + 'static,
    {
        Self::AsyncResolver(Arc::new(move |results| f(results).boxed()))
    }

    /// Resolve to a mapping
    ///
    /// Resolver output that is not a JSON object is rejected with
    /// [`Error::InvalidArguments`].
    pub async fn resolve(&self, step_id: &str, results: &StepResults) -> Result<StepArgs> {
        let value = match self {
            Self::Static(args) => return Ok(args.clone()),
            Self::Resolver(f) => f(results)?,
            Self::AsyncResolver(f) => f(results.clone()).await?,
        };

        match value {
            JsonValue::Object(map) => Ok(map),
            other => Err(Error::invalid_args(
                step_id,
                format!(
                    "argument resolver must return a mapping, got {}",
                    json_type_name(&other)
                ),
            )),
        }
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "a mapping",
    }
}

// ============================================================================
// Step To Run
// ============================================================================

/// A step bound to an identifier, arguments and dependencies
pub struct StepToRun {
    /// Identifier, unique across the whole tree
    pub id: String,
    /// The step to execute
    pub step: Box<dyn Step>,
    /// Keyword arguments
    pub args: StepArgsSource,
    /// Identifiers of steps that must succeed first
    pub depends_on: Vec<String>,
}

impl StepToRun {
    /// Bind `step` to `id` with no arguments and no dependencies
    pub fn new(id: impl Into<String>, step: impl Step + 'static) -> Self {
        Self {
            id: id.into(),
            step: Box::new(step),
            args: StepArgsSource::default(),
            depends_on: Vec::new(),
        }
    }

    /// Set static arguments
    #[must_use]
    pub fn with_args(mut self, args: StepArgs) -> Self {
        self.args = StepArgsSource::Static(args);
        self
    }

    /// Set the argument source
    #[must_use]
    pub fn with_args_source(mut self, args: StepArgsSource) -> Self {
        self.args = args;
        self
    }

    /// Compute arguments from prior results
    #[must_use]
    pub fn with_args_fn<F>(self, f: F) -> Self
    where
        F: Fn(&StepResults) -> Result<JsonValue> + Send + Sync + 'static,
    {
        self.with_args_source(StepArgsSource::from_fn(f))
    }

    /// Compute arguments asynchronously from prior results
    #[must_use]
    pub fn with_async_args_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(StepResults) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue>> + Send + 'static,
    {
        self.with_args_source(StepArgsSource::from_async_fn(f))
    }

    /// Declare dependencies
    #[must_use]
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Title of the bound step
    pub fn title(&self) -> &str {
        self.step.title()
    }
}

impl fmt::Debug for StepToRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepToRun")
            .field("id", &self.id)
            .field("title", &self.step.title())
            .field("args", &self.args)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

// ============================================================================
// Step Tree
// ============================================================================

/// Ordered levels; each level starts once the previous one settled
pub type StepTree = Vec<Level>;

/// One slot of the sequential ordering
#[derive(Debug)]
pub enum Level {
    /// A single step
    Step(StepToRun),
    /// Members that run concurrently
    Parallel(Vec<Branch>),
}

/// A member of a parallel level
#[derive(Debug)]
pub enum Branch {
    /// A single step
    Step(StepToRun),
    /// A nested tree, run level by level alongside its siblings
    Tree(StepTree),
}

impl Level {
    /// Build a parallel level
    pub fn parallel<I, B>(branches: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Branch>,
    {
        Self::Parallel(branches.into_iter().map(Into::into).collect())
    }
}

impl From<StepToRun> for Level {
    fn from(step: StepToRun) -> Self {
        Self::Step(step)
    }
}

impl From<StepToRun> for Branch {
    fn from(step: StepToRun) -> Self {
        Self::Step(step)
    }
}

impl From<StepTree> for Branch {
    fn from(tree: StepTree) -> Self {
        Self::Tree(tree)
    }
}

/// Visit every step of a tree in declaration order
pub fn visit_steps<'a>(tree: &'a [Level], f: &mut impl FnMut(&'a StepToRun)) {
    for level in tree {
        visit_level(level, f);
    }
}

/// Visit every step of one level in declaration order
pub fn visit_level<'a>(level: &'a Level, f: &mut impl FnMut(&'a StepToRun)) {
    match level {
        Level::Step(step) => f(step),
        Level::Parallel(branches) => {
            for branch in branches {
                match branch {
                    Branch::Step(step) => f(step),
                    Branch::Tree(tree) => visit_steps(tree, f),
                }
            }
        }
    }
}

/// Visit every step of a tree mutably
pub fn visit_steps_mut(tree: &mut [Level], f: &mut impl FnMut(&mut StepToRun)) {
    for level in tree {
        match level {
            Level::Step(step) => f(step),
            Level::Parallel(branches) => {
                for branch in branches {
                    match branch {
                        Branch::Step(step) => f(step),
                        Branch::Tree(tree) => visit_steps_mut(tree, f),
                    }
                }
            }
        }
    }
}

/// All step identifiers in declaration order
pub fn step_ids(tree: &[Level]) -> Vec<String> {
    let mut ids = Vec::new();
    visit_steps(tree, &mut |step| ids.push(step.id.clone()));
    ids
}
