//! Run-wide options for the step runner

use crate::error::{Error, Result};
use crate::types::StepParams;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Default number of steps allowed to run at the same time
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Options for one `run_steps` call
///
/// Only constructible through [`RunStepOptionsBuilder::build`] (or
/// `Default`), which rejects `skip_steps` and `keep_steps` used together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RunStepOptionsBuilder")]
pub struct RunStepOptions {
    fail_fast: bool,
    concurrency: usize,
    skip_steps: BTreeSet<String>,
    keep_steps: BTreeSet<String>,
    step_params: HashMap<String, StepParams>,
    secrets_to_mask: Vec<String>,
}

impl Default for RunStepOptions {
    fn default() -> Self {
        Self {
            fail_fast: true,
            concurrency: DEFAULT_CONCURRENCY,
            skip_steps: BTreeSet::new(),
            keep_steps: BTreeSet::new(),
            step_params: HashMap::new(),
            secrets_to_mask: Vec::new(),
        }
    }
}

impl RunStepOptions {
    /// Start building options from the defaults
    pub fn builder() -> RunStepOptionsBuilder {
        RunStepOptionsBuilder::default()
    }

    /// Builder pre-filled with these options
    pub fn to_builder(&self) -> RunStepOptionsBuilder {
        RunStepOptionsBuilder {
            fail_fast: self.fail_fast,
            concurrency: self.concurrency,
            skip_steps: self.skip_steps.clone(),
            keep_steps: self.keep_steps.clone(),
            step_params: self.step_params.clone(),
            secrets_to_mask: self.secrets_to_mask.clone(),
        }
    }

    /// Stop scheduling new work after the first failure
    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Maximum number of steps in flight
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Steps to skip, along with their dependents
    pub fn skip_steps(&self) -> &BTreeSet<String> {
        &self.skip_steps
    }

    /// Steps to keep, along with their dependencies; all others are skipped
    pub fn keep_steps(&self) -> &BTreeSet<String> {
        &self.keep_steps
    }

    /// Extra parameters keyed by step id
    pub fn step_params(&self) -> &HashMap<String, StepParams> {
        &self.step_params
    }

    /// Strings masked in step output
    pub fn secrets_to_mask(&self) -> &[String] {
        &self.secrets_to_mask
    }
}

/// Builder for [`RunStepOptions`]
///
/// Also the serialized form used in pipeline files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunStepOptionsBuilder {
    /// Stop scheduling new work after the first failure
    pub fail_fast: bool,
    /// Maximum number of steps in flight
    pub concurrency: usize,
    /// Steps to skip
    pub skip_steps: BTreeSet<String>,
    /// Steps to keep
    pub keep_steps: BTreeSet<String>,
    /// Extra parameters keyed by step id
    pub step_params: HashMap<String, StepParams>,
    /// Strings masked in step output
    pub secrets_to_mask: Vec<String>,
}

impl Default for RunStepOptionsBuilder {
    fn default() -> Self {
        RunStepOptions::default().to_builder()
    }
}

impl RunStepOptionsBuilder {
    /// Set fail fast mode
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set the concurrency limit
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Skip a step and its dependents
    #[must_use]
    pub fn skip_step(mut self, id: impl Into<String>) -> Self {
        self.skip_steps.insert(id.into());
        self
    }

    /// Skip several steps and their dependents
    #[must_use]
    pub fn with_skip_steps<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_steps.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Keep a step and its dependencies
    #[must_use]
    pub fn keep_step(mut self, id: impl Into<String>) -> Self {
        self.keep_steps.insert(id.into());
        self
    }

    /// Keep several steps and their dependencies
    #[must_use]
    pub fn with_keep_steps<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep_steps.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Add one extra parameter for a step
    ///
    /// Values accumulate when the same flag is added twice.
    #[must_use]
    pub fn with_step_param<I, S>(
        mut self,
        step_id: impl Into<String>,
        flag: impl Into<String>,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.step_params
            .entry(step_id.into())
            .or_default()
            .entry(flag.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Add a secret to mask in step output
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secrets_to_mask.push(secret.into());
        self
    }

    /// Validate and build the options
    pub fn build(self) -> Result<RunStepOptions> {
        if !self.skip_steps.is_empty() && !self.keep_steps.is_empty() {
            return Err(Error::config(
                "skip_steps and keep_steps are mutually exclusive",
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be a positive integer"));
        }

        Ok(RunStepOptions {
            fail_fast: self.fail_fast,
            concurrency: self.concurrency,
            skip_steps: self.skip_steps,
            keep_steps: self.keep_steps,
            step_params: self.step_params,
            secrets_to_mask: self.secrets_to_mask,
        })
    }
}

impl TryFrom<RunStepOptionsBuilder> for RunStepOptions {
    type Error = Error;

    fn try_from(builder: RunStepOptionsBuilder) -> Result<Self> {
        builder.build()
    }
}
