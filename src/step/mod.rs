//! Step module
//!
//! A step is one unit of pipeline work (build, test, lint, ...) with a
//! single async entry point.
//!
//! # Overview
//!
//! The step module provides:
//! - `Step` - The trait every pipeline step implements
//! - `StepResult` / `StepStatus` - Terminal outcome of a step
//! - `execute` - Runs a step with timeout, retries and logging
//! - `NoOpStep` / `CommandStep` - Built-in steps

mod builtin;
mod executor;
mod types;

pub use builtin::{CommandStep, NoOpStep};
pub use executor::execute;
pub use types::{StepResult, StepResults, StepStatus};

use crate::error::{Error, Result};
use crate::types::{StepArgs, StepParams};
use async_trait::async_trait;
use std::time::Duration;

/// Default delay between two attempts of a failed step
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Core trait that all pipeline steps implement
#[async_trait]
pub trait Step: Send + Sync {
    /// Human-readable title used in logs and reports
    fn title(&self) -> &str;

    /// Runs the step with resolved keyword arguments
    ///
    /// A step that fails in an expected way returns a FAILURE result.
    /// `Err` is reserved for unexpected errors.
    async fn run(&self, args: &StepArgs) -> Result<StepResult>;

    /// Whether this step accepts extra CLI-style parameters
    fn accepts_params(&self) -> bool {
        false
    }

    /// Apply extra parameters before the step runs
    fn set_params(&mut self, params: StepParams) -> Result<()> {
        let flags: Vec<_> = params.keys().cloned().collect();
        Err(Error::unsupported_params(self.title(), flags.join(", ")))
    }

    /// How many times a FAILURE result is retried
    fn max_retries(&self) -> u32 {
        0
    }

    /// Delay between two attempts
    fn retry_delay(&self) -> Duration {
        DEFAULT_RETRY_DELAY
    }

    /// Maximum duration of one attempt (None = unbounded)
    fn max_duration(&self) -> Option<Duration> {
        None
    }

    /// Declare this step as skipped
    fn skip(&self, reason: &str) -> StepResult {
        StepResult::skipped(self.title()).with_stdout(reason)
    }
}
