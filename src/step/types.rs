//! Step result types
//!
//! Results are produced once by a step run and never mutated afterwards;
//! the builder-style setters consume `self`.

use crate::types::{redact_json, redact_secrets, JsonValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Results of a run, keyed by step identifier
pub type StepResults = HashMap<String, StepResult>;

/// Terminal status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    /// The step completed successfully
    #[serde(rename = "Successful")]
    Success,
    /// The step ran and failed
    #[serde(rename = "Failed")]
    Failure,
    /// The step did not run
    #[serde(rename = "Skipped")]
    Skipped,
}

impl StepStatus {
    /// Human readable label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Successful",
            Self::Failure => "Failed",
            Self::Skipped => "Skipped",
        }
    }

    /// Console emoji for this status
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Failure => "❌",
            Self::Skipped => "🟡",
        }
    }

    /// Map a process exit code to a status
    ///
    /// `success_code` maps to SUCCESS, `skipped_code` (when set) to SKIPPED,
    /// every other code to FAILURE.
    pub fn from_exit_code(exit_code: i32, success_code: i32, skipped_code: Option<i32>) -> Self {
        if exit_code == success_code {
            Self::Success
        } else if skipped_code == Some(exit_code) {
            Self::Skipped
        } else {
            Self::Failure
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Title of the step that produced this result
    pub step: String,
    /// Terminal status
    pub status: StepStatus,
    /// When the result was created
    pub created_at: DateTime<Utc>,
    /// Captured standard output (or a skip reason)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Captured standard error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Step-defined payload consumed by dependent steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    /// Error captured while running the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// Create a result with the given status
    pub fn new(step: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step: step.into(),
            status,
            created_at: Utc::now(),
            stdout: None,
            stderr: None,
            output: None,
            error: None,
        }
    }

    /// Create a successful result
    pub fn success(step: impl Into<String>) -> Self {
        Self::new(step, StepStatus::Success)
    }

    /// Create a failed result
    pub fn failure(step: impl Into<String>) -> Self {
        Self::new(step, StepStatus::Failure)
    }

    /// Create a skipped result
    pub fn skipped(step: impl Into<String>) -> Self {
        Self::new(step, StepStatus::Skipped)
    }

    /// Set captured stdout
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = Some(stdout.into());
        self
    }

    /// Set captured stderr
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = Some(stderr.into());
        self
    }

    /// Set the output payload
    #[must_use]
    pub fn with_output(mut self, output: JsonValue) -> Self {
        self.output = Some(output);
        self
    }

    /// Set the captured error
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Return a copy with every secret masked in stdout, stderr, error and
    /// every string of the output payload
    #[must_use]
    pub fn redacted(mut self, secrets: &[String]) -> Self {
        if secrets.is_empty() {
            return self;
        }
        self.stdout = self.stdout.map(|s| redact_secrets(&s, secrets));
        self.stderr = self.stderr.map(|s| redact_secrets(&s, secrets));
        self.error = self.error.map(|s| redact_secrets(&s, secrets));
        self.output = self.output.map(|v| redact_json(v, secrets));
        self
    }

    /// Check if the step succeeded
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Check if the step failed
    pub fn is_failure(&self) -> bool {
        self.status == StepStatus::Failure
    }

    /// Check if the step was skipped
    pub fn is_skipped(&self) -> bool {
        self.status == StepStatus::Skipped
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.status)
    }
}
