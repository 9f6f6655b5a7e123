//! Error types for Solidafy Pipelines
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! A step that returns a FAILURE result is not an error. Errors are reserved
//! for configuration problems and for unexpected failures raised while
//! resolving arguments or running a step.

use crate::step::StepResults;
use thiserror::Error;

/// The main error type for Solidafy Pipelines
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid step configuration: {message}")]
    InvalidStepConfiguration { message: String },

    #[error("Step '{step_id}' does not accept extra parameters: {params}")]
    UnsupportedParams { step_id: String, params: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Argument Resolution Errors
    // ============================================================================
    #[error("Invalid arguments for step '{step_id}': {message}")]
    InvalidArguments { step_id: String, message: String },

    // ============================================================================
    // Execution Errors
    // ============================================================================
    #[error("Step '{step_id}' raised an error: {message}")]
    StepExecution { step_id: String, message: String },

    #[error("{} step error(s) occurred: {}", .errors.len(), format_errors(.errors))]
    StepErrors {
        errors: Vec<Error>,
        /// Results of the run, including the steps that raised
        results: Box<StepResults>,
    },

    // ============================================================================
    // Template Errors
    // ============================================================================
    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

fn format_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid step configuration error
    pub fn invalid_step(message: impl Into<String>) -> Self {
        Self::InvalidStepConfiguration {
            message: message.into(),
        }
    }

    /// Create an unsupported params error
    pub fn unsupported_params(step_id: impl Into<String>, params: impl Into<String>) -> Self {
        Self::UnsupportedParams {
            step_id: step_id.into(),
            params: params.into(),
        }
    }

    /// Create an invalid arguments error
    pub fn invalid_args(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            step_id: step_id.into(),
            message: message.into(),
        }
    }

    /// Create a step execution error
    pub fn step_execution(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepExecution {
            step_id: step_id.into(),
            message: message.into(),
        }
    }

    /// Create an aggregate of errors raised during a run
    pub fn step_errors(errors: Vec<Error>, results: StepResults) -> Self {
        Self::StepErrors {
            errors,
            results: Box::new(results),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// Check if this error is raised before any step runs
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::InvalidStepConfiguration { .. }
                | Error::UnsupportedParams { .. }
                | Error::YamlParse(_)
        )
    }

    /// Errors carried by an aggregate, or an empty slice
    pub fn inner_errors(&self) -> &[Error] {
        match self {
            Error::StepErrors { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Take the results carried by an aggregate, leaving it empty
    pub fn take_results(&mut self) -> Option<StepResults> {
        match self {
            Error::StepErrors { results, .. } => Some(std::mem::take(&mut **results)),
            _ => None,
        }
    }
}

/// Result type alias for Solidafy Pipelines
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
