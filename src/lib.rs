// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Pipelines
//!
//! A dependency-ordered, parallel step runner for CI pipelines.
//!
//! ## Features
//!
//! - **Level Trees**: Levels run in order; parallel levels run their members
//!   concurrently and may nest whole sub-trees
//! - **Dependencies**: A step runs only when every step it depends on succeeded
//! - **Fail Fast**: Stop scheduling after the first failure
//! - **Skip / Keep**: Prune steps with their dependents or dependencies
//! - **Bounded Concurrency**: One limit shared by the whole tree
//! - **YAML Pipelines**: Declarative command steps with templated arguments
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_pipelines::{run_steps, Level, NoOpStep, RunStepOptions, StepStatus, StepToRun};
//!
//! #[tokio::main]
//! async fn main() -> solidafy_pipelines::Result<()> {
//!     let tree = vec![
//!         StepToRun::new("build", NoOpStep::new("Build", StepStatus::Success)).into(),
//!         Level::parallel([
//!             StepToRun::new("unit", NoOpStep::new("Unit", StepStatus::Success))
//!                 .depends_on(["build"]),
//!             StepToRun::new("lint", NoOpStep::new("Lint", StepStatus::Success)),
//!         ]),
//!     ];
//!
//!     let results = run_steps(tree, &RunStepOptions::default()).await?;
//!     assert!(results["unit"].is_success());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       CLI (run/validate/plan)                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────────┬───────────────┴───────────────┬──────────────────┐
//! │    Loader    │            Engine             │      Report      │
//! ├──────────────┼───────────────────────────────┼──────────────────┤
//! │ YAML → tree  │ validate → skip set → levels  │ console / JSON   │
//! │ templates    │ semaphore, fail fast, errors  │ atomic save      │
//! └──────────────┴───────────────┬───────────────┴──────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          Step: run(args) → StepResult (timeout, retries)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for pipelines
pub mod error;

/// Common types and type aliases
pub mod types;

/// Step trait, results and built-in steps
pub mod step;

/// Step tree runner
pub mod engine;

/// YAML loader for pipeline definitions
pub mod loader;

/// Run reports
pub mod report;

/// Template interpolation
pub mod template;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use engine::{
    run_steps, Branch, Level, RunStepOptions, RunStepOptionsBuilder, StepArgsSource, StepRunner,
    StepToRun, StepTree,
};
pub use loader::{load_pipeline, load_pipeline_from_str, PipelineDefinition};
pub use report::Report;
pub use step::{CommandStep, NoOpStep, Step, StepResult, StepResults, StepStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
