//! CLI module
//!
//! Command-line interface for running pipelines.
//!
//! # Commands
//!
//! - `run` - Run the pipeline and print its report
//! - `validate` - Check the pipeline definition
//! - `plan` - Show levels, dependencies and pre-skipped steps

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat, SelectionArgs, StepParamArg};
pub use runner::Runner;
