//! YAML Loader module
//!
//! Parse pipeline definitions from YAML files.
//!
//! # Overview
//!
//! The loader module provides:
//! - `PipelineDefinition` - Declarative pipeline specification
//! - `LevelDefinition` / `BranchDefinition` - Level tree
//! - `StepDefinition` - Command step configuration
//! - YAML parsing with validation

mod parser;
mod types;

pub use parser::{load_pipeline, load_pipeline_from_str};
pub use types::{
    BranchDefinition, CommandDefinition, LevelDefinition, ParallelDefinition, PipelineDefinition,
    StepDefinition, TreeDefinition,
};

#[cfg(test)]
mod tests;
