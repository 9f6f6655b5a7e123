//! YAML parser for pipeline definitions
//!
//! Parses and validates pipeline YAML files.

use crate::error::{Error, Result};
use crate::loader::types::{PipelineDefinition, StepDefinition};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Load a pipeline definition from a file path
///
/// # Examples
///
/// ```ignore
/// let pipeline = load_pipeline("./ci.yaml")?;
/// let results = run_steps(pipeline.to_tree(), &pipeline.options.clone().build()?).await?;
/// ```
pub fn load_pipeline(path: impl AsRef<Path>) -> Result<PipelineDefinition> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!(
                "Failed to read pipeline file '{}': {}",
                path.display(),
                e
            ))
        }
    })?;
    load_pipeline_from_str(&content)
}

/// Load a pipeline definition from a YAML string
pub fn load_pipeline_from_str(yaml: &str) -> Result<PipelineDefinition> {
    let def: PipelineDefinition = serde_yaml::from_str(yaml)?;

    validate_pipeline(&def)?;
    Ok(def)
}

/// Validate a pipeline definition
///
/// Dependency ordering is checked by the runner on the built tree.
fn validate_pipeline(def: &PipelineDefinition) -> Result<()> {
    if def.name.trim().is_empty() {
        return Err(Error::config("Pipeline name cannot be empty"));
    }

    if def.levels.is_empty() {
        return Err(Error::config("Pipeline must have at least one level"));
    }

    let steps = def.steps();
    let mut ids = HashSet::new();
    for step in &steps {
        if !ids.insert(step.id.as_str()) {
            return Err(Error::config(format!("Duplicate step id '{}'", step.id)));
        }
        validate_step(step)?;
    }

    Ok(())
}

/// Validate a step definition
fn validate_step(step: &StepDefinition) -> Result<()> {
    if step.id.trim().is_empty() {
        return Err(Error::config("Step id cannot be empty"));
    }

    if step.command.is_empty() {
        return Err(Error::config(format!(
            "Step '{}' command cannot be empty",
            step.id
        )));
    }

    if step.skipped_exit_code == Some(step.success_exit_code.unwrap_or(0)) {
        return Err(Error::config(format!(
            "Step '{}' uses the same exit code for success and skipped",
            step.id
        )));
    }

    Ok(())
}
