//! Loader types
//!
//! Declarative pipeline definition types for YAML parsing.

use crate::engine::{
    Branch, Level, RunStepOptionsBuilder, StepArgsSource, StepToRun, StepTree,
};
use crate::step::CommandStep;
use crate::template::{self, TemplateContext};
use crate::types::{JsonObject, JsonValue, StringMap};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Pipeline Definition
// ============================================================================

/// Top-level pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineDefinition {
    /// Pipeline name, used in logs and reports
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Default run options; CLI flags override them
    #[serde(default)]
    pub options: RunStepOptionsBuilder,
    /// Variables available to templates as `{{ vars.* }}`
    #[serde(default)]
    pub vars: JsonObject,
    /// Environment shared by every step
    #[serde(default)]
    pub env: StringMap,
    /// Ordered levels
    pub levels: Vec<LevelDefinition>,
}

/// One level of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelDefinition {
    /// Members that run concurrently
    Parallel(ParallelDefinition),
    /// A single step
    Step(StepDefinition),
}

/// A parallel level
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParallelDefinition {
    /// Parallel members
    pub parallel: Vec<BranchDefinition>,
}

/// A member of a parallel level
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BranchDefinition {
    /// A nested sequence of levels
    Tree(TreeDefinition),
    /// A single step
    Step(StepDefinition),
}

/// A nested sequence of levels inside a parallel level
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeDefinition {
    /// Nested levels
    pub levels: Vec<LevelDefinition>,
}

// ============================================================================
// Step Definition
// ============================================================================

/// A command step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct StepDefinition {
    /// Identifier, unique across the pipeline
    pub id: String,
    /// Title (defaults to the id)
    #[serde(default)]
    pub title: Option<String>,
    /// Command to run
    pub command: CommandDefinition,
    /// Extra environment variables
    #[serde(default)]
    pub env: StringMap,
    /// Working directory
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Steps that must succeed first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Keyword arguments; string values may template over prior results
    #[serde(default)]
    pub args: JsonObject,
    /// Retries of a failed run
    #[serde(default)]
    pub max_retries: u32,
    /// Delay between retries in seconds
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,
    /// Timeout of one attempt in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Exit code mapped to SUCCESS (default 0)
    #[serde(default)]
    pub success_exit_code: Option<i32>,
    /// Exit code mapped to SKIPPED
    #[serde(default)]
    pub skipped_exit_code: Option<i32>,
    /// Whether extra parameters may be passed (default true)
    #[serde(default)]
    pub accepts_params: Option<bool>,
}

/// Command as a shell line or an argument vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandDefinition {
    /// Run through `sh -c`
    Shell(String),
    /// Program followed by its arguments
    Args(Vec<String>),
}

impl CommandDefinition {
    /// Argument vector to execute
    pub fn to_command_line(&self) -> Vec<String> {
        match self {
            Self::Shell(line) => vec!["sh".to_string(), "-c".to_string(), line.clone()],
            Self::Args(args) => args.clone(),
        }
    }

    /// Check if there is nothing to run
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Shell(line) => line.trim().is_empty(),
            Self::Args(args) => !args.first().is_some_and(|p| !p.trim().is_empty()),
        }
    }
}

// ============================================================================
// Tree Construction
// ============================================================================

impl PipelineDefinition {
    /// Every step definition in declaration order
    pub fn steps(&self) -> Vec<&StepDefinition> {
        let mut steps = Vec::new();
        collect_steps(&self.levels, &mut steps);
        steps
    }

    /// Build the runnable step tree
    pub fn to_tree(&self) -> StepTree {
        let vars = JsonValue::Object(self.vars.clone());
        build_levels(&self.levels, &vars, &self.env)
    }
}

fn collect_steps<'a>(levels: &'a [LevelDefinition], steps: &mut Vec<&'a StepDefinition>) {
    for level in levels {
        match level {
            LevelDefinition::Step(step) => steps.push(step),
            LevelDefinition::Parallel(ParallelDefinition { parallel }) => {
                for branch in parallel {
                    match branch {
                        BranchDefinition::Step(step) => steps.push(step),
                        BranchDefinition::Tree(TreeDefinition { levels }) => {
                            collect_steps(levels, steps);
                        }
                    }
                }
            }
        }
    }
}

fn build_levels(levels: &[LevelDefinition], vars: &JsonValue, env: &StringMap) -> StepTree {
    levels
        .iter()
        .map(|level| match level {
            LevelDefinition::Step(step) => Level::Step(step.to_step(vars, env)),
            LevelDefinition::Parallel(ParallelDefinition { parallel }) => Level::Parallel(
                parallel
                    .iter()
                    .map(|branch| match branch {
                        BranchDefinition::Step(step) => Branch::Step(step.to_step(vars, env)),
                        BranchDefinition::Tree(TreeDefinition { levels }) => {
                            Branch::Tree(build_levels(levels, vars, env))
                        }
                    })
                    .collect(),
            ),
        })
        .collect()
}

impl StepDefinition {
    /// Title shown in logs and reports
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }

    /// Bind this definition to a runnable step
    ///
    /// Step env overrides pipeline env. Templated args are rendered against
    /// prior results right before the step runs.
    pub fn to_step(&self, vars: &JsonValue, pipeline_env: &StringMap) -> StepToRun {
        let mut command = CommandStep::new(self.display_title(), self.command.to_command_line())
            .with_vars(vars.clone());

        for (key, value) in pipeline_env.iter().chain(self.env.iter()) {
            command = command.with_env(key, value);
        }
        if let Some(ref workdir) = self.workdir {
            command = command.with_workdir(workdir);
        }
        if let Some(code) = self.success_exit_code {
            command = command.with_success_exit_code(code);
        }
        if let Some(code) = self.skipped_exit_code {
            command = command.with_skipped_exit_code(code);
        }
        if self.max_retries > 0 {
            let delay = self
                .retry_delay_secs
                .map_or(crate::step::DEFAULT_RETRY_DELAY, Duration::from_secs);
            command = command.with_retries(self.max_retries, delay);
        }
        if let Some(secs) = self.timeout_secs {
            command = command.with_max_duration(Duration::from_secs(secs));
        }
        if let Some(accepts) = self.accepts_params {
            command = command.with_accepts_params(accepts);
        }

        StepToRun::new(&self.id, command)
            .with_args_source(self.args_source(vars))
            .depends_on(self.depends_on.iter().cloned())
    }

    fn args_source(&self, vars: &JsonValue) -> StepArgsSource {
        let args = JsonValue::Object(self.args.clone());
        if !template::value_has_templates(&args) {
            return StepArgsSource::Static(self.args.clone());
        }

        let vars = vars.clone();
        StepArgsSource::from_fn(move |results| {
            let mut ctx = TemplateContext::with_vars(vars.clone());
            ctx.set_results(results);
            template::render_value(&args, &ctx)
        })
    }
}
