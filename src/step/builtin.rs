//! Built-in steps

use super::types::{StepResult, StepStatus};
use super::{Step, DEFAULT_RETRY_DELAY};
use crate::error::{Error, Result, ResultExt};
use crate::template::{self, TemplateContext};
use crate::types::{params_as_cli_options, JsonValue, StepArgs, StepParams, StringMap};
use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

// ============================================================================
// No-op Step
// ============================================================================

/// A step that does nothing and returns a fixed status
#[derive(Debug, Clone)]
pub struct NoOpStep {
    title: String,
    status: StepStatus,
}

impl NoOpStep {
    /// Create a no-op step returning `status`
    pub fn new(title: impl Into<String>, status: StepStatus) -> Self {
        Self {
            title: title.into(),
            status,
        }
    }
}

#[async_trait]
impl Step for NoOpStep {
    fn title(&self) -> &str {
        &self.title
    }

    async fn run(&self, _args: &StepArgs) -> Result<StepResult> {
        Ok(StepResult::new(&self.title, self.status))
    }
}

// ============================================================================
// Command Step
// ============================================================================

/// A step that runs an external command
///
/// Command elements are templates rendered against the step arguments
/// (`{{ args.* }}`), pipeline variables (`{{ vars.* }}`) and the process
/// environment (`{{ env.* }}`). Extra parameters are appended as flags.
#[derive(Debug, Clone)]
pub struct CommandStep {
    title: String,
    command: Vec<String>,
    env: StringMap,
    workdir: Option<PathBuf>,
    vars: JsonValue,
    success_exit_code: i32,
    skipped_exit_code: Option<i32>,
    max_retries: u32,
    retry_delay: Duration,
    max_duration: Option<Duration>,
    accepts_params: bool,
    extra_options: Vec<String>,
}

impl CommandStep {
    /// Create a command step; `command[0]` is the program
    pub fn new(title: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            title: title.into(),
            command,
            env: StringMap::new(),
            workdir: None,
            vars: JsonValue::Null,
            success_exit_code: 0,
            skipped_exit_code: None,
            max_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_duration: None,
            accepts_params: true,
            extra_options: Vec::new(),
        }
    }

    /// Set an environment variable for the command
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Set pipeline variables available to templates
    #[must_use]
    pub fn with_vars(mut self, vars: JsonValue) -> Self {
        self.vars = vars;
        self
    }

    /// Set the exit code mapped to SUCCESS
    #[must_use]
    pub fn with_success_exit_code(mut self, code: i32) -> Self {
        self.success_exit_code = code;
        self
    }

    /// Set the exit code mapped to SKIPPED
    #[must_use]
    pub fn with_skipped_exit_code(mut self, code: i32) -> Self {
        self.skipped_exit_code = Some(code);
        self
    }

    /// Retry failed runs up to `max_retries` times
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = delay;
        self
    }

    /// Bound the duration of one attempt
    #[must_use]
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Allow or reject extra parameters
    #[must_use]
    pub fn with_accepts_params(mut self, accepts: bool) -> Self {
        self.accepts_params = accepts;
        self
    }

    /// Command line after template rendering, extra options included
    pub fn render_command(&self, args: &StepArgs) -> Result<Vec<String>> {
        let mut ctx = TemplateContext::with_vars(self.vars.clone());
        ctx.set_args(args);

        let mut rendered = self
            .command
            .iter()
            .map(|part| template::render(part, &ctx))
            .collect::<Result<Vec<_>>>()?;
        rendered.extend(self.extra_options.iter().cloned());
        Ok(rendered)
    }
}

#[async_trait]
impl Step for CommandStep {
    fn title(&self) -> &str {
        &self.title
    }

    async fn run(&self, args: &StepArgs) -> Result<StepResult> {
        let command_line = self.render_command(args)?;
        let Some((program, program_args)) = command_line.split_first() else {
            return Err(Error::config(format!(
                "Step '{}' has an empty command",
                self.title
            )));
        };

        debug!("Running command: {}", command_line.join(" "));

        let mut command = Command::new(program);
        command.args(program_args).envs(&self.env).kill_on_drop(true);
        if let Some(ref workdir) = self.workdir {
            command.current_dir(workdir);
        }

        let output = command
            .output()
            .await
            .with_context(|| format!("failed to spawn '{program}'"))?;

        // Terminated by a signal
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let status =
            StepStatus::from_exit_code(exit_code, self.success_exit_code, self.skipped_exit_code);

        Ok(StepResult::new(&self.title, status)
            .with_output(json!({
                "exit_code": exit_code,
                "stdout": stdout,
                "stderr": stderr,
            }))
            .with_stdout(stdout)
            .with_stderr(stderr))
    }

    fn accepts_params(&self) -> bool {
        self.accepts_params
    }

    fn set_params(&mut self, params: StepParams) -> Result<()> {
        if !self.accepts_params {
            let flags: Vec<_> = params.keys().cloned().collect();
            return Err(Error::unsupported_params(&self.title, flags.join(", ")));
        }
        self.extra_options = params_as_cli_options(&params);
        Ok(())
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }
}
