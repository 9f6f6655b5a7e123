//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat, SelectionArgs, StepParamArg};
use crate::engine::{plan, step_ids, validate_tree, RunStepOptions, StepRunner};
use crate::error::{Error, Result};
use crate::loader::{load_pipeline, PipelineDefinition};
use crate::report::Report;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    ///
    /// Returns `Ok(false)` when the pipeline ran but did not succeed.
    pub async fn run(&self) -> Result<bool> {
        match &self.cli.command {
            Commands::Run {
                no_fail_fast,
                concurrency,
                selection,
                step_params,
                report,
            } => {
                let overrides = RunOverrides {
                    no_fail_fast: *no_fail_fast,
                    concurrency: *concurrency,
                    selection: selection.clone(),
                    step_params: step_params.clone(),
                };
                self.run_pipeline(&overrides, report.as_deref()).await
            }
            Commands::Validate => self.validate().map(|()| true),
            Commands::Plan { selection } => {
                let overrides = RunOverrides {
                    selection: selection.clone(),
                    ..RunOverrides::default()
                };
                self.plan(&overrides).map(|()| true)
            }
        }
    }

    /// Load pipeline definition
    fn load_pipeline(&self) -> Result<PipelineDefinition> {
        let path = self
            .cli
            .pipeline
            .as_ref()
            .ok_or_else(|| Error::config("Pipeline file not specified (use -p flag)"))?;
        load_pipeline(path)
    }

    /// Run the pipeline and print its report
    ///
    /// The report is printed and saved even when steps raised errors; the
    /// aggregate error is returned afterwards.
    async fn run_pipeline(
        &self,
        overrides: &RunOverrides,
        report_path: Option<&Path>,
    ) -> Result<bool> {
        let pipeline = self.load_pipeline()?;
        let options = overrides.apply(&pipeline)?;
        let tree = pipeline.to_tree();
        let order = step_ids(&tree);

        let started = Instant::now();
        let (results, run_error) = match StepRunner::new(options).run(tree).await {
            Ok(results) => (results, None),
            Err(mut err) => match err.take_results() {
                Some(results) => (results, Some(err)),
                None => return Err(err),
            },
        };
        let report = Report::new(&pipeline.name, &order, results, started.elapsed());

        match self.cli.format {
            OutputFormat::Json => self.output_message(&json!({
                "type": "REPORT",
                "report": report.to_json(),
            })),
            OutputFormat::Pretty => println!("{}", report.render()),
        }

        if let Some(path) = report_path {
            report.save_local(path).await?;
        }

        match run_error {
            Some(err) => Err(err),
            None => Ok(report.success()),
        }
    }

    /// Validate pipeline definition
    fn validate(&self) -> Result<()> {
        let pipeline = self.load_pipeline()?;
        pipeline.options.clone().build()?;
        let tree = pipeline.to_tree();
        validate_tree(&tree)?;

        let message = format!(
            "Pipeline '{}' is valid with {} levels and {} steps",
            pipeline.name,
            tree.len(),
            step_ids(&tree).len()
        );
        match self.cli.format {
            OutputFormat::Json => self.output_message(&json!({
                "type": "LOG",
                "log": {
                    "level": "INFO",
                    "message": message
                }
            })),
            OutputFormat::Pretty => println!("{message}"),
        }

        Ok(())
    }

    /// Show the execution plan
    fn plan(&self, overrides: &RunOverrides) -> Result<()> {
        let pipeline = self.load_pipeline()?;
        let options = overrides.apply(&pipeline)?;
        let tree = pipeline.to_tree();
        let planned = plan(&tree, &options)?;

        match self.cli.format {
            OutputFormat::Json => {
                let steps: Vec<Value> = planned
                    .iter()
                    .map(|step| {
                        json!({
                            "id": step.id,
                            "title": step.title,
                            "level": step.level,
                            "depth": step.depth,
                            "depends_on": step.depends_on,
                            "skipped": step.skipped,
                        })
                    })
                    .collect();
                self.output_message(&json!({
                    "type": "PLAN",
                    "pipeline": pipeline.name,
                    "steps": steps,
                }));
            }
            OutputFormat::Pretty => {
                println!("{}", pipeline.name);
                let mut current = None;
                for step in &planned {
                    if current != Some(step.level) {
                        println!("Level {}", step.level);
                        current = Some(step.level);
                    }
                    let indent = "  ".repeat(step.depth + 1);
                    let mut line = format!("{indent}{} ({})", step.id, step.title);
                    if !step.depends_on.is_empty() {
                        line.push_str(&format!(" <- {}", step.depends_on.join(", ")));
                    }
                    if step.skipped {
                        line.push_str(" [skipped]");
                    }
                    println!("{line}");
                }
            }
        }

        Ok(())
    }

    /// Output a JSON message
    fn output_message(&self, msg: &Value) {
        println!("{}", serde_json::to_string(msg).unwrap_or_default());
    }
}

// ============================================================================
// Option Overrides
// ============================================================================

/// Run flags layered over the options of the pipeline file
#[derive(Debug, Default)]
struct RunOverrides {
    no_fail_fast: bool,
    concurrency: Option<usize>,
    selection: SelectionArgs,
    step_params: Vec<StepParamArg>,
}

impl RunOverrides {
    /// Merge the flags into the pipeline options
    ///
    /// A skip or keep flag replaces both selections of the file.
    fn apply(&self, pipeline: &PipelineDefinition) -> Result<RunStepOptions> {
        let mut builder = pipeline.options.clone();

        if self.no_fail_fast {
            builder = builder.with_fail_fast(false);
        }
        if let Some(concurrency) = self.concurrency {
            builder = builder.with_concurrency(concurrency);
        }
        if !self.selection.is_empty() {
            builder.skip_steps.clear();
            builder.keep_steps.clear();
            builder = builder
                .with_skip_steps(self.selection.skip.iter().cloned())
                .with_keep_steps(self.selection.keep.iter().cloned());
        }
        for param in &self.step_params {
            builder =
                builder.with_step_param(&param.step_id, &param.flag, param.value.iter().cloned());
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_pipeline_from_str;
    use clap::Parser;
    use std::ffi::OsStr;

    const PIPELINE: &str = r#"
name: overrides
options:
  fail_fast: true
  concurrency: 8
  skip_steps: [lint]
levels:
  - id: lint
    command: "true"
  - id: unit
    command: "true"
"#;

    #[test]
    fn test_file_options_are_kept_without_flags() {
        let pipeline = load_pipeline_from_str(PIPELINE).unwrap();
        let options = RunOverrides::default().apply(&pipeline).unwrap();
        assert!(options.fail_fast());
        assert_eq!(options.concurrency(), 8);
        assert!(options.skip_steps().contains("lint"));
    }

    #[test]
    fn test_flags_override_file_options() {
        let pipeline = load_pipeline_from_str(PIPELINE).unwrap();
        let overrides = RunOverrides {
            no_fail_fast: true,
            concurrency: Some(1),
            selection: SelectionArgs {
                skip: Vec::new(),
                keep: vec!["unit".to_string()],
            },
            step_params: vec!["unit:--verbose".parse().unwrap()],
        };

        let options = overrides.apply(&pipeline).unwrap();
        assert!(!options.fail_fast());
        assert_eq!(options.concurrency(), 1);
        assert!(options.skip_steps().is_empty());
        assert!(options.keep_steps().contains("unit"));
        assert!(options.step_params()["unit"]["--verbose"].is_empty());
    }

    #[tokio::test]
    async fn test_report_saved_when_steps_raise() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline_path = dir.path().join("ci.yaml");
        let report_path = dir.path().join("report.json");
        std::fs::write(
            &pipeline_path,
            r#"
name: partial
levels:
  - parallel:
      - id: missing
        command: ["solidafy-no-such-program"]
      - id: ok
        command: "true"
"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            OsStr::new("solidafy-pipelines"),
            OsStr::new("-p"),
            pipeline_path.as_os_str(),
            OsStr::new("--format"),
            OsStr::new("json"),
            OsStr::new("run"),
            OsStr::new("--report"),
            report_path.as_os_str(),
        ])
        .unwrap();

        let err = Runner::new(cli).run().await.unwrap_err();
        assert_eq!(err.inner_errors().len(), 1);

        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(saved["success"], false);
        assert_eq!(saved["failed_steps"], json!(["missing"]));
        assert_eq!(saved["successful_steps"], json!(["ok"]));
    }

    #[test]
    fn test_invalid_concurrency_flag() {
        let pipeline = load_pipeline_from_str(PIPELINE).unwrap();
        let overrides = RunOverrides {
            concurrency: Some(0),
            ..RunOverrides::default()
        };
        assert!(overrides.apply(&pipeline).is_err());
    }
}
