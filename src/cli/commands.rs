//! CLI commands and argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// Solidafy Pipelines CLI
#[derive(Parser, Debug)]
#[command(name = "solidafy-pipelines")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline definition file (YAML)
    #[arg(short, long, global = true)]
    pub pipeline: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "pretty")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline
    Run {
        /// Keep scheduling after a step fails
        #[arg(long)]
        no_fail_fast: bool,

        /// Maximum number of steps running at the same time
        #[arg(long)]
        concurrency: Option<usize>,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Extra parameter for a step: `step_id:flag[=value]` (repeatable)
        #[arg(long = "step-param", value_name = "STEP:FLAG[=VALUE]")]
        step_params: Vec<StepParamArg>,

        /// Save the run report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate the pipeline definition
    Validate,

    /// Show how the pipeline would run
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

/// Step selection flags
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Skip a step and its dependents (repeatable)
    #[arg(long = "skip", value_name = "STEP", conflicts_with = "keep")]
    pub skip: Vec<String>,

    /// Only run this step and its dependencies (repeatable)
    #[arg(long = "keep", value_name = "STEP")]
    pub keep: Vec<String>,
}

impl SelectionArgs {
    /// Check if any selection flag was given
    pub fn is_empty(&self) -> bool {
        self.skip.is_empty() && self.keep.is_empty()
    }
}

/// One `--step-param` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepParamArg {
    /// Target step
    pub step_id: String,
    /// Flag, e.g. `--verbose`
    pub flag: String,
    /// Optional value
    pub value: Option<String>,
}

impl FromStr for StepParamArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (step_id, option) = s
            .split_once(':')
            .ok_or_else(|| format!("expected STEP:FLAG[=VALUE], got '{s}'"))?;
        if step_id.is_empty() {
            return Err(format!("missing step id in '{s}'"));
        }

        let (flag, value) = match option.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (option, None),
        };
        if flag.is_empty() {
            return Err(format!("missing flag in '{s}'"));
        }

        Ok(Self {
            step_id: step_id.to_string(),
            flag: flag.to_string(),
            value,
        })
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn param(step: &str, flag: &str, value: Option<&str>) -> Option<StepParamArg> {
        Some(StepParamArg {
            step_id: step.to_string(),
            flag: flag.to_string(),
            value: value.map(String::from),
        })
    }

    #[test_case("unit:--verbose" => param("unit", "--verbose", None) ; "bare flag")]
    #[test_case("unit:-k=read" => param("unit", "-k", Some("read")) ; "flag with value")]
    #[test_case("unit:--filter=a=b" => param("unit", "--filter", Some("a=b")) ; "value containing equals")]
    #[test_case("unit" => None ; "missing separator")]
    #[test_case(":--verbose" => None ; "missing step")]
    #[test_case("unit:" => None ; "missing flag")]
    fn test_parse_step_param(input: &str) -> Option<StepParamArg> {
        input.parse().ok()
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "solidafy-pipelines",
            "-p",
            "ci.yaml",
            "--format",
            "json",
            "run",
            "--no-fail-fast",
            "--concurrency",
            "2",
            "--skip",
            "lint",
            "--skip",
            "format",
            "--step-param",
            "unit:-k=read",
            "--report",
            "out/report.json",
        ])
        .unwrap();

        assert_eq!(cli.pipeline, Some(PathBuf::from("ci.yaml")));
        assert_eq!(cli.format, OutputFormat::Json);
        let Commands::Run {
            no_fail_fast,
            concurrency,
            selection,
            step_params,
            report,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert!(no_fail_fast);
        assert_eq!(concurrency, Some(2));
        assert_eq!(selection.skip, vec!["lint", "format"]);
        assert_eq!(step_params[0].flag, "-k");
        assert_eq!(report, Some(PathBuf::from("out/report.json")));
    }

    #[test]
    fn test_skip_and_keep_conflict() {
        let result = Cli::try_parse_from([
            "solidafy-pipelines",
            "plan",
            "--skip",
            "a",
            "--keep",
            "b",
        ]);
        assert!(result.is_err());
    }
}
