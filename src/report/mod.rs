//! Run reports
//!
//! Summarizes the results of one pipeline run, renders them for the console
//! and persists them as JSON.

use crate::error::{Result, ResultExt};
use crate::step::{StepResult, StepResults, StepStatus};
use crate::types::{format_duration, JsonValue};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// One step of a report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    /// Step identifier
    pub id: String,
    /// Step result
    pub result: StepResult,
}

/// Results of a pipeline run, in declaration order
#[derive(Debug, Clone)]
pub struct Report {
    /// Pipeline name
    pub pipeline_name: String,
    /// Ordered step results
    pub entries: Vec<ReportEntry>,
    /// When the report was created
    pub created_at: DateTime<Utc>,
    /// Wall time of the run
    pub run_duration: Duration,
}

impl Report {
    /// Create a report, ordering results by `order`
    ///
    /// Results whose id is not in `order` are appended sorted by id.
    pub fn new(
        pipeline_name: impl Into<String>,
        order: &[String],
        mut results: StepResults,
        run_duration: Duration,
    ) -> Self {
        let mut entries: Vec<ReportEntry> = order
            .iter()
            .filter_map(|id| {
                results.remove(id).map(|result| ReportEntry {
                    id: id.clone(),
                    result,
                })
            })
            .collect();

        let mut rest: Vec<_> = results.into_iter().collect();
        rest.sort_by(|a, b| a.0.cmp(&b.0));
        entries.extend(rest.into_iter().map(|(id, result)| ReportEntry { id, result }));

        Self {
            pipeline_name: pipeline_name.into(),
            entries,
            created_at: Utc::now(),
            run_duration,
        }
    }

    fn with_status(&self, status: StepStatus) -> Vec<&ReportEntry> {
        self.entries
            .iter()
            .filter(|e| e.result.status == status)
            .collect()
    }

    /// Steps that succeeded
    pub fn successful_steps(&self) -> Vec<&ReportEntry> {
        self.with_status(StepStatus::Success)
    }

    /// Steps that failed
    pub fn failed_steps(&self) -> Vec<&ReportEntry> {
        self.with_status(StepStatus::Failure)
    }

    /// Steps that were skipped
    pub fn skipped_steps(&self) -> Vec<&ReportEntry> {
        self.with_status(StepStatus::Skipped)
    }

    /// A run succeeds when no step failed and at least one step has a result
    pub fn success(&self) -> bool {
        self.failed_steps().is_empty() && !self.entries.is_empty()
    }

    /// Get the result of one step
    pub fn get(&self, id: &str) -> Option<&StepResult> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.result)
    }

    /// JSON representation of the report
    pub fn to_json(&self) -> JsonValue {
        let ids = |entries: Vec<&ReportEntry>| -> Vec<String> {
            entries.into_iter().map(|e| e.id.clone()).collect()
        };

        let steps: Vec<JsonValue> = self
            .entries
            .iter()
            .map(|e| {
                let mut value = serde_json::to_value(&e.result).unwrap_or(JsonValue::Null);
                if let JsonValue::Object(ref mut map) = value {
                    map.insert("id".to_string(), JsonValue::String(e.id.clone()));
                }
                value
            })
            .collect();

        json!({
            "pipeline_name": self.pipeline_name,
            "created_at": self.created_at.to_rfc3339(),
            "run_duration": format_duration(self.run_duration),
            "run_duration_secs": self.run_duration.as_secs_f64(),
            "success": self.success(),
            "successful_steps": ids(self.successful_steps()),
            "failed_steps": ids(self.failed_steps()),
            "skipped_steps": ids(self.skipped_steps()),
            "steps": steps,
        })
    }

    /// Pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    /// Console rendering
    pub fn render(&self) -> String {
        let width = self.entries.iter().map(|e| e.id.len()).max().unwrap_or(0);
        let overall = if self.success() {
            StepStatus::Success
        } else {
            StepStatus::Failure
        };

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} {} (duration: {})",
            overall.emoji(),
            self.pipeline_name,
            overall,
            format_duration(self.run_duration)
        );
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "  {} {:<width$}  {}",
                entry.result.status.emoji(),
                entry.id,
                entry.result.step,
            );
            if let Some(ref error) = entry.result.error {
                let _ = writeln!(out, "      {error}");
            }
        }
        let _ = write!(
            out,
            "{} successful, {} failed, {} skipped",
            self.successful_steps().len(),
            self.failed_steps().len(),
            self.skipped_steps().len()
        );
        out
    }

    /// Save the report as JSON
    ///
    /// Writes a temp file first, then renames it into place.
    pub async fn save_local(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create report directory '{}'", parent.display()))?;
        }

        let contents = self.to_json_pretty()?;
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .with_context(|| format!("Failed to write report file '{}'", temp_path.display()))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .with_context(|| format!("Failed to rename report file '{}'", path.display()))?;

        info!("Report saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Report {
        let mut results = StepResults::new();
        results.insert("lint".into(), StepResult::success("Lint"));
        results.insert("build".into(), StepResult::success("Build"));
        results.insert(
            "test".into(),
            StepResult::failure("Test").with_error("3 tests failed"),
        );
        results.insert("publish".into(), StepResult::skipped("Publish"));
        results.insert("extra".into(), StepResult::success("Extra"));

        let order = ["build", "lint", "test", "publish"].map(String::from);
        Report::new("connector-ci", &order, results, Duration::from_secs(75))
    }

    #[test]
    fn test_entries_follow_declaration_order() {
        let report = sample();
        let ids: Vec<_> = report.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["build", "lint", "test", "publish", "extra"]);
    }

    #[test]
    fn test_status_partitions() {
        let report = sample();
        assert_eq!(report.successful_steps().len(), 3);
        assert_eq!(report.failed_steps()[0].id, "test");
        assert_eq!(report.skipped_steps()[0].id, "publish");
        assert!(!report.success());
        assert_eq!(report.get("test").unwrap().status, StepStatus::Failure);
    }

    #[test]
    fn test_success_without_failures() {
        let mut results = StepResults::new();
        results.insert("a".into(), StepResult::skipped("A"));
        let report = Report::new("p", &["a".to_string()], results, Duration::ZERO);
        assert!(report.success());

        let empty = Report::new("p", &[], StepResults::new(), Duration::ZERO);
        assert!(!empty.success());
    }

    #[test]
    fn test_to_json() {
        let json = sample().to_json();
        assert_eq!(json["pipeline_name"], "connector-ci");
        assert_eq!(json["run_duration"], "1mn15s");
        assert_eq!(json["success"], false);
        assert_eq!(json["failed_steps"], json!(["test"]));
        assert_eq!(json["steps"][2]["id"], "test");
        assert_eq!(json["steps"][2]["status"], "Failed");
        assert_eq!(json["steps"][2]["error"], "3 tests failed");
    }

    #[test]
    fn test_render() {
        let text = sample().render();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("❌ connector-ci Failed (duration: 1mn15s)"));
        assert!(text.contains("✅ build    Build"));
        assert!(text.contains("      3 tests failed"));
        assert!(text.ends_with("3 successful, 1 failed, 1 skipped"));
    }

    #[test]
    fn test_save_local_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        let report = sample();

        tokio_test::block_on(report.save_local(&path)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: JsonValue = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["pipeline_name"], "connector-ci");
        assert!(!path.with_extension("tmp").exists());
    }
}
