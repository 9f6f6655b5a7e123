//! Common types used throughout Solidafy Pipelines
//!
//! This module contains shared type definitions, type aliases,
//! and utility functions used across multiple modules.

use std::collections::HashMap;
use std::time::Duration;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// Generic key-value map with string keys and values
pub type StringMap = HashMap<String, String>;

/// Keyword arguments passed to a step
pub type StepArgs = JsonObject;

/// Extra CLI-style parameters for one step: flag -> values
pub type StepParams = HashMap<String, Vec<String>>;

/// Placeholder used when redacting secrets
pub const REDACTED: &str = "********";

// ============================================================================
// Duration Formatting
// ============================================================================

/// Format a duration the way run logs and reports display it
///
/// Durations of a minute or more render as `{minutes}mn{seconds}s`,
/// shorter ones as seconds with two decimals.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs_f64();
    if total >= 60.0 {
        let secs = duration.as_secs();
        format!("{}mn{}s", secs / 60, secs % 60)
    } else {
        format!("{total:.2}s")
    }
}

/// Render step params as CLI flags
///
/// A flag with no values renders as the bare flag; otherwise one
/// `flag=value` entry is produced per value. Flags are sorted.
pub fn params_as_cli_options(params: &StepParams) -> Vec<String> {
    let mut flags: Vec<_> = params.iter().collect();
    flags.sort_by(|a, b| a.0.cmp(b.0));

    let mut options = Vec::new();
    for (flag, values) in flags {
        if values.is_empty() {
            options.push(flag.clone());
        } else {
            options.extend(values.iter().map(|v| format!("{flag}={v}")));
        }
    }
    options
}

/// Replace every occurrence of each secret with [`REDACTED`]
pub fn redact_secrets(value: &str, secrets: &[String]) -> String {
    let mut redacted = value.to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        redacted = redacted.replace(secret.as_str(), REDACTED);
    }
    redacted
}

/// Redact every string nested in a JSON value
pub fn redact_json(value: JsonValue, secrets: &[String]) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(redact_secrets(&s, secrets)),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(|item| redact_json(item, secrets))
                .collect(),
        ),
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(key, item)| (key, redact_json(item, secrets)))
                .collect(),
        ),
        other => other,
    }
}
