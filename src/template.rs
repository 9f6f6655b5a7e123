//! Template interpolation for pipeline definitions
//!
//! Handles `{{ variable }}` interpolation in step commands and arguments.
//! Supports nested access like `{{ results.build.output.image }}`,
//! `{{ args.connector }}`, `{{ vars.branch }}` and `{{ env.HOME }}`.

use crate::error::{Error, Result};
use crate::step::StepResults;
use crate::types::JsonObject;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_-]*(?:\.[a-zA-Z0-9_][a-zA-Z0-9_-]*)*)\s*\}\}")
        .expect("template regex is valid")
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Results of steps that already completed, keyed by step id
    pub results: Value,
    /// Resolved keyword arguments of the current step
    pub args: Value,
    /// Pipeline-level variables
    pub vars: Value,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with pipeline variables
    pub fn with_vars(vars: Value) -> Self {
        Self {
            vars,
            ..Default::default()
        }
    }

    /// Set completed step results
    ///
    /// Each result is exposed as `{ status, stdout, stderr, output, error }`.
    pub fn set_results(&mut self, results: &StepResults) -> &mut Self {
        let mut map = serde_json::Map::new();
        for (id, result) in results {
            map.insert(
                id.clone(),
                serde_json::json!({
                    "status": result.status.as_str(),
                    "stdout": result.stdout,
                    "stderr": result.stderr,
                    "output": result.output,
                    "error": result.error,
                }),
            );
        }
        self.results = Value::Object(map);
        self
    }

    /// Set step arguments
    pub fn set_args(&mut self, args: &JsonObject) -> &mut Self {
        self.args = Value::Object(args.clone());
        self
    }

    /// Set pipeline variables
    pub fn set_vars(&mut self, vars: Value) -> &mut Self {
        self.vars = vars;
        self
    }

    /// Get a value by path (e.g., "results.build.status")
    ///
    /// `env.NAME` reads the process environment at lookup time.
    pub fn get(&self, path: &str) -> Option<Value> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.is_empty() {
            return None;
        }

        let root = match parts[0] {
            "results" => &self.results,
            "args" => &self.args,
            "vars" => &self.vars,
            "env" => {
                return match parts.as_slice() {
                    [_, name] => std::env::var(name).ok().map(Value::String),
                    _ => None,
                };
            }
            // Bare names resolve against args first, then vars
            _ => {
                return get_nested_value(&self.args, &parts)
                    .or_else(|| get_nested_value(&self.vars, &parts))
                    .cloned();
            }
        };

        if parts.len() == 1 {
            Some(root.clone())
        } else {
            get_nested_value(root, &parts[1..]).cloned()
        }
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        current = match current {
            Value::Object(map) => map.get(*part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut result = template.to_string();
    let mut errors = Vec::new();

    for cap in TEMPLATE_REGEX.captures_iter(template) {
        let (Some(full_match), Some(var_path)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        match ctx.get(var_path.as_str()) {
            Some(value) => {
                result = result.replace(full_match.as_str(), &value_to_string(&value));
            }
            None => errors.push(var_path.as_str().to_string()),
        }
    }

    if errors.is_empty() {
        Ok(result)
    } else {
        Err(Error::undefined_var(errors.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Check if any string inside a JSON value contains template variables
pub fn value_has_templates(value: &Value) -> bool {
    match value {
        Value::String(s) => has_templates(s),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| has_templates(k) || value_has_templates(v)),
        Value::Array(items) => items.iter().any(value_has_templates),
        _ => false,
    }
}

/// Extract all variable names from a template
pub fn extract_variables(template: &str) -> Vec<String> {
    TEMPLATE_REGEX
        .captures_iter(template)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        // For complex types, use JSON serialization
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Render all string values in a JSON object/value
///
/// A string made of exactly one template keeps the referenced value's JSON
/// type, so `"{{ results.build.output }}"` yields an object.
pub fn render_value(value: &Value, ctx: &TemplateContext) -> Result<Value> {
    match value {
        Value::String(s) => {
            if !has_templates(s) {
                return Ok(value.clone());
            }
            if let Some(path) = whole_template(s) {
                return ctx.get(path).ok_or_else(|| Error::undefined_var(path));
            }
            Ok(Value::String(render(s, ctx)?))
        }
        Value::Object(map) => {
            let mut new_map = serde_json::Map::new();
            for (k, v) in map {
                let new_key = if has_templates(k) {
                    render(k, ctx)?
                } else {
                    k.clone()
                };
                new_map.insert(new_key, render_value(v, ctx)?);
            }
            Ok(Value::Object(new_map))
        }
        Value::Array(arr) => {
            let new_arr: Result<Vec<Value>> = arr.iter().map(|v| render_value(v, ctx)).collect();
            Ok(Value::Array(new_arr?))
        }
        _ => Ok(value.clone()),
    }
}

/// The variable path when `s` is a single template and nothing else
fn whole_template(s: &str) -> Option<&str> {
    let cap = TEMPLATE_REGEX.captures(s.trim())?;
    let full = cap.get(0)?;
    if full.as_str().len() == s.trim().len() {
        cap.get(1).map(|m| m.as_str())
    } else {
        None
    }
}
