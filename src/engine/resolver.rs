//! Tree validation and skip resolution
//!
//! Both run before any step starts.

use super::options::RunStepOptions;
use super::types::{visit_level, visit_steps, Branch, Level, StepToRun};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use tracing::warn;

// ============================================================================
// Validation
// ============================================================================

/// Check identifiers and dependency ordering
///
/// Every id must be non-empty and unique across the tree. A dependency must
/// name a step from a level that runs strictly before; members of the same
/// parallel group, later levels and unknown ids are rejected with
/// [`Error::InvalidStepConfiguration`].
pub fn validate_tree(tree: &[Level]) -> Result<()> {
    let mut defined = HashSet::new();
    let mut seen = HashSet::new();
    validate_levels(tree, &mut defined, &mut seen)
}

fn validate_levels(
    levels: &[Level],
    defined: &mut HashSet<String>,
    seen: &mut HashSet<String>,
) -> Result<()> {
    for level in levels {
        match level {
            Level::Step(step) => {
                check_step(step, defined, seen)?;
                defined.insert(step.id.clone());
            }
            Level::Parallel(branches) => {
                let mut group_ids = Vec::new();
                for branch in branches {
                    match branch {
                        Branch::Step(step) => {
                            check_step(step, defined, seen)?;
                            group_ids.push(step.id.clone());
                        }
                        Branch::Tree(tree) => {
                            // Sibling branches never see each other's ids
                            let mut local = defined.clone();
                            validate_levels(tree, &mut local, seen)?;
                            group_ids.extend(local.difference(defined).cloned());
                        }
                    }
                }
                defined.extend(group_ids);
            }
        }
    }
    Ok(())
}

fn check_step(
    step: &StepToRun,
    defined: &HashSet<String>,
    seen: &mut HashSet<String>,
) -> Result<()> {
    if step.id.trim().is_empty() {
        return Err(Error::invalid_step(format!(
            "step '{}' has an empty id",
            step.title()
        )));
    }
    if !seen.insert(step.id.clone()) {
        return Err(Error::invalid_step(format!(
            "duplicate step id '{}'",
            step.id
        )));
    }

    for dep in &step.depends_on {
        if dep == &step.id {
            return Err(Error::invalid_step(format!(
                "step '{}' depends on itself",
                step.id
            )));
        }
        if defined.contains(dep) {
            continue;
        }
        if seen.contains(dep) {
            return Err(Error::invalid_step(format!(
                "step '{}' depends on '{dep}', which runs concurrently in the same parallel group",
                step.id
            )));
        }
        return Err(Error::invalid_step(format!(
            "step '{}' depends on '{dep}', which is not defined in an earlier level",
            step.id
        )));
    }
    Ok(())
}

// ============================================================================
// Skip Resolution
// ============================================================================

/// Identifiers to mark SKIPPED before execution starts
///
/// With `keep_steps`, everything that is neither kept nor a transitive
/// dependency of a kept step is skipped. With `skip_steps`, those steps and
/// every step that transitively depends on one of them are skipped.
/// Unknown identifiers are ignored.
pub fn compute_skip_set(tree: &[Level], options: &RunStepOptions) -> Result<HashSet<String>> {
    let keep = options.keep_steps();
    let skip = options.skip_steps();
    if !keep.is_empty() && !skip.is_empty() {
        return Err(Error::config(
            "skip_steps and keep_steps are mutually exclusive",
        ));
    }

    let ordered = dependency_list(tree);
    let deps: HashMap<&str, &[String]> = ordered
        .iter()
        .map(|(id, deps)| (id.as_str(), deps.as_slice()))
        .collect();

    for id in keep.iter().chain(skip.iter()) {
        if !deps.contains_key(id.as_str()) {
            warn!("Ignoring unknown step id '{id}' in skip/keep options");
        }
    }

    if !keep.is_empty() {
        let mut kept: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = keep
            .iter()
            .map(String::as_str)
            .filter(|id| deps.contains_key(id))
            .collect();
        while let Some(id) = stack.pop() {
            if kept.insert(id) {
                if let Some(step_deps) = deps.get(id) {
                    stack.extend(step_deps.iter().map(String::as_str));
                }
            }
        }
        return Ok(ordered
            .iter()
            .filter(|(id, _)| !kept.contains(id.as_str()))
            .map(|(id, _)| id.clone())
            .collect());
    }

    let mut skipped: HashSet<String> = skip
        .iter()
        .filter(|id| deps.contains_key(id.as_str()))
        .cloned()
        .collect();
    if skipped.is_empty() {
        return Ok(skipped);
    }

    // Dependencies precede dependents in a valid tree, but iterate to a
    // fixpoint so the result does not rely on declaration order.
    loop {
        let mut changed = false;
        for (id, step_deps) in &ordered {
            if !skipped.contains(id) && step_deps.iter().any(|d| skipped.contains(d)) {
                skipped.insert(id.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    Ok(skipped)
}

/// (id, depends_on) for every step in declaration order
fn dependency_list(tree: &[Level]) -> Vec<(String, Vec<String>)> {
    let mut list = Vec::new();
    visit_steps(tree, &mut |step| {
        list.push((step.id.clone(), step.depends_on.clone()));
    });
    list
}

// ============================================================================
// Planning
// ============================================================================

/// A step as it would be scheduled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    /// Step identifier
    pub id: String,
    /// Step title
    pub title: String,
    /// Index of the top-level level this step belongs to
    pub level: usize,
    /// Nesting depth (0 = top-level)
    pub depth: usize,
    /// Declared dependencies
    pub depends_on: Vec<String>,
    /// Whether the step is pre-skipped by the options
    pub skipped: bool,
}

/// Validate a tree and describe how it would run with `options`
pub fn plan(tree: &[Level], options: &RunStepOptions) -> Result<Vec<PlannedStep>> {
    validate_tree(tree)?;
    let skip_set = compute_skip_set(tree, options)?;

    let mut planned = Vec::new();
    for (index, level) in tree.iter().enumerate() {
        plan_level(level, index, 0, &skip_set, &mut planned);
    }
    Ok(planned)
}

fn plan_level(
    level: &Level,
    index: usize,
    depth: usize,
    skip_set: &HashSet<String>,
    planned: &mut Vec<PlannedStep>,
) {
    let mut push = |step: &StepToRun, depth: usize| {
        planned.push(PlannedStep {
            id: step.id.clone(),
            title: step.title().to_string(),
            level: index,
            depth,
            depends_on: step.depends_on.clone(),
            skipped: skip_set.contains(&step.id),
        });
    };

    match level {
        Level::Step(step) => push(step, depth),
        Level::Parallel(branches) => {
            for branch in branches {
                match branch {
                    Branch::Step(step) => push(step, depth + 1),
                    Branch::Tree(tree) => {
                        for nested in tree {
                            visit_level(nested, &mut |step| push(step, depth + 2));
                        }
                    }
                }
            }
        }
    }
}
