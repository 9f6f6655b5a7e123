//! Tests for YAML loader module

use super::*;
use crate::engine::{run_steps, step_ids, validate_tree, Branch, Level};
use crate::error::Error;
use crate::step::StepStatus;
use pretty_assertions::assert_eq;
use serde_json::json;

const CI_PIPELINE: &str = r#"
name: connector-ci
description: Build, test and publish a connector
options:
  fail_fast: false
  concurrency: 4
vars:
  connector: source-faker
env:
  CI: "true"
levels:
  - id: build
    command: echo built
  - parallel:
      - id: unit
        title: Unit tests
        command: ["echo", "unit"]
        depends_on: [build]
      - levels:
          - id: lint
            command: echo lint
          - id: format
            command: echo format
            depends_on: [lint]
  - id: publish
    command: echo publish
    depends_on: [unit, format]
    args:
      image: "{{ results.build.stdout }}"
      name: "{{ vars.connector }}"
"#;

// ============================================================================
// Basic Loading Tests
// ============================================================================

#[test]
fn test_load_minimal_pipeline() {
    let yaml = r#"
name: minimal
levels:
  - id: only
    command: "true"
"#;

    let def = load_pipeline_from_str(yaml).unwrap();
    assert_eq!(def.name, "minimal");
    assert_eq!(def.levels.len(), 1);
    assert!(def.vars.is_empty());

    let options = def.options.clone().build().unwrap();
    assert!(options.fail_fast());
    assert_eq!(options.concurrency(), crate::engine::DEFAULT_CONCURRENCY);
}

#[test]
fn test_load_full_pipeline() {
    let def = load_pipeline_from_str(CI_PIPELINE).unwrap();

    assert_eq!(def.description.as_deref(), Some("Build, test and publish a connector"));
    assert_eq!(def.vars["connector"], "source-faker");
    assert_eq!(def.env["CI"], "true");

    let options = def.options.clone().build().unwrap();
    assert!(!options.fail_fast());
    assert_eq!(options.concurrency(), 4);

    let ids: Vec<_> = def.steps().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["build", "unit", "lint", "format", "publish"]);
}

#[test]
fn test_level_shapes() {
    let def = load_pipeline_from_str(CI_PIPELINE).unwrap();

    assert!(matches!(def.levels[0], LevelDefinition::Step(_)));
    let LevelDefinition::Parallel(ParallelDefinition { parallel }) = &def.levels[1] else {
        panic!("expected a parallel level");
    };
    assert!(matches!(parallel[0], BranchDefinition::Step(_)));
    assert!(matches!(&parallel[1], BranchDefinition::Tree(tree) if tree.levels.len() == 2));
}

#[test]
fn test_command_forms() {
    let def = load_pipeline_from_str(CI_PIPELINE).unwrap();
    let steps = def.steps();

    assert_eq!(
        steps[0].command.to_command_line(),
        vec!["sh", "-c", "echo built"]
    );
    assert_eq!(steps[1].command, CommandDefinition::Args(vec!["echo".into(), "unit".into()]));
    assert_eq!(steps[1].display_title(), "Unit tests");
    assert_eq!(steps[0].display_title(), "build");
}

#[test]
fn test_step_fields() {
    let yaml = r#"
name: fields
levels:
  - id: flaky
    command: ./flaky.sh
    workdir: /tmp
    max_retries: 2
    retry_delay_secs: 1
    timeout_secs: 30
    success_exit_code: 0
    skipped_exit_code: 78
    accepts_params: false
    env:
      LOG_LEVEL: debug
"#;

    let def = load_pipeline_from_str(yaml).unwrap();
    let step = def.steps()[0];
    assert_eq!(step.max_retries, 2);
    assert_eq!(step.retry_delay_secs, Some(1));
    assert_eq!(step.timeout_secs, Some(30));
    assert_eq!(step.skipped_exit_code, Some(78));
    assert_eq!(step.accepts_params, Some(false));
    assert_eq!(step.env["LOG_LEVEL"], "debug");
}

#[test]
fn test_options_with_step_params() {
    let yaml = r#"
name: params
options:
  skip_steps: [lint]
  step_params:
    unit:
      "-k": ["read"]
      "--verbose": []
  secrets_to_mask: [hunter2]
levels:
  - id: lint
    command: echo lint
  - id: unit
    command: echo unit
"#;

    let def = load_pipeline_from_str(yaml).unwrap();
    let options = def.options.clone().build().unwrap();
    assert!(options.skip_steps().contains("lint"));
    assert_eq!(options.step_params()["unit"]["-k"], vec!["read".to_string()]);
    assert_eq!(options.secrets_to_mask(), ["hunter2".to_string()]);
}

// ============================================================================
// Validation Tests
// ============================================================================

#[test]
fn test_empty_name_rejected() {
    let yaml = r#"
name: ""
levels:
  - id: a
    command: "true"
"#;
    let err = load_pipeline_from_str(yaml).unwrap_err();
    assert!(err.to_string().contains("name cannot be empty"));
}

#[test]
fn test_no_levels_rejected() {
    let err = load_pipeline_from_str("name: empty\nlevels: []\n").unwrap_err();
    assert!(err.to_string().contains("at least one level"));
}

#[test]
fn test_duplicate_ids_rejected() {
    let yaml = r#"
name: dup
levels:
  - id: a
    command: "true"
  - parallel:
      - id: a
        command: "true"
"#;
    let err = load_pipeline_from_str(yaml).unwrap_err();
    assert!(err.to_string().contains("Duplicate step id 'a'"));
}

#[test]
fn test_empty_command_rejected() {
    let yaml = r#"
name: empty-command
levels:
  - id: a
    command: []
"#;
    assert!(load_pipeline_from_str(yaml).is_err());
}

#[test]
fn test_conflicting_exit_codes_rejected() {
    let yaml = r#"
name: codes
levels:
  - id: a
    command: "true"
    skipped_exit_code: 0
"#;
    let err = load_pipeline_from_str(yaml).unwrap_err();
    assert!(err.to_string().contains("same exit code"));
}

#[test]
fn test_conflicting_options_rejected_on_build() {
    let yaml = r#"
name: conflict
options:
  skip_steps: [a]
  keep_steps: [a]
levels:
  - id: a
    command: "true"
"#;
    let def = load_pipeline_from_str(yaml).unwrap();
    assert!(def.options.clone().build().is_err());
}

#[test]
fn test_unknown_step_field_rejected() {
    let yaml = r#"
name: typo
levels:
  - id: a
    comand: "true"
"#;
    assert!(matches!(
        load_pipeline_from_str(yaml),
        Err(Error::YamlParse(_))
    ));
}

#[test]
fn test_unknown_field_on_parallel_level_rejected() {
    let yaml = r#"
name: typo
levels:
  - id: x
    parallel:
      - id: a
        command: "true"
"#;
    assert!(matches!(
        load_pipeline_from_str(yaml),
        Err(Error::YamlParse(_))
    ));
}

#[test]
fn test_unknown_field_on_nested_tree_rejected() {
    let yaml = r#"
name: typo
levels:
  - parallel:
      - levels:
          - id: a
            command: "true"
        name: nested
"#;
    assert!(matches!(
        load_pipeline_from_str(yaml),
        Err(Error::YamlParse(_))
    ));
}

#[test]
fn test_load_missing_file() {
    let err = load_pipeline("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, Error::FileNotFound { .. }));
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.yaml");
    std::fs::write(&path, CI_PIPELINE).unwrap();

    let def = load_pipeline(&path).unwrap();
    assert_eq!(def.name, "connector-ci");
}

// ============================================================================
// Tree Construction Tests
// ============================================================================

#[test]
fn test_to_tree_preserves_structure() {
    let def = load_pipeline_from_str(CI_PIPELINE).unwrap();
    let tree = def.to_tree();

    assert_eq!(tree.len(), 3);
    assert_eq!(
        step_ids(&tree),
        vec!["build", "unit", "lint", "format", "publish"]
    );
    let Level::Parallel(branches) = &tree[1] else {
        panic!("expected a parallel level");
    };
    assert!(matches!(&branches[0], Branch::Step(step) if step.title() == "Unit tests"));
    assert!(matches!(&branches[1], Branch::Tree(levels) if levels.len() == 2));
    assert!(validate_tree(&tree).is_ok());
}

#[test]
fn test_same_level_dependency_fails_validation() {
    let yaml = r#"
name: bad-deps
levels:
  - parallel:
      - id: a
        command: "true"
      - id: b
        command: "true"
        depends_on: [a]
"#;
    let def = load_pipeline_from_str(yaml).unwrap();
    let err = validate_tree(&def.to_tree()).unwrap_err();
    assert!(matches!(err, Error::InvalidStepConfiguration { .. }));
}

#[tokio::test]
async fn test_templated_args_resolve_from_results() {
    let yaml = r#"
name: templated
vars:
  greeting: hello
levels:
  - id: produce
    command: printf artifact-42
  - id: consume
    command: ["echo", "{{ args.artifact }}", "{{ args.greeting }}"]
    depends_on: [produce]
    args:
      artifact: "{{ results.produce.stdout }}"
      greeting: "{{ vars.greeting }}"
"#;
    let def = load_pipeline_from_str(yaml).unwrap();
    let options = def.options.clone().build().unwrap();

    let results = run_steps(def.to_tree(), &options).await.unwrap();

    assert_eq!(results["consume"].status, StepStatus::Success);
    assert_eq!(
        results["consume"].stdout.as_deref(),
        Some("artifact-42 hello\n")
    );
}

#[tokio::test]
async fn test_static_args_are_passed_through() {
    let yaml = r#"
name: static
levels:
  - id: show
    command: ["echo", "{{ args.count }}"]
    args:
      count: 3
"#;
    let def = load_pipeline_from_str(yaml).unwrap();
    let results = run_steps(def.to_tree(), &Default::default()).await.unwrap();
    assert_eq!(results["show"].stdout.as_deref(), Some("3\n"));
    assert_eq!(results["show"].output.as_ref().unwrap()["exit_code"], json!(0));
}

#[tokio::test]
async fn test_pipeline_env_is_inherited_and_overridden() {
    let yaml = r#"
name: env
env:
  STAGE: ci
  TARGET: all
levels:
  - id: show
    command: echo "$STAGE $TARGET"
    env:
      TARGET: unit
"#;
    let def = load_pipeline_from_str(yaml).unwrap();
    let results = run_steps(def.to_tree(), &Default::default()).await.unwrap();
    assert_eq!(results["show"].stdout.as_deref(), Some("ci unit\n"));
}
