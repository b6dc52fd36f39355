/// End-to-end tests for classification, pipeline runs and resume.
///
/// Each test gets its own state file under a temp dir.
use serde_json::{json, Value};
use stagehand::workflow::{
    AgentResult, HandlerRegistry, Payload, RuleTable, RunStatus, StageStatus, StateStore,
    TaskClassifier, TaskType, WorkflowContext, WorkflowRunner, PREVIOUS_OUTPUT_KEY,
};
use stagehand::EngineConfig;
use std::sync::{Arc, Mutex};

fn config(dir: &tempfile::TempDir) -> EngineConfig {
    EngineConfig {
        state_path: dir.path().join("workflow_state.json"),
        ..Default::default()
    }
}

fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => panic!("payload must be an object"),
    }
}

#[tokio::test]
async fn test_figma_link_runs_design_pipeline_with_no_handlers() {
    let dir = tempfile::tempdir().unwrap();
    let runner = WorkflowRunner::new(&config(&dir), HandlerRegistry::new()).unwrap();

    let ctx = runner.create_context(
        "Create the Stories carousel from this figma.com/file/ABC link",
        Payload::new(),
    );
    assert_eq!(ctx.task_type, TaskType::DesignImport);
    assert_eq!(
        ctx.pipeline,
        vec![
            "design-import",
            "frontend-build",
            "review",
            "acceptance-test",
            "performance"
        ]
    );

    let ctx = runner.run(ctx).await;

    assert_eq!(ctx.status, RunStatus::Completed);
    assert_eq!(ctx.stages.len(), 5);
    assert!(ctx.records().all(|(_, r)| r.status == StageStatus::Skipped));
}

#[tokio::test]
async fn test_plain_description_uses_default_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let runner = WorkflowRunner::new(&config(&dir), HandlerRegistry::new()).unwrap();

    let ctx = runner.create_context("Build React component", Payload::new());

    assert_eq!(ctx.task_type, TaskType::Default);
    assert_eq!(
        ctx.pipeline,
        runner.rules().get(TaskType::Default).unwrap().to_vec()
    );
    let mut keys: Vec<&String> = ctx.stages.keys().collect();
    keys.sort();
    let mut expected: Vec<&String> = ctx.pipeline.iter().collect();
    expected.sort();
    assert_eq!(keys, expected);
    assert_eq!(ctx.status, RunStatus::Pending);
}

#[tokio::test]
async fn test_rule_document_is_loaded_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("rules.json");
    std::fs::write(
        &rules_path,
        r#"{"default": ["triage", "report"], "code-review": ["lint", "review"]}"#,
    )
    .unwrap();

    let mut config = config(&dir);
    config.rules_path = Some(rules_path);
    let runner = WorkflowRunner::new(&config, HandlerRegistry::new()).unwrap();

    assert_eq!(runner.build_pipeline(TaskType::Default), vec!["triage", "report"]);
    assert_eq!(runner.build_pipeline(TaskType::CodeReview), vec!["lint", "review"]);
}

#[tokio::test]
async fn test_rule_document_without_default_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("rules.json");
    std::fs::write(&rules_path, r#"{"performance": ["profile"]}"#).unwrap();

    let mut config = config(&dir);
    config.rules_path = Some(rules_path);

    assert!(WorkflowRunner::new(&config, HandlerRegistry::new()).is_err());
}

#[tokio::test]
async fn test_handlers_see_request_shape_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut registry = HandlerRegistry::new();
    for stage in ["unit-test", "quality-gate"] {
        let seen = Arc::clone(&seen);
        registry.register_fn(stage, move |req| {
            seen.lock().unwrap().push(req.clone());
            Ok(AgentResult::success(payload(json!({ "ran": req.agent_name }))))
        });
    }

    let runner = WorkflowRunner::new(&config(&dir), registry).unwrap();
    let ctx = runner.create_context(
        "Raise jest unit test coverage",
        payload(json!({ "ticket": "WEB-7", "branch": "feat/tests" })),
    );
    assert_eq!(ctx.task_type, TaskType::UnitTest);

    let ctx = runner.run(ctx).await;
    assert_eq!(ctx.status, RunStatus::Completed);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].agent_name, "unit-test");
    assert_eq!(seen[0].workflow_id, ctx.id);
    assert_eq!(seen[0].metadata["ticket"], "WEB-7");
    assert_eq!(seen[0].input["task"], "Raise jest unit test coverage");
    assert_eq!(seen[1].input["previous_agent"], "unit-test");
    assert_eq!(seen[1].input[PREVIOUS_OUTPUT_KEY]["ran"], "unit-test");
}

#[tokio::test]
async fn test_failure_is_checkpointed_and_not_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = HandlerRegistry::new();
    registry.register_fn("frontend-build", |_| Ok(AgentResult::error("compile error")));

    let runner = WorkflowRunner::new(&config(&dir), registry).unwrap();
    let ctx = runner.create_context("Fix the CSS on the landing page", Payload::new());
    let ctx = runner.run(ctx).await;

    assert_eq!(ctx.status, RunStatus::Failed);
    assert_eq!(ctx.current_agent.as_deref(), Some("frontend-build"));
    assert_eq!(
        ctx.stages["frontend-build"].error.as_deref(),
        Some("compile error")
    );
    assert!(ctx
        .records()
        .skip(1)
        .all(|(_, r)| r.status == StageStatus::Pending));

    let resumed = runner.resume().await.unwrap();
    assert_eq!(resumed, ctx);
}

#[tokio::test]
async fn test_resume_after_interruption() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("workflow_state.json"));

    // a run that died while its third stage was in flight
    let mut ctx = WorkflowContext::new(
        "Add a REST API endpoint",
        TaskType::BackendBuild,
        RuleTable::default().build(TaskType::BackendBuild),
        Payload::new(),
    );
    ctx.start();
    ctx.start_stage("backend-build", Payload::new());
    ctx.finish_stage(
        "backend-build",
        &AgentResult::success(payload(json!({ "files": ["api.rs"] }))),
    );
    ctx.start_stage("unit-test", Payload::new());
    ctx.finish_stage(
        "unit-test",
        &AgentResult::success(payload(json!({ "passed": 12 }))),
    );
    ctx.start_stage("quality-gate", Payload::new());
    store.save(&ctx).unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    for stage in ["backend-build", "unit-test", "quality-gate", "review"] {
        let calls = Arc::clone(&calls);
        registry.register_fn(stage, move |req| {
            calls.lock().unwrap().push(req.agent_name.clone());
            Ok(AgentResult::success(Payload::new()))
        });
    }

    let runner = WorkflowRunner::from_parts(
        TaskClassifier::default(),
        RuleTable::default(),
        registry,
        store,
    );
    let resumed = runner.resume().await.unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["quality-gate", "review"]);
    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(
        resumed.stages["quality-gate"].input_data[PREVIOUS_OUTPUT_KEY]["passed"],
        12
    );
    assert_eq!(runner.store().load().unwrap(), resumed);
}

#[tokio::test]
async fn test_engines_with_different_state_paths_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let first = WorkflowRunner::new(
        &EngineConfig {
            state_path: dir.path().join("one.json"),
            ..Default::default()
        },
        HandlerRegistry::new(),
    )
    .unwrap();
    let second = WorkflowRunner::new(
        &EngineConfig {
            state_path: dir.path().join("two.json"),
            ..Default::default()
        },
        HandlerRegistry::new(),
    )
    .unwrap();

    let a = first
        .run(first.create_context("Run lighthouse", Payload::new()))
        .await;
    let b = second
        .run(second.create_context("Run eslint", Payload::new()))
        .await;

    assert_eq!(first.store().load().unwrap().id, a.id);
    assert_eq!(second.store().load().unwrap().id, b.id);
    assert_ne!(a.id, b.id);
}
