mod common;

use common::{args, test_registry};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use wfcore::{EventBus, ExecutionEvent, NodeError, RuntimeError, WorkflowIr};
use wfruntime::{Compiler, ExecutionResult, NodeRegistry, RuntimeConfig};

fn greeter_child() -> Value {
    json!({
        "format_version": "1.0",
        "inputs": {"name": {"type": "string"}},
        "outputs": {"msg": {"type": "string"}},
        "nodes": [{"id": "say", "type": "echo", "params": {"msg": "Hello $name", "scratch": 1}}]
    })
}

async fn run(registry: NodeRegistry, doc: Value, run_args: HashMap<String, Value>) -> Result<ExecutionResult, RuntimeError> {
    let doc = WorkflowIr::from_value(doc).unwrap();
    Compiler::new(Arc::new(registry))
        .compile(&doc, run_args)
        .unwrap()
        .run(None)
        .await
}

#[tokio::test]
async fn output_mapping_renames_child_outputs() {
    let doc = json!({
        "format_version": "1.0",
        "inputs": {"who": {"type": "string"}},
        "outputs": {"greeting": {"type": "string"}},
        "nodes": [{
            "id": "sub",
            "type": "workflow",
            "params": {
                "workflow": greeter_child(),
                "param_mapping": {"name": "$who"},
                "output_mapping": {"msg": "greeting"}
            }
        }]
    });

    let registry = test_registry();
    let report = Compiler::new(Arc::new(test_registry())).validate(&WorkflowIr::from_value(doc.clone()).unwrap());
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    let result = run(registry, doc, args(&[("who", json!("Ada"))])).await.unwrap();

    assert_eq!(result.outputs["greeting"], json!("Hello Ada"));
    assert!(!result.store.contains_key("msg"));
    assert!(!result.store.contains_key("scratch"));
}

#[tokio::test]
async fn declared_child_outputs_are_copied_by_name() {
    let doc = json!({
        "format_version": "1.0",
        "nodes": [{
            "id": "sub",
            "type": "workflow",
            "params": {"workflow": greeter_child(), "param_mapping": {"name": "Grace"}}
        }]
    });

    let result = run(test_registry(), doc, HashMap::new()).await.unwrap();

    assert_eq!(result.store.get("msg"), Some(&json!("Hello Grace")));
    assert!(!result.store.contains_key("scratch"));
}

#[tokio::test]
async fn child_without_outputs_is_stored_under_the_node_id() {
    let doc = json!({
        "format_version": "1.0",
        "nodes": [{
            "id": "sub",
            "type": "workflow",
            "params": {"workflow": {
                "format_version": "1.0",
                "nodes": [{"id": "inner", "type": "echo", "params": {"answer": 42}}]
            }}
        }]
    });

    let result = run(test_registry(), doc, HashMap::new()).await.unwrap();

    assert_eq!(result.store.get("sub"), Some(&json!({"answer": 42})));
}

#[tokio::test]
async fn scanned_workflow_is_usable_as_a_node_type() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("greeter.json"),
        serde_json::to_string(&greeter_child()).unwrap(),
    )
    .unwrap();

    let mut registry = test_registry();
    assert_eq!(registry.scan_directory(dir.path()).unwrap(), 1);

    let doc = json!({
        "format_version": "1.0",
        "outputs": {"msg": {"type": "string"}},
        "nodes": [{"id": "hello", "type": "greeter", "params": {"name": "Linus"}}]
    });

    let result = run(registry, doc, HashMap::new()).await.unwrap();
    assert_eq!(result.outputs["msg"], json!("Hello Linus"));
}

#[tokio::test]
async fn child_compile_errors_fail_the_node() {
    let doc = json!({
        "format_version": "1.0",
        "nodes": [{
            "id": "sub",
            "type": "workflow",
            "params": {"workflow": {
                "format_version": "1.0",
                "nodes": [{"id": "inner", "type": "no.such.type"}]
            }}
        }]
    });

    let err = run(test_registry(), doc, HashMap::new()).await.unwrap_err();

    match err {
        RuntimeError::ExecExhausted { node_id, source, .. } => {
            assert_eq!(node_id, "sub");
            assert!(matches!(source, NodeError::ExecutionFailed(ref m) if m.contains("no.such.type")));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn self_referencing_workflow_stops_at_the_depth_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("again.json");
    let doc = json!({
        "format_version": "1.0",
        "nodes": [{"id": "again", "type": "workflow", "params": {"path": path.to_str().unwrap()}}]
    });
    std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

    let err = run(test_registry(), doc, HashMap::new()).await.unwrap_err();

    assert!(err.to_string().contains("depth limit of 10 exceeded"), "{err}");
}

#[test]
fn workflow_node_without_a_document_fails_to_build() {
    let doc = WorkflowIr::from_value(json!({
        "format_version": "1.0",
        "nodes": [{"id": "sub", "type": "workflow", "params": {}}]
    }))
    .unwrap();

    let errors = Compiler::new(Arc::new(test_registry()))
        .compile(&doc, HashMap::new())
        .err()
        .unwrap();

    assert!(errors.to_string().contains("sub"));
}

#[tokio::test]
async fn child_events_reach_the_parent_bus() {
    let doc = WorkflowIr::from_value(json!({
        "format_version": "1.0",
        "nodes": [{
            "id": "sub",
            "type": "workflow",
            "params": {"workflow": greeter_child(), "param_mapping": {"name": "Ada"}}
        }]
    }))
    .unwrap();
    let bus = Arc::new(EventBus::new(100));
    let mut events = bus.subscribe();

    Compiler::new(Arc::new(test_registry()))
        .with_event_bus(bus)
        .compile(&doc, HashMap::new())
        .unwrap()
        .run(None)
        .await
        .unwrap();

    let mut started = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::NodeStarted { node_id, .. } = event {
            started.push(node_id);
        }
    }
    assert_eq!(started, vec!["sub".to_string(), "say".to_string()]);
}

#[tokio::test]
async fn child_inherits_the_step_limit() {
    let doc = WorkflowIr::from_value(json!({
        "format_version": "1.0",
        "nodes": [{
            "id": "sub",
            "type": "workflow",
            "params": {"workflow": {
                "format_version": "1.0",
                "nodes": [
                    {"id": "a", "type": "echo", "params": {"x": 1}},
                    {"id": "b", "type": "echo", "params": {"x": 2}},
                    {"id": "c", "type": "echo", "params": {"x": 3}}
                ],
                "edges": [
                    {"from": "a", "to": "b"},
                    {"from": "b", "to": "c"}
                ]
            }}
        }]
    }))
    .unwrap();
    let config = RuntimeConfig {
        max_steps: 2,
        ..RuntimeConfig::default()
    };

    let err = Compiler::new(Arc::new(test_registry()))
        .with_config(config)
        .compile(&doc, HashMap::new())
        .unwrap()
        .run(None)
        .await
        .unwrap_err();

    match err {
        RuntimeError::ExecExhausted { node_id, source, .. } => {
            assert_eq!(node_id, "sub");
            assert!(matches!(source, NodeError::ExecutionFailed(ref m) if m.contains("limit of 2 steps")));
        }
        other => panic!("unexpected error: {other}"),
    }
}
