use serde_json::json;
use std::time::Duration;
use wfcore::{
    EventBus, ExecutionEvent, ExecutionId, NodeEvent, RetryPolicy, TypeHint, WorkflowIr,
    DEFAULT_ACTION,
};

#[test]
fn test_document_defaults() {
    let doc = WorkflowIr::from_value(json!({
        "format_version": "1.0",
        "description": "unknown fields are ignored",
        "inputs": {"name": {"type": "string"}},
        "nodes": [
            {"id": "a", "type": "echo"},
            {"id": "b", "type": "echo", "retry": {"max_attempts": 3}}
        ],
        "edges": [{"from": "a", "to": "b"}]
    }))
    .unwrap();

    let name = &doc.inputs["name"];
    assert!(name.required);
    assert_eq!(name.type_hint, Some(TypeHint::String));
    assert!(name.default.is_none());

    assert_eq!(doc.edges[0].action, DEFAULT_ACTION);
    assert!(doc.nodes[0].retry.is_none());
    assert_eq!(doc.nodes[1].retry, Some(RetryPolicy::new(3, 0)));
}

#[test]
fn test_entry_node_selection() {
    let mut doc = WorkflowIr::from_value(json!({
        "format_version": "1.0",
        "nodes": [
            {"id": "b", "type": "echo"},
            {"id": "a", "type": "echo"}
        ],
        "edges": [{"from": "a", "to": "b"}]
    }))
    .unwrap();
    assert_eq!(doc.entry_node().map(|n| n.id.as_str()), Some("a"));

    doc.start_node = Some("b".to_string());
    assert_eq!(doc.entry_node().map(|n| n.id.as_str()), Some("b"));

    // Every node has an incoming edge: fall back to the first one.
    doc.start_node = None;
    doc.connect("b", "a");
    assert_eq!(doc.entry_node().map(|n| n.id.as_str()), Some("b"));
}

#[test]
fn test_retry_backoff() {
    let policy = RetryPolicy::new(4, 100).with_backoff(2.0);
    assert_eq!(policy.delay_after(1), Duration::from_millis(100));
    assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    assert_eq!(policy.delay_after(3), Duration::from_millis(400));

    assert_eq!(RetryPolicy::new(0, 0).attempts(), 1);
    assert_eq!(RetryPolicy::new(2, 50).delay_after(2), Duration::from_millis(50));
}

#[test]
fn test_type_hint_coercion() {
    assert_eq!(TypeHint::Number.coerce_str(" 42 "), Some(json!(42)));
    assert_eq!(TypeHint::Number.coerce_str("4.5"), Some(json!(4.5)));
    assert_eq!(TypeHint::Boolean.coerce_str("Yes"), Some(json!(true)));
    assert_eq!(TypeHint::Object.coerce_str(r#"{"a": 1}"#), Some(json!({"a": 1})));
    assert_eq!(TypeHint::Object.coerce_str("[1]"), None);
    assert_eq!(TypeHint::Number.coerce_str("many"), None);
}

#[tokio::test]
async fn test_emitter_reaches_subscribers() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let execution_id = ExecutionId::new_v4();

    let emitter = bus.create_emitter(execution_id, "n1".to_string());
    emitter.info("hello");
    emitter.progress(50.0, None);

    match events.recv().await.unwrap() {
        ExecutionEvent::NodeEvent {
            execution_id: id,
            node_id,
            event: NodeEvent::Info { message },
            ..
        } => {
            assert_eq!(id, execution_id);
            assert_eq!(node_id, "n1");
            assert_eq!(message, "hello");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        ExecutionEvent::NodeEvent {
            event: NodeEvent::Progress { .. },
            ..
        }
    ));
}
