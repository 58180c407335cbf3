use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use wfcore::{Node, NodeContext, NodeError, NodeSpec, Value, ValueStore, WorkflowIr};
use wfnodes::{
    standard_registry, DelayNode, EchoNode, FileReadNode, FileWriteNode, HttpRequestNode,
    JsonParseNode, ShellNode,
};
use wfruntime::{FlowRuntime, RuntimeConfig};

// Drive one node through prep, exec and post without a runtime
async fn drive(
    node: &dyn Node,
    ctx: &NodeContext,
    store: &mut ValueStore,
) -> Result<String, NodeError> {
    let prepared = node.prep(ctx, store).await?;
    let result = match node.exec(ctx, &prepared).await {
        Ok(value) => value,
        Err(e) => node.exec_fallback(ctx, &prepared, e).await?,
    };
    node.post(ctx, store, &prepared, result).await
}

fn runtime() -> FlowRuntime {
    FlowRuntime::with_registry(Arc::new(standard_registry()), RuntimeConfig::default())
}

#[tokio::test]
async fn test_echo_records_params() {
    let ctx = NodeContext::detached("n1", "echo").with_param("msg", "Ada");
    let mut store = ValueStore::new();

    let action = drive(&EchoNode, &ctx, &mut store).await.unwrap();

    assert_eq!(action, "default");
    assert_eq!(store.get("msg"), Some(&json!("Ada")));
    assert_eq!(store.get("echo"), Some(&json!({"msg": "Ada"})));
}

#[tokio::test]
async fn test_echo_scenario_through_runtime() {
    let doc = WorkflowIr::from_value(json!({
        "format_version": "1.0",
        "inputs": {"name": {"required": true, "type": "string"}},
        "nodes": [{"id": "n1", "type": "echo", "params": {"msg": "$name"}}],
        "edges": []
    }))
    .unwrap();

    let result = runtime()
        .execute(&doc, HashMap::from([("name".to_string(), json!("Ada"))]))
        .await
        .unwrap();

    assert_eq!(result.store.get("msg"), Some(&json!("Ada")));
}

#[tokio::test]
async fn test_file_write_then_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/out.txt");
    let path = path.to_str().unwrap();
    let mut store = ValueStore::new();

    let write = NodeContext::detached("w", "file.write")
        .with_param("path", path)
        .with_param("content", "hello");
    drive(&FileWriteNode, &write, &mut store).await.unwrap();
    assert_eq!(store.get("bytes_written"), Some(&json!(5)));

    let append = write.clone().with_param("append", true).with_param("content", " world");
    drive(&FileWriteNode, &append, &mut store).await.unwrap();

    let read = NodeContext::detached("r", "file.read")
        .with_param("path", path)
        .with_param("output_key", "text");
    drive(&FileReadNode, &read, &mut store).await.unwrap();
    assert_eq!(store.get_str("text"), Some("hello world"));
}

#[tokio::test]
async fn test_file_write_renders_structured_content_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    let ctx = NodeContext::detached("w", "file.write")
        .with_param("path", path.to_str().unwrap())
        .with_param("content", json!({"a": [1, 2]}));

    drive(&FileWriteNode, &ctx, &mut ValueStore::new()).await.unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"a":[1,2]}"#);
}

#[tokio::test]
async fn test_file_read_missing_file() {
    let ctx = NodeContext::detached("r", "file.read").with_param("path", "/no/such/file.txt");
    let err = drive(&FileReadNode, &ctx, &mut ValueStore::new()).await.unwrap_err();
    assert!(matches!(err, NodeError::ExecutionFailed(ref m) if m.contains("/no/such/file.txt")));

    let ctx = ctx.with_param("default", "fallback text");
    let mut store = ValueStore::new();
    drive(&FileReadNode, &ctx, &mut store).await.unwrap();
    assert_eq!(store.get_str("content"), Some("fallback text"));
}

#[tokio::test]
async fn test_file_read_path_from_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("in.txt");
    std::fs::write(&path, "from store").unwrap();

    let mut store = ValueStore::new();
    store.insert("path", path.to_str().unwrap());
    let ctx = NodeContext::detached("r", "file.read");

    drive(&FileReadNode, &ctx, &mut store).await.unwrap();
    assert_eq!(store.get_str("content"), Some("from store"));
}

#[tokio::test]
async fn test_shell_captures_stdout() {
    let ctx = NodeContext::detached("sh", "shell.run")
        .with_param("command", "echo")
        .with_param("args", json!(["hello", "shell"]));
    let mut store = ValueStore::new();

    drive(&ShellNode, &ctx, &mut store).await.unwrap();

    let output = store.get("shell").unwrap();
    assert_eq!(output["stdout"], json!("hello shell\n"));
    assert_eq!(output["exit_code"], json!(0));
    assert_eq!(output["success"], json!(true));
}

#[tokio::test]
async fn test_shell_non_zero_exit() {
    let ctx = NodeContext::detached("sh", "shell.run").with_param("command", "false");
    let err = drive(&ShellNode, &ctx, &mut ValueStore::new()).await.unwrap_err();
    assert!(matches!(err, NodeError::ExecutionFailed(_)));

    let ctx = ctx.with_param("fail_on_error", false);
    let mut store = ValueStore::new();
    drive(&ShellNode, &ctx, &mut store).await.unwrap();
    assert_eq!(store.get("shell").unwrap()["success"], json!(false));
}

#[tokio::test]
async fn test_shell_large_stdin_round_trips() {
    let input = "x".repeat(1024 * 1024);
    let doc = WorkflowIr::new("1.0").with_node(
        NodeSpec::new("cat", "shell.run")
            .with_param("command", "cat")
            .with_param("stdin", input.as_str()),
    );

    let runtime = runtime();
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        runtime.execute(&doc, HashMap::new()),
    )
    .await
    .expect("shell.run stalled on a large stdin")
    .unwrap();

    let stdout = result.store.get("shell").unwrap()["stdout"].as_str().unwrap().len();
    assert_eq!(stdout, input.len());
}

#[tokio::test]
async fn test_shell_cancel_while_stdin_is_blocked() {
    // sleep never reads, so the stdin pipe fills up
    let ctx = NodeContext::detached("sh", "shell.run")
        .with_param("command", "sleep")
        .with_param("args", json!(["5"]))
        .with_param("stdin", "y".repeat(1024 * 1024));
    let token = ctx.cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        token.cancel();
    });

    let err = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        ShellNode.exec(&ctx, &Value::Null),
    )
    .await
    .expect("cancellation did not interrupt shell.run")
    .unwrap_err();

    assert_eq!(err, NodeError::Cancelled);
}

#[tokio::test]
async fn test_json_parse() {
    let ctx = NodeContext::detached("p", "transform.json_parse").with_param("json", r#"{"items": [1, 2, 3]}"#);
    let mut store = ValueStore::new();

    drive(&JsonParseNode, &ctx, &mut store).await.unwrap();
    assert_eq!(store.get("parsed"), Some(&json!({"items": [1, 2, 3]})));

    let bad = NodeContext::detached("p", "transform.json_parse").with_param("json", "{oops");
    let err = drive(&JsonParseNode, &bad, &mut ValueStore::new()).await.unwrap_err();
    assert!(err.to_string().contains("JSON parse error"));
}

#[tokio::test]
async fn test_delay_honours_cancellation() {
    let ctx = NodeContext::detached("d", "time.delay").with_param("delay_ms", 10_000);
    ctx.cancellation.cancel();

    let err = DelayNode.exec(&ctx, &Value::Null).await.unwrap_err();
    assert_eq!(err, NodeError::Cancelled);
}

#[tokio::test]
async fn test_http_rejects_unknown_method() {
    let ctx = NodeContext::detached("h", "http.request")
        .with_param("url", "http://127.0.0.1:9")
        .with_param("method", "BREW");

    let err = HttpRequestNode::new().exec(&ctx, &Value::Null).await.unwrap_err();
    assert!(matches!(err, NodeError::Configuration(ref m) if m.contains("BREW")));
}

#[tokio::test]
async fn test_pipeline_write_read_parse() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let doc = WorkflowIr::new("1.0")
        .with_input("path", wfcore::DeclaredInput::required(wfcore::TypeHint::String))
        .with_output("settings", wfcore::DeclaredOutput::new(wfcore::TypeHint::Object))
        .with_node(
            NodeSpec::new("write", "file.write")
                .with_param("path", "$path")
                .with_param("content", json!({"retries": 3})),
        )
        .with_node(NodeSpec::new("read", "file.read").with_param("path", "$path"))
        .with_node(
            NodeSpec::new("parse", "transform.json_parse")
                .with_param("json", "$content")
                .with_param("output_key", "settings"),
        )
        .with_node(NodeSpec::new("log", "debug.log").with_param("message", "retries=${settings.retries}"))
        .with_edge("write", "default", "read")
        .with_edge("read", "default", "parse")
        .with_edge("parse", "default", "log");

    let runtime = runtime();
    let report = runtime.validate(&doc);
    assert!(report.is_valid());
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    let result = runtime
        .execute(
            &doc,
            HashMap::from([("path".to_string(), json!(path.to_str().unwrap()))]),
        )
        .await
        .unwrap();

    assert_eq!(result.outputs["settings"], json!({"retries": 3}));
    assert_eq!(result.path, vec!["write", "read", "parse", "log"]);
}

#[test]
fn test_standard_registry_lists_every_node() {
    let registry = standard_registry();
    assert_eq!(
        registry.list_node_types(),
        vec![
            "debug.log",
            "echo",
            "file.read",
            "file.write",
            "http.request",
            "shell.run",
            "time.delay",
            "transform.json_parse",
            "workflow",
        ]
    );
}
