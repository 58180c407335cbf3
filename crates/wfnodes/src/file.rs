use crate::{output_key, output_key_param, with_output_key};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tokio::io::AsyncWriteExt;
use wfcore::value::to_text;
use wfcore::{
    Node, NodeContext, NodeError, NodeInterface, PortDefinition, TypeHint, Value, ValueStore,
    DEFAULT_ACTION,
};
use wfruntime::{BuildContext, NodeFactory, NodeMetadata};

const READ_OUTPUT: &str = "content";
const WRITE_OUTPUT: &str = "bytes_written";

fn field<'a>(prepared: &'a Value, name: &str) -> Result<&'a str, NodeError> {
    prepared
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| NodeError::MissingInput(name.to_string()))
}

/// Reads a UTF-8 file into the store.
///
/// With a `default` param, a read that still fails after every retry stores
/// the default instead of failing the node.
pub struct FileReadNode;

#[async_trait]
impl Node for FileReadNode {
    fn node_type(&self) -> &str {
        "file.read"
    }

    async fn prep(&self, ctx: &NodeContext, store: &ValueStore) -> Result<Value, NodeError> {
        let path = ctx.require_str_input("path", store)?;
        Ok(json!({ "path": path }))
    }

    async fn exec(&self, ctx: &NodeContext, prepared: &Value) -> Result<Value, NodeError> {
        let path = field(prepared, "path")?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Cannot read {}: {}", path, e)))?;

        ctx.events.info(format!("Read {} byte(s) from {}", content.len(), path));
        Ok(Value::String(content))
    }

    async fn exec_fallback(
        &self,
        ctx: &NodeContext,
        _prepared: &Value,
        error: NodeError,
    ) -> Result<Value, NodeError> {
        match ctx.params.get("default") {
            Some(default) => {
                tracing::warn!("Node '{}' using default content: {}", ctx.node_id, error);
                ctx.events.warn(format!("Using default content: {}", error));
                Ok(default.clone())
            }
            None => Err(error),
        }
    }

    async fn post(
        &self,
        ctx: &NodeContext,
        store: &mut ValueStore,
        _prepared: &Value,
        result: Value,
    ) -> Result<String, NodeError> {
        store.insert(output_key(&ctx.params, READ_OUTPUT), result);
        Ok(DEFAULT_ACTION.to_string())
    }
}

pub struct FileReadNodeFactory;

impl NodeFactory for FileReadNodeFactory {
    fn create(
        &self,
        _params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(FileReadNode))
    }

    fn node_type(&self) -> &str {
        "file.read"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Read a text file".to_string(),
            category: "file".to_string(),
            interface: NodeInterface::new()
                .with_input(PortDefinition::new("path", "File to read").typed(TypeHint::String))
                .with_output(PortDefinition::new(READ_OUTPUT, "File contents").typed(TypeHint::String))
                .with_param(PortDefinition::new("default", "Content used when the read fails").optional())
                .with_param(output_key_param(READ_OUTPUT)),
        }
    }

    fn interface_for(&self, params: &HashMap<String, Value>) -> NodeInterface {
        with_output_key(self.metadata().interface, params, READ_OUTPUT)
    }
}

/// Writes (or appends) text to a file, creating parent directories.
/// Non-string content is written as compact JSON.
pub struct FileWriteNode;

#[async_trait]
impl Node for FileWriteNode {
    fn node_type(&self) -> &str {
        "file.write"
    }

    async fn prep(&self, ctx: &NodeContext, store: &ValueStore) -> Result<Value, NodeError> {
        let path = ctx.require_str_input("path", store)?;
        let content = to_text(ctx.require_input("content", store)?);
        let append = ctx
            .params
            .get("append")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(json!({ "path": path, "content": content, "append": append }))
    }

    async fn exec(&self, ctx: &NodeContext, prepared: &Value) -> Result<Value, NodeError> {
        let path = field(prepared, "path")?;
        let content = field(prepared, "content")?;
        let append = prepared.get("append").and_then(Value::as_bool).unwrap_or(false);
        let failed = |e: std::io::Error| NodeError::ExecutionFailed(format!("Cannot write {}: {}", path, e));

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(failed)?;
            }
        }

        if append {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(failed)?;
            file.write_all(content.as_bytes()).await.map_err(failed)?;
            file.flush().await.map_err(failed)?;
        } else {
            tokio::fs::write(path, content).await.map_err(failed)?;
        }

        ctx.events.info(format!("Wrote {} byte(s) to {}", content.len(), path));
        Ok(json!(content.len()))
    }

    async fn post(
        &self,
        ctx: &NodeContext,
        store: &mut ValueStore,
        _prepared: &Value,
        result: Value,
    ) -> Result<String, NodeError> {
        store.insert(output_key(&ctx.params, WRITE_OUTPUT), result);
        Ok(DEFAULT_ACTION.to_string())
    }
}

pub struct FileWriteNodeFactory;

impl NodeFactory for FileWriteNodeFactory {
    fn create(
        &self,
        _params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(FileWriteNode))
    }

    fn node_type(&self) -> &str {
        "file.write"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Write text to a file".to_string(),
            category: "file".to_string(),
            interface: NodeInterface::new()
                .with_input(PortDefinition::new("path", "File to write").typed(TypeHint::String))
                .with_input(PortDefinition::new("content", "Text to write"))
                .with_output(
                    PortDefinition::new(WRITE_OUTPUT, "Number of bytes written").typed(TypeHint::Number),
                )
                .with_param(
                    PortDefinition::new("append", "Append instead of truncating")
                        .optional()
                        .typed(TypeHint::Boolean),
                )
                .with_param(output_key_param(WRITE_OUTPUT)),
        }
    }

    fn interface_for(&self, params: &HashMap<String, Value>) -> NodeInterface {
        with_output_key(self.metadata().interface, params, WRITE_OUTPUT)
    }
}
