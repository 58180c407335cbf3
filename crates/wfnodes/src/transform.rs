use crate::{output_key, output_key_param, with_output_key};
use async_trait::async_trait;
use std::collections::HashMap;
use wfcore::{
    Node, NodeContext, NodeError, NodeInterface, PortDefinition, TypeHint, Value, ValueStore,
    DEFAULT_ACTION,
};
use wfruntime::{BuildContext, NodeFactory, NodeMetadata};

const PARSE_OUTPUT: &str = "parsed";

/// Parse a JSON string into a structured value
pub struct JsonParseNode;

#[async_trait]
impl Node for JsonParseNode {
    fn node_type(&self) -> &str {
        "transform.json_parse"
    }

    async fn prep(&self, ctx: &NodeContext, store: &ValueStore) -> Result<Value, NodeError> {
        let input = ctx.require_str_input("json", store)?;
        Ok(Value::String(input.to_string()))
    }

    async fn exec(&self, _ctx: &NodeContext, prepared: &Value) -> Result<Value, NodeError> {
        let input = prepared.as_str().unwrap_or_default();
        serde_json::from_str(input)
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))
    }

    async fn post(
        &self,
        ctx: &NodeContext,
        store: &mut ValueStore,
        _prepared: &Value,
        result: Value,
    ) -> Result<String, NodeError> {
        store.insert(output_key(&ctx.params, PARSE_OUTPUT), result);
        Ok(DEFAULT_ACTION.to_string())
    }
}

pub struct JsonParseNodeFactory;

impl NodeFactory for JsonParseNodeFactory {
    fn create(
        &self,
        _params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(JsonParseNode))
    }

    fn node_type(&self) -> &str {
        "transform.json_parse"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Parse JSON string".to_string(),
            category: "transform".to_string(),
            interface: NodeInterface::new()
                .with_input(PortDefinition::new("json", "JSON text").typed(TypeHint::String))
                .with_output(PortDefinition::new(PARSE_OUTPUT, "Parsed value"))
                .with_param(output_key_param(PARSE_OUTPUT)),
        }
    }

    fn interface_for(&self, params: &HashMap<String, Value>) -> NodeInterface {
        with_output_key(self.metadata().interface, params, PARSE_OUTPUT)
    }
}
