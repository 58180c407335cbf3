use async_trait::async_trait;
use std::collections::HashMap;
use wfcore::{Node, NodeContext, NodeError, NodeInterface, PortDefinition, Value, ValueStore, DEFAULT_ACTION};
use wfruntime::{BuildContext, NodeFactory, NodeMetadata};

/// Records its resolved params in the store: each under its own key, and all
/// of them together under `echo`.
pub struct EchoNode;

#[async_trait]
impl Node for EchoNode {
    fn node_type(&self) -> &str {
        "echo"
    }

    async fn exec(&self, ctx: &NodeContext, prepared: &Value) -> Result<Value, NodeError> {
        ctx.events.info(format!("Echoing {} param(s)", ctx.params.len()));
        Ok(prepared.clone())
    }

    async fn post(
        &self,
        _ctx: &NodeContext,
        store: &mut ValueStore,
        _prepared: &Value,
        result: Value,
    ) -> Result<String, NodeError> {
        if let Value::Object(params) = &result {
            for (key, value) in params {
                store.insert(key.clone(), value.clone());
            }
        }
        store.insert("echo", result);
        Ok(DEFAULT_ACTION.to_string())
    }
}

pub struct EchoNodeFactory;

impl NodeFactory for EchoNodeFactory {
    fn create(
        &self,
        _params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(EchoNode))
    }

    fn node_type(&self) -> &str {
        "echo"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Record params in the value store".to_string(),
            category: "debug".to_string(),
            interface: NodeInterface::new()
                .with_output(PortDefinition::new("echo", "All params as one object")),
        }
    }

    fn interface_for(&self, params: &HashMap<String, Value>) -> NodeInterface {
        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();
        keys.into_iter().fold(self.metadata().interface, |interface, key| {
            interface.with_output(PortDefinition::new(key, "Echoed param"))
        })
    }
}
