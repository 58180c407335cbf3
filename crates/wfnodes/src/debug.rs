use async_trait::async_trait;
use std::collections::HashMap;
use wfcore::value::to_text;
use wfcore::{Node, NodeContext, NodeError, NodeInterface, PortDefinition, Value};
use wfruntime::{BuildContext, NodeFactory, NodeMetadata};

/// Simple debug node that logs its params
pub struct DebugNode;

#[async_trait]
impl Node for DebugNode {
    fn node_type(&self) -> &str {
        "debug.log"
    }

    async fn exec(&self, ctx: &NodeContext, _prepared: &Value) -> Result<Value, NodeError> {
        let message = ctx.param_str("message").unwrap_or("(no message)");

        tracing::info!("[{}] {}", ctx.node_id, message);
        ctx.events.info(format!("DEBUG: {}", message));

        let mut keys: Vec<&String> = ctx.params.keys().filter(|k| k.as_str() != "message").collect();
        keys.sort();
        for key in keys {
            ctx.events.info(format!("  {}: {}", key, to_text(&ctx.params[key])));
        }

        Ok(Value::Null)
    }
}

pub struct DebugNodeFactory;

impl NodeFactory for DebugNodeFactory {
    fn create(
        &self,
        _params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DebugNode))
    }

    fn node_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Logs param values for debugging".to_string(),
            category: "debug".to_string(),
            interface: NodeInterface::new()
                .with_param(PortDefinition::new("message", "Message to log").optional()),
        }
    }
}
