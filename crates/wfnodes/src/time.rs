use async_trait::async_trait;
use std::collections::HashMap;
use tokio::time::{sleep, Duration};
use wfcore::{Node, NodeContext, NodeError, NodeInterface, PortDefinition, TypeHint, Value};
use wfruntime::{BuildContext, NodeFactory, NodeMetadata};

/// Delay execution for a specified duration
pub struct DelayNode;

#[async_trait]
impl Node for DelayNode {
    fn node_type(&self) -> &str {
        "time.delay"
    }

    async fn exec(&self, ctx: &NodeContext, _prepared: &Value) -> Result<Value, NodeError> {
        let delay_ms = ctx
            .params
            .get("delay_ms")
            .and_then(Value::as_u64)
            .unwrap_or(1000); // Default to 1 second if not specified

        ctx.events.info(format!("Delaying for {}ms", delay_ms));

        tokio::select! {
            _ = sleep(Duration::from_millis(delay_ms)) => Ok(Value::Null),
            _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
        }
    }
}

pub struct DelayNodeFactory;

impl NodeFactory for DelayNodeFactory {
    fn create(
        &self,
        _params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DelayNode))
    }

    fn node_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
            interface: NodeInterface::new().with_param(
                PortDefinition::new("delay_ms", "Milliseconds to wait (default 1000)")
                    .optional()
                    .typed(TypeHint::Number),
            ),
        }
    }
}
