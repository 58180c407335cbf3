#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wfcore::{
    Node, NodeContext, NodeError, NodeInterface, PortDefinition, Value, ValueStore, DEFAULT_ACTION,
};
use wfruntime::{BuildContext, NodeFactory, NodeMetadata, NodeRegistry};

/// Writes every resolved param into the store; `action` picks the next edge.
pub struct RecordNode;

#[async_trait]
impl Node for RecordNode {
    fn node_type(&self) -> &str {
        "echo"
    }

    async fn exec(&self, ctx: &NodeContext, _prepared: &Value) -> Result<Value, NodeError> {
        Ok(json!(ctx.params))
    }

    async fn post(
        &self,
        ctx: &NodeContext,
        store: &mut ValueStore,
        _prepared: &Value,
        result: Value,
    ) -> Result<String, NodeError> {
        if let Value::Object(map) = result {
            for (key, value) in map {
                if key != "action" {
                    store.insert(key, value);
                }
            }
        }
        Ok(ctx
            .param_str("action")
            .unwrap_or(DEFAULT_ACTION)
            .to_string())
    }
}

pub struct RecordFactory;

impl NodeFactory for RecordFactory {
    fn create(
        &self,
        _params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(RecordNode))
    }

    fn node_type(&self) -> &str {
        "echo"
    }

    fn interface_for(&self, params: &HashMap<String, Value>) -> NodeInterface {
        params
            .keys()
            .filter(|k| k.as_str() != "action")
            .fold(NodeInterface::new(), |interface, key| {
                interface.with_output(PortDefinition::new(key, "Recorded param"))
            })
    }
}

/// Fails its first `failures` exec attempts, counting every attempt.
pub struct FlakyNode {
    attempts: Arc<AtomicUsize>,
    failures: usize,
    recover: bool,
}

#[async_trait]
impl Node for FlakyNode {
    fn node_type(&self) -> &str {
        "flaky"
    }

    async fn exec(&self, _ctx: &NodeContext, _prepared: &Value) -> Result<Value, NodeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            Err(NodeError::ExecutionFailed(format!("attempt {} failed", attempt)))
        } else {
            Ok(json!(attempt))
        }
    }

    async fn exec_fallback(
        &self,
        _ctx: &NodeContext,
        _prepared: &Value,
        error: NodeError,
    ) -> Result<Value, NodeError> {
        if self.recover {
            Ok(json!("recovered"))
        } else {
            Err(error)
        }
    }

    async fn post(
        &self,
        ctx: &NodeContext,
        store: &mut ValueStore,
        _prepared: &Value,
        result: Value,
    ) -> Result<String, NodeError> {
        store.insert(ctx.node_id.clone(), result);
        Ok(DEFAULT_ACTION.to_string())
    }
}

pub struct FlakyFactory {
    pub attempts: Arc<AtomicUsize>,
    pub failures: usize,
    pub recover: bool,
}

impl FlakyFactory {
    pub fn failing_always(attempts: Arc<AtomicUsize>) -> Self {
        Self {
            attempts,
            failures: usize::MAX,
            recover: false,
        }
    }
}

impl NodeFactory for FlakyFactory {
    fn create(
        &self,
        _params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(FlakyNode {
            attempts: self.attempts.clone(),
            failures: self.failures,
            recover: self.recover,
        }))
    }

    fn node_type(&self) -> &str {
        "flaky"
    }
}

/// Sleeps for `millis`, honouring cancellation.
pub struct SleepNode;

#[async_trait]
impl Node for SleepNode {
    fn node_type(&self) -> &str {
        "sleep"
    }

    async fn exec(&self, ctx: &NodeContext, _prepared: &Value) -> Result<Value, NodeError> {
        let millis = ctx.params.get("millis").and_then(Value::as_u64).unwrap_or(0);
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(millis)) => Ok(Value::Null),
            _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
        }
    }
}

pub struct SleepFactory;

impl NodeFactory for SleepFactory {
    fn create(
        &self,
        _params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SleepNode))
    }

    fn node_type(&self) -> &str {
        "sleep"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Sleep for a while".to_string(),
            category: "test".to_string(),
            interface: NodeInterface::new(),
        }
    }
}

pub fn test_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::with_builtins();
    registry.register(Arc::new(RecordFactory));
    registry.register(Arc::new(SleepFactory));
    registry
}

pub fn args(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
