use crate::ir::{NodeId, TypeHint, DEFAULT_ACTION};
use crate::{events::EventEmitter, NodeError, Value, ValueStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Core trait that all executable nodes implement.
///
/// The engine drives each node through `prep` → `exec` → `post`. Only `exec`
/// is retried, always with the value `prep` returned.
#[async_trait]
pub trait Node: Send + Sync {
    /// Type identifier this instance was built from (e.g. "file.read")
    fn node_type(&self) -> &str;

    /// Gather exec inputs from resolved params and the value store.
    async fn prep(&self, ctx: &NodeContext, _store: &ValueStore) -> Result<Value, NodeError> {
        Ok(Value::Object(
            ctx.params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ))
    }

    /// Perform the node's effect. Must not touch the value store.
    async fn exec(&self, ctx: &NodeContext, prepared: &Value) -> Result<Value, NodeError>;

    /// Called once every exec attempt has failed. Returning `Ok` substitutes
    /// a result; the default re-raises the last error.
    async fn exec_fallback(
        &self,
        _ctx: &NodeContext,
        _prepared: &Value,
        error: NodeError,
    ) -> Result<Value, NodeError> {
        Err(error)
    }

    /// Write results into the store and pick the next edge.
    async fn post(
        &self,
        _ctx: &NodeContext,
        _store: &mut ValueStore,
        _prepared: &Value,
        _result: Value,
    ) -> Result<String, NodeError> {
        Ok(DEFAULT_ACTION.to_string())
    }
}

/// Lifecycle phase of a node, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePhase {
    Prep,
    Exec,
    Post,
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodePhase::Prep => "prep",
            NodePhase::Exec => "exec",
            NodePhase::Post => "post",
        })
    }
}

/// Execution context passed to each lifecycle phase
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: NodeId,

    pub node_type: String,

    /// Params with every template reference already resolved
    pub params: HashMap<String, Value>,

    /// Nesting level; 0 for a top-level workflow
    pub depth: usize,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancellation token of the surrounding run
    pub cancellation: CancellationToken,
}

impl NodeContext {
    pub fn new(node_id: impl Into<NodeId>, node_type: impl Into<String>, events: EventEmitter) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            params: HashMap::new(),
            depth: 0,
            events,
            cancellation: CancellationToken::new(),
        }
    }

    /// Context whose events go nowhere, for driving a node directly.
    pub fn detached(node_id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let events = EventEmitter::detached(node_id.clone());
        Self::new(node_id, node_type, events)
    }

    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn require_param(&self, name: &str) -> Result<&Value, NodeError> {
        self.params
            .get(name)
            .ok_or_else(|| NodeError::Configuration(format!("Missing param: {}", name)))
    }

    pub fn param_or(&self, name: &str, default: Value) -> Value {
        self.params.get(name).cloned().unwrap_or(default)
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    /// Look up an input by name: params first, then the value store.
    pub fn input<'a>(&'a self, name: &str, store: &'a ValueStore) -> Option<&'a Value> {
        self.params.get(name).or_else(|| store.get(name))
    }

    pub fn require_input<'a>(
        &'a self,
        name: &str,
        store: &'a ValueStore,
    ) -> Result<&'a Value, NodeError> {
        self.input(name, store)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    pub fn require_str_input<'a>(
        &'a self,
        name: &str,
        store: &'a ValueStore,
    ) -> Result<&'a str, NodeError> {
        let value = self.require_input(name, store)?;
        value.as_str().ok_or_else(|| NodeError::InvalidInputType {
            field: name.to_string(),
            expected: "string".to_string(),
            actual: crate::value::type_name(value).to_string(),
        })
    }
}

/// One named key in a node's interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<TypeHint>,
}

impl PortDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
            type_hint: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn typed(mut self, type_hint: TypeHint) -> Self {
        self.type_hint = Some(type_hint);
        self
    }
}

/// Declared interface of a node type: what it reads, writes and accepts as
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInterface {
    #[serde(default)]
    pub inputs: Vec<PortDefinition>,
    #[serde(default)]
    pub outputs: Vec<PortDefinition>,
    #[serde(default)]
    pub params: Vec<PortDefinition>,
}

impl NodeInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, port: PortDefinition) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, port: PortDefinition) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn with_param(mut self, port: PortDefinition) -> Self {
        self.params.push(port);
        self
    }

    /// Keys this node type writes to the value store.
    pub fn writes(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|p| p.name.as_str())
    }

    pub fn writes_key(&self, key: &str) -> bool {
        self.outputs.iter().any(|p| p.name == key)
    }

    pub fn reads(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|p| p.name.as_str())
    }
}
