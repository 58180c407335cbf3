use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Action label used when an edge or a node's post phase names none.
pub const DEFAULT_ACTION: &str = "default";

/// Identifier of a node within one workflow document.
pub type NodeId = String;

/// A declarative workflow document: the unit of compilation.
///
/// Unknown top-level fields are ignored on deserialization, and documents
/// without `inputs`/`outputs` are accepted as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowIr {
    #[serde(default)]
    pub format_version: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, DeclaredInput>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, DeclaredOutput>,

    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    #[serde(default)]
    pub edges: Vec<Edge>,

    /// Explicit entry node. When absent the compiler picks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node: Option<NodeId>,
}

impl WorkflowIr {
    pub fn new(format_version: impl Into<String>) -> Self {
        Self {
            format_version: format_version.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    /// Connect two nodes on the default action.
    pub fn connect(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.connect_on(from, DEFAULT_ACTION, to);
    }

    pub fn connect_on(
        &mut self,
        from: impl Into<String>,
        action: impl Into<String>,
        to: impl Into<String>,
    ) {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            action: action.into(),
        });
    }

    pub fn with_edge(mut self, from: &str, action: &str, to: &str) -> Self {
        self.connect_on(from, action, to);
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, input: DeclaredInput) -> Self {
        self.inputs.insert(name.into(), input);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, output: DeclaredOutput) -> Self {
        self.outputs.insert(name.into(), output);
        self
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The node execution starts at: `start_node` if set, otherwise the first
    /// node without incoming edges, otherwise the first node.
    pub fn entry_node(&self) -> Option<&NodeSpec> {
        if let Some(start) = &self.start_node {
            return self.find_node(start);
        }
        self.nodes
            .iter()
            .find(|n| !self.edges.iter().any(|e| e.to == n.id))
            .or_else(|| self.nodes.first())
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,

    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default)]
    pub params: HashMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Per-attempt limit on the exec phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            params: HashMap::new(),
            retry: None,
            timeout_ms: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, delay_ms: u64) -> Self {
        self.retry = Some(RetryPolicy::new(max_attempts, delay_ms));
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Directed, action-labeled connection between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default = "default_action")]
    pub action: String,
}

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

/// Retry policy for a node's exec phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff() -> f64 {
    1.0
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
            backoff_multiplier: 1.0,
        }
    }

    pub fn with_backoff(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Attempts actually made; a zero configuration still runs once.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20) as i32;
        let multiplier = if self.backoff_multiplier.is_finite() && self.backoff_multiplier > 0.0 {
            self.backoff_multiplier.powi(exponent)
        } else {
            1.0
        };
        Duration::from_millis((self.delay_ms as f64 * multiplier) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

/// Documentation-level type hint for declared inputs and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeHint {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl TypeHint {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            TypeHint::String => value.is_string(),
            TypeHint::Number => value.is_number(),
            TypeHint::Boolean => value.is_boolean(),
            TypeHint::Object => value.is_object(),
            TypeHint::Array => value.is_array(),
        }
    }

    /// Interpret a raw string (e.g. a persisted setting) as this type.
    pub fn coerce_str(&self, raw: &str) -> Option<Value> {
        match self {
            TypeHint::String => Some(Value::String(raw.to_string())),
            TypeHint::Number => serde_json::from_str::<serde_json::Number>(raw.trim())
                .ok()
                .map(Value::Number),
            TypeHint::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(Value::Bool(true)),
                "false" | "0" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            TypeHint::Object | TypeHint::Array => serde_json::from_str::<Value>(raw)
                .ok()
                .filter(|v| self.matches(v)),
        }
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeHint::String => "string",
            TypeHint::Number => "number",
            TypeHint::Boolean => "boolean",
            TypeHint::Object => "object",
            TypeHint::Array => "array",
        };
        f.write_str(name)
    }
}

/// An input the workflow consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<TypeHint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_required() -> bool {
    true
}

impl DeclaredInput {
    pub fn required(type_hint: TypeHint) -> Self {
        Self {
            description: None,
            required: true,
            type_hint: Some(type_hint),
            default: None,
        }
    }

    pub fn optional(type_hint: TypeHint) -> Self {
        Self {
            required: false,
            ..Self::required(type_hint)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// An output the workflow promises to produce in its value store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclaredOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<TypeHint>,
}

impl DeclaredOutput {
    pub fn new(type_hint: TypeHint) -> Self {
        Self {
            description: None,
            type_hint: Some(type_hint),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
