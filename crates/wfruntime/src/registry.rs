use crate::runtime::RuntimeConfig;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use wfcore::{EventBus, Node, NodeError, NodeInterface, RetryPolicy, Value};

/// Everything a factory may need while building a node instance.
pub struct BuildContext<'a> {
    /// Id of the node being built
    pub node_id: &'a str,

    /// Registry the node was resolved from; nested workflows compile against it
    pub registry: &'a Arc<NodeRegistry>,

    /// Bus of the enclosing run; nested workflows publish to it
    pub event_bus: &'a Arc<EventBus>,

    pub config: &'a RuntimeConfig,
}

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a new instance of the node with its (unresolved) params
    fn create(
        &self,
        params: &HashMap<String, Value>,
        build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError>;

    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Description, category and declared interface
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }

    /// Interface of one configured instance. Most node types declare a fixed
    /// interface; types whose writes depend on params override this.
    fn interface_for(&self, _params: &HashMap<String, Value>) -> NodeInterface {
        self.metadata().interface
    }

    /// Params handed to the node verbatim instead of being template-resolved
    fn verbatim_params(&self) -> &[&str] {
        &[]
    }

    /// Retry policy used when a node spec does not declare one
    fn default_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

/// Metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
    pub interface: NodeInterface,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            interface: NodeInterface::default(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown node type: {0}")]
pub struct UnknownNodeType(pub String);

/// Registry of available node types.
///
/// Built once at startup and shared behind an `Arc`; only an explicit
/// [`NodeRegistry::rescan`] changes its contents afterwards.
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
    scanned: HashSet<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            scanned: HashSet::new(),
        }
    }

    /// Registry pre-populated with the node types the runtime itself provides
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::nested::WorkflowNodeFactory::generic()));
        registry
    }

    /// Register a node factory, replacing any previous one of the same type
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        if self.factories.contains_key(&node_type) {
            tracing::warn!("Replacing registration for node type: {}", node_type);
        } else {
            tracing::debug!("Registering node type: {}", node_type);
        }
        self.scanned.remove(&node_type);
        self.factories.insert(node_type, factory);
    }

    /// Register a factory discovered by a directory scan
    pub(crate) fn register_scanned(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        self.register(factory);
        self.scanned.insert(node_type);
    }

    /// Drop every node type that came from a directory scan
    pub(crate) fn clear_scanned(&mut self) {
        for node_type in self.scanned.drain() {
            self.factories.remove(&node_type);
        }
    }

    /// Exact, case-sensitive lookup of a node type
    pub fn resolve(&self, node_type: &str) -> Result<&Arc<dyn NodeFactory>, UnknownNodeType> {
        self.factories
            .get(node_type)
            .ok_or_else(|| UnknownNodeType(node_type.to_string()))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Declared interface of a node type
    pub fn interface_of(&self, node_type: &str) -> Result<NodeInterface, UnknownNodeType> {
        self.resolve(node_type).map(|f| f.metadata().interface)
    }

    /// Interface of a node type as configured by a particular set of params
    pub fn interface_for(
        &self,
        node_type: &str,
        params: &HashMap<String, Value>,
    ) -> Result<NodeInterface, UnknownNodeType> {
        self.resolve(node_type).map(|f| f.interface_for(params))
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.factories.get(node_type).map(|f| f.metadata())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
