//! Workflows used as nodes of other workflows.
//!
//! The generic `workflow` type takes its document inline (`workflow`) or from
//! disk (`path`) and its child inputs from `param_mapping`. Types registered
//! by a directory scan carry their document and take every param as a child
//! input. Both accept `output_mapping` (child key → parent key).

use crate::compiler::Compiler;
use crate::registry::{BuildContext, NodeFactory, NodeMetadata, NodeRegistry};
use crate::runtime::RuntimeConfig;
use async_trait::async_trait;
use serde_json::{json, Map};
use std::collections::HashMap;
use std::sync::Arc;
use wfcore::{
    EventBus, Node, NodeContext, NodeError, NodeInterface, PortDefinition, TypeHint, Value,
    ValueStore, WorkflowIr, DEFAULT_ACTION,
};

const WORKFLOW_TYPE: &str = "workflow";
const OUTPUT_MAPPING: &str = "output_mapping";

enum DocumentSource {
    Inline(Arc<WorkflowIr>),
    Path,
}

pub struct WorkflowNode {
    node_type: String,
    source: DocumentSource,
    named: bool,
    registry: Arc<NodeRegistry>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
}

impl WorkflowNode {
    async fn document(&self, ctx: &NodeContext) -> Result<Arc<WorkflowIr>, NodeError> {
        match &self.source {
            DocumentSource::Inline(doc) => Ok(doc.clone()),
            DocumentSource::Path => {
                let path = ctx
                    .param_str("path")
                    .ok_or_else(|| NodeError::Configuration("'path' must be a string".to_string()))?;
                let json = tokio::fs::read_to_string(path).await.map_err(|e| {
                    NodeError::Configuration(format!("Cannot read workflow {}: {}", path, e))
                })?;
                WorkflowIr::from_json(&json)
                    .map(Arc::new)
                    .map_err(|e| NodeError::Configuration(format!("Invalid workflow {}: {}", path, e)))
            }
        }
    }
}

#[async_trait]
impl Node for WorkflowNode {
    fn node_type(&self) -> &str {
        &self.node_type
    }

    async fn prep(&self, ctx: &NodeContext, _store: &ValueStore) -> Result<Value, NodeError> {
        let args: Map<String, Value> = if self.named {
            ctx.params
                .iter()
                .filter(|(k, _)| k.as_str() != OUTPUT_MAPPING)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            match ctx.params.get("param_mapping") {
                Some(Value::Object(mapping)) => mapping.clone(),
                Some(_) => {
                    return Err(NodeError::Configuration(
                        "'param_mapping' must be an object".to_string(),
                    ))
                }
                None => Map::new(),
            }
        };
        Ok(Value::Object(args))
    }

    async fn exec(&self, ctx: &NodeContext, prepared: &Value) -> Result<Value, NodeError> {
        let doc = self.document(ctx).await?;
        let args: HashMap<String, Value> = prepared
            .as_object()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let mut graph = Compiler::new(self.registry.clone())
            .with_config(self.config.clone())
            .with_event_bus(self.event_bus.clone())
            .with_depth(ctx.depth + 1)
            .compile(&doc, args)
            .map_err(|e| NodeError::ExecutionFailed(e.to_string()))?;
        graph.link_cancellation(&ctx.cancellation);

        ctx.events.info(format!(
            "Running nested workflow at depth {}",
            ctx.depth + 1
        ));
        let result = graph
            .run(None)
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Nested workflow failed: {}", e)))?;

        let declared = !doc.outputs.is_empty();
        let values: Map<String, Value> = if declared {
            result.outputs.into_iter().collect()
        } else {
            result.store.into_inner().into_iter().collect()
        };
        Ok(json!({ "values": values, "declared": declared }))
    }

    async fn post(
        &self,
        ctx: &NodeContext,
        store: &mut ValueStore,
        _prepared: &Value,
        result: Value,
    ) -> Result<String, NodeError> {
        let values = result
            .get("values")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let declared = result
            .get("declared")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        match ctx.params.get(OUTPUT_MAPPING) {
            Some(Value::Object(mapping)) => {
                for (child_key, parent_key) in mapping {
                    let parent_key = parent_key.as_str().ok_or_else(|| {
                        NodeError::Configuration(format!(
                            "output_mapping target for '{}' must be a string",
                            child_key
                        ))
                    })?;
                    match values.get(child_key) {
                        Some(value) => {
                            store.insert(parent_key, value.clone());
                        }
                        None => {
                            tracing::warn!(
                                "Nested workflow in '{}' did not produce '{}'",
                                ctx.node_id,
                                child_key
                            );
                            ctx.events
                                .warn(format!("Nested workflow did not produce '{}'", child_key));
                        }
                    }
                }
            }
            Some(_) => {
                return Err(NodeError::Configuration(
                    "'output_mapping' must be an object".to_string(),
                ))
            }
            None if declared => store.extend(values),
            None => {
                store.insert(ctx.node_id.clone(), Value::Object(values));
            }
        }

        Ok(DEFAULT_ACTION.to_string())
    }
}

/// Factory for workflow-backed node types
pub struct WorkflowNodeFactory {
    name: String,
    document: Option<Arc<WorkflowIr>>,
}

impl WorkflowNodeFactory {
    /// The built-in `workflow` type
    pub fn generic() -> Self {
        Self {
            name: WORKFLOW_TYPE.to_string(),
            document: None,
        }
    }

    /// A node type backed by a fixed document
    pub fn named(name: impl Into<String>, document: WorkflowIr) -> Self {
        Self {
            name: name.into(),
            document: Some(Arc::new(document)),
        }
    }

    fn declared_interface(doc: &WorkflowIr) -> NodeInterface {
        let inputs = doc.inputs.iter().map(|(name, input)| {
            let mut port = PortDefinition::new(name, input.description.clone().unwrap_or_default());
            port.required = input.required && input.default.is_none();
            port.type_hint = input.type_hint;
            port
        });
        let outputs = doc.outputs.iter().map(|(name, output)| {
            let mut port = PortDefinition::new(name, output.description.clone().unwrap_or_default());
            port.type_hint = output.type_hint;
            port
        });
        NodeInterface {
            inputs: inputs.collect(),
            outputs: outputs.collect(),
            params: Vec::new(),
        }
    }
}

impl NodeFactory for WorkflowNodeFactory {
    fn create(
        &self,
        params: &HashMap<String, Value>,
        build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        let source = match (&self.document, params.get("workflow"), params.get("path")) {
            (Some(doc), _, _) => DocumentSource::Inline(doc.clone()),
            (None, Some(inline), _) => {
                let doc = WorkflowIr::from_value(inline.clone()).map_err(|e| {
                    NodeError::Configuration(format!("Invalid inline workflow: {}", e))
                })?;
                DocumentSource::Inline(Arc::new(doc))
            }
            (None, None, Some(_)) => DocumentSource::Path,
            (None, None, None) => {
                return Err(NodeError::Configuration(
                    "A workflow node needs a 'workflow' or 'path' param".to_string(),
                ))
            }
        };

        Ok(Box::new(WorkflowNode {
            node_type: self.name.clone(),
            source,
            named: self.document.is_some(),
            registry: build.registry.clone(),
            event_bus: build.event_bus.clone(),
            config: build.config.clone(),
        }))
    }

    fn node_type(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> NodeMetadata {
        let mapping = PortDefinition::new(OUTPUT_MAPPING, "Child output key to parent store key")
            .optional()
            .typed(TypeHint::Object);

        match &self.document {
            Some(doc) => NodeMetadata {
                description: format!("Run the '{}' workflow", self.name),
                category: "workflow".to_string(),
                interface: Self::declared_interface(doc).with_param(mapping),
            },
            None => NodeMetadata {
                description: "Run another workflow as a single step".to_string(),
                category: "workflow".to_string(),
                interface: NodeInterface::new()
                    .with_param(
                        PortDefinition::new("workflow", "Inline workflow document")
                            .optional()
                            .typed(TypeHint::Object),
                    )
                    .with_param(
                        PortDefinition::new("path", "Path to a workflow document")
                            .optional()
                            .typed(TypeHint::String),
                    )
                    .with_param(
                        PortDefinition::new("param_mapping", "Child input name to value")
                            .optional()
                            .typed(TypeHint::Object),
                    )
                    .with_param(mapping),
            },
        }
    }

    fn interface_for(&self, params: &HashMap<String, Value>) -> NodeInterface {
        let mut interface = self.metadata().interface;

        if let Some(Value::Object(mapping)) = params.get(OUTPUT_MAPPING) {
            interface.outputs = mapping
                .values()
                .filter_map(Value::as_str)
                .map(|key| PortDefinition::new(key, "Mapped from nested workflow"))
                .collect();
        } else if self.document.is_none() {
            if let Some(doc) = params
                .get("workflow")
                .and_then(|v| WorkflowIr::from_value(v.clone()).ok())
            {
                interface.outputs = Self::declared_interface(&doc).outputs;
            }
        }
        interface
    }

    fn verbatim_params(&self) -> &[&str] {
        if self.document.is_none() {
            &["workflow"]
        } else {
            &[]
        }
    }
}
