use crate::executor::{CompiledNode, ExecutableGraph};
use crate::precedence::{resolve_defaults, ResolvedInputs};
use crate::registry::{BuildContext, NodeRegistry};
use crate::runtime::RuntimeConfig;
use crate::settings::{load_or_empty, NoSettings, SettingsSource};
use crate::validator::{ValidationReport, Validator};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wfcore::{
    CompileError, CompileErrors, ErrorKind, EventBus, Value, ValidationError, WorkflowIr,
};

/// Turns validated workflow documents into executable graphs.
///
/// Every phase collects all of its errors before failing, so one compile
/// reports every problem an author has to fix.
#[derive(Clone)]
pub struct Compiler {
    registry: Arc<NodeRegistry>,
    settings: Arc<dyn SettingsSource>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
    depth: usize,
}

impl Compiler {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        let config = RuntimeConfig::default();
        Self {
            registry,
            settings: Arc::new(NoSettings),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            config,
            depth: 0,
        }
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsSource>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Compile as a workflow nested `depth` levels deep
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Validation only, without run-time arguments or settings
    pub fn validate(&self, doc: &WorkflowIr) -> ValidationReport {
        Validator::new(&self.registry).validate(doc)
    }

    pub fn compile(
        &self,
        doc: &WorkflowIr,
        run_args: HashMap<String, Value>,
    ) -> Result<ExecutableGraph, CompileErrors> {
        if self.depth > self.config.max_nesting_depth {
            return Err(vec![CompileError::NestingTooDeep(self.config.max_nesting_depth)].into());
        }

        let report = self.validate(doc);
        for warning in &report.warnings {
            tracing::warn!("{}", warning);
        }
        // Contract errors ride along with later phases; structural ones stop here.
        let structural = report
            .errors
            .iter()
            .any(|e| e.kind() == ErrorKind::Structural);
        let mut errors: Vec<CompileError> = report
            .errors
            .iter()
            .cloned()
            .map(CompileError::from)
            .collect();
        if structural {
            return Err(errors.into());
        }

        let (input_errors, resolved) = self.resolve_inputs(doc, &run_args);
        errors.extend(input_errors);

        let (graph, index) = self.bind_nodes(doc, &mut errors);
        let graph = self.wire_edges(doc, graph, &index, &mut errors);

        if !errors.is_empty() {
            return Err(errors.into());
        }

        let entry = doc
            .entry_node()
            .and_then(|spec| index.get(spec.id.as_str()).copied())
            .ok_or_else(|| CompileErrors(vec![ValidationError::NoNodes.into()]))?;

        // Undeclared run-time arguments still reach the store.
        let mut inputs = run_args;
        inputs.extend(resolved.values);

        tracing::info!(
            "Compiled workflow with {} node(s), entry '{}'",
            graph.node_count(),
            graph[entry].id
        );

        Ok(ExecutableGraph {
            graph,
            entry,
            inputs,
            outputs: doc.outputs.clone(),
            warnings: report.warnings,
            event_bus: self.event_bus.clone(),
            cancellation: CancellationToken::new(),
            config: self.config.clone(),
            depth: self.depth,
        })
    }

    fn resolve_inputs(
        &self,
        doc: &WorkflowIr,
        run_args: &HashMap<String, Value>,
    ) -> (Vec<CompileError>, ResolvedInputs) {
        let needs_settings = doc.inputs.keys().any(|name| !run_args.contains_key(name));
        let settings = if needs_settings {
            load_or_empty(self.settings.as_ref())
        } else {
            HashMap::new()
        };

        let (errors, resolved) = resolve_defaults(&doc.inputs, run_args, &settings);
        for (name, source) in &resolved.sources {
            tracing::debug!("Input '{}' resolved from {:?}", name, source);
        }
        (errors, resolved)
    }

    fn bind_nodes<'d>(
        &self,
        doc: &'d WorkflowIr,
        errors: &mut Vec<CompileError>,
    ) -> (DiGraph<CompiledNode, String>, HashMap<&'d str, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for spec in &doc.nodes {
            let factory = match self.registry.resolve(&spec.node_type) {
                Ok(factory) => factory,
                Err(_) => {
                    errors.push(
                        ValidationError::UnknownNodeType {
                            node_id: spec.id.clone(),
                            node_type: spec.node_type.clone(),
                        }
                        .into(),
                    );
                    continue;
                }
            };

            let build = BuildContext {
                node_id: &spec.id,
                registry: &self.registry,
                event_bus: &self.event_bus,
                config: &self.config,
            };

            match factory.create(&spec.params, &build) {
                Ok(instance) => {
                    let node = CompiledNode {
                        id: spec.id.clone(),
                        node_type: spec.node_type.clone(),
                        params: spec.params.clone(),
                        verbatim_params: factory
                            .verbatim_params()
                            .iter()
                            .map(|p| p.to_string())
                            .collect(),
                        retry: spec
                            .retry
                            .clone()
                            .unwrap_or_else(|| factory.default_retry_policy()),
                        timeout_ms: spec.timeout_ms,
                        instance,
                    };
                    index.insert(spec.id.as_str(), graph.add_node(node));
                }
                Err(e) => errors.push(CompileError::NodeConstruction {
                    node_id: spec.id.clone(),
                    node_type: spec.node_type.clone(),
                    message: e.to_string(),
                }),
            }
        }

        (graph, index)
    }

    fn wire_edges(
        &self,
        doc: &WorkflowIr,
        mut graph: DiGraph<CompiledNode, String>,
        index: &HashMap<&str, NodeIndex>,
        errors: &mut Vec<CompileError>,
    ) -> DiGraph<CompiledNode, String> {
        let mut routes = HashSet::new();
        for edge in &doc.edges {
            if !routes.insert((edge.from.as_str(), edge.action.as_str())) {
                errors.push(
                    ValidationError::DuplicateAction {
                        from: edge.from.clone(),
                        action: edge.action.clone(),
                    }
                    .into(),
                );
                continue;
            }
            // Endpoints that failed to bind were already reported.
            if let (Some(from), Some(to)) = (index.get(edge.from.as_str()), index.get(edge.to.as_str())) {
                graph.add_edge(*from, *to, edge.action.clone());
            }
        }
        graph
    }
}
