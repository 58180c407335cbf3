use crate::compiler::Compiler;
use crate::executor::{ExecutableGraph, ExecutionResult};
use crate::registry::NodeRegistry;
use crate::settings::{NoSettings, SettingsSource};
use crate::validator::ValidationReport;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use wfcore::{CompileError, CompileErrors, EventBus, FlowError, Value, ValueStore, WorkflowIr};

/// Main entry point: validate, compile and run workflow documents
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    settings: Arc<dyn SettingsSource>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
    workflows: Arc<RwLock<HashMap<String, WorkflowIr>>>,
}

impl FlowRuntime {
    /// Create a runtime with only the built-in node types
    pub fn new() -> Self {
        Self::with_registry(Arc::new(NodeRegistry::with_builtins()), RuntimeConfig::default())
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self {
            registry,
            settings: Arc::new(NoSettings),
            event_bus,
            config,
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Use a persisted settings source for input defaults
    pub fn with_settings(mut self, settings: Arc<dyn SettingsSource>) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// A compiler sharing this runtime's registry, settings and event bus
    pub fn compiler(&self) -> Compiler {
        Compiler::new(self.registry.clone())
            .with_settings(self.settings.clone())
            .with_config(self.config.clone())
            .with_event_bus(self.event_bus.clone())
    }

    /// Read and parse a workflow document from disk
    pub async fn load_document(&self, path: impl AsRef<Path>) -> Result<WorkflowIr, FlowError> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(WorkflowIr::from_json(&json)?)
    }

    /// Check a document's shape without compiling it
    pub fn validate(&self, doc: &WorkflowIr) -> ValidationReport {
        self.compiler().validate(doc)
    }

    pub fn compile(
        &self,
        doc: &WorkflowIr,
        run_args: HashMap<String, Value>,
    ) -> Result<ExecutableGraph, CompileErrors> {
        self.compiler().compile(doc, run_args)
    }

    /// Compile a fresh graph and run it
    pub async fn execute(
        &self,
        doc: &WorkflowIr,
        run_args: HashMap<String, Value>,
    ) -> Result<ExecutionResult, FlowError> {
        let graph = self.compile(doc, run_args)?;
        Ok(graph.run(None).await?)
    }

    /// Like [`FlowRuntime::execute`], with extra store entries on top of the
    /// resolved inputs
    pub async fn execute_with_store(
        &self,
        doc: &WorkflowIr,
        run_args: HashMap<String, Value>,
        initial_store: ValueStore,
    ) -> Result<ExecutionResult, FlowError> {
        let graph = self.compile(doc, run_args)?;
        Ok(graph.run(Some(initial_store)).await?)
    }

    /// Validate a document and keep it under a name for later runs
    pub async fn register_workflow(
        &self,
        name: impl Into<String>,
        doc: WorkflowIr,
    ) -> Result<ValidationReport, CompileErrors> {
        let report = self.validate(&doc);
        if !report.is_valid() {
            return Err(report
                .errors
                .into_iter()
                .map(CompileError::from)
                .collect::<Vec<_>>()
                .into());
        }
        let mut workflows = self.workflows.write().await;
        workflows.insert(name.into(), doc);
        Ok(report)
    }

    /// Execute a registered workflow by name; each call builds a new graph
    pub async fn execute_workflow(
        &self,
        name: &str,
        run_args: HashMap<String, Value>,
    ) -> Result<ExecutionResult, FlowError> {
        let doc = {
            let workflows = self.workflows.read().await;
            workflows.get(name).cloned()
        };
        let doc = doc.ok_or_else(|| FlowError::NotFound(name.to_string()))?;
        self.execute(&doc, run_args).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<wfcore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Upper bound on node visits in one run, guarding action loops
    pub max_steps: usize,
    pub max_nesting_depth: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            max_nesting_depth: 10,
            event_buffer_size: 1000,
        }
    }
}
