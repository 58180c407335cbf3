//! Workflow compilation and execution runtime
//!
//! This crate turns workflow documents into executable graphs and runs them:
//! the node registry, the validator, input precedence, the template resolver
//! and the action-routed executor.

mod compiler;
mod executor;
mod loader;
mod nested;
mod precedence;
mod registry;
mod runtime;
mod settings;
pub mod template;
mod validator;

pub use compiler::Compiler;
pub use executor::{CompiledNode, ExecutableGraph, ExecutionResult};
pub use loader::{LoaderError, WorkflowLoader};
pub use nested::{WorkflowNode, WorkflowNodeFactory};
pub use precedence::{resolve_defaults, InputSource, ResolvedInputs};
pub use registry::{BuildContext, NodeFactory, NodeMetadata, NodeRegistry, UnknownNodeType};
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use settings::{
    load_or_empty, JsonFileSettings, NoSettings, SettingsError, SettingsSource, StaticSettings,
};
pub use validator::{is_identifier, validate, ValidationReport, ValidationWarning, Validator};
