//! Core abstractions for the workflow engine
//!
//! This crate provides the IR document model, the node lifecycle contract,
//! the shared value store and the error taxonomy that every other crate
//! depends on. It has no execution logic of its own.

mod error;
pub mod events;
pub mod ir;
mod node;
pub mod value;

pub use error::{
    CompileError, CompileErrors, ErrorKind, FlowError, NodeError, ResolutionError, RuntimeError,
    ValidationError,
};
pub use events::*;
pub use ir::{
    DeclaredInput, DeclaredOutput, Edge, NodeId, NodeSpec, RetryPolicy, TypeHint, WorkflowIr,
    DEFAULT_ACTION,
};
pub use node::{Node, NodeContext, NodeInterface, NodePhase, PortDefinition};
pub use value::{Value, ValueStore};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
