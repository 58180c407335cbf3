use crate::ir::TypeHint;
use crate::node::NodePhase;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Compile(#[from] CompileErrors),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a node's own lifecycle phases.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

/// Whether a validation error concerns the document's shape or its
/// declared interface contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    Contract,
}

/// A fatal problem found while validating a workflow document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing format_version")]
    MissingFormatVersion,

    #[error("Workflow has no nodes")]
    NoNodes,

    #[error("Node at position {index} has an empty id")]
    EmptyNodeId { index: usize },

    #[error("Duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("Node '{node_id}' has an unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("Edge {index} references unknown {end} node '{node_id}'")]
    DanglingEdge {
        index: usize,
        end: &'static str,
        node_id: String,
    },

    #[error("Node '{from}' has more than one outgoing edge for action '{action}'")]
    DuplicateAction { from: String, action: String },

    #[error("start_node '{0}' does not name a node in the workflow")]
    UnknownStartNode(String),

    #[error(
        "Invalid {kind} name '{name}': must start with a letter or underscore and contain only letters, digits and underscores"
    )]
    InvalidIdentifier { kind: &'static str, name: String },

    #[error("Default value for input '{input}' does not match its declared type {expected}: got {actual}")]
    DefaultTypeMismatch {
        input: String,
        expected: TypeHint,
        actual: String,
    },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::DefaultTypeMismatch { .. } => ErrorKind::Contract,
            _ => ErrorKind::Structural,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(
        "Missing required input '{name}' ({}): supply it as a run-time argument, a setting, or a declared default",
        describe(.description)
    )]
    MissingRequiredInput {
        name: String,
        description: Option<String>,
    },

    #[error("Failed to create node '{node_id}' of type '{node_type}': {message}")]
    NodeConstruction {
        node_id: String,
        node_type: String,
        message: String,
    },

    #[error("Nested workflow depth limit of {0} exceeded")]
    NestingTooDeep(usize),
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Validation(e) => e.kind(),
            CompileError::MissingRequiredInput { .. } => ErrorKind::Contract,
            CompileError::NodeConstruction { .. } | CompileError::NestingTooDeep(_) => {
                ErrorKind::Structural
            }
        }
    }
}

fn describe(description: &Option<String>) -> &str {
    description.as_deref().unwrap_or("no description")
}

/// Every error found by one compilation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileErrors(pub Vec<CompileError>);

impl std::error::Error for CompileErrors {}

impl CompileErrors {
    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compilation failed with {} error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl From<Vec<CompileError>> for CompileErrors {
    fn from(errors: Vec<CompileError>) -> Self {
        Self(errors)
    }
}

/// A template reference that could not be resolved against the value store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("Reference '{reference}' failed at '{segment}': key not found")]
    MissingKey { reference: String, segment: String },

    #[error("Reference '{reference}' failed at '[{index}]': index out of range for length {len}")]
    IndexOutOfRange {
        reference: String,
        index: usize,
        len: usize,
    },

    #[error("Reference '{reference}' failed at '{segment}': cannot traverse into a {found}")]
    NotTraversable {
        reference: String,
        segment: String,
        found: &'static str,
    },
}

impl ResolutionError {
    pub fn reference(&self) -> &str {
        match self {
            ResolutionError::MissingKey { reference, .. }
            | ResolutionError::IndexOutOfRange { reference, .. }
            | ResolutionError::NotTraversable { reference, .. } => reference,
        }
    }
}

/// Fatal errors raised while walking an executable graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Node '{node_id}': {source}")]
    Resolution {
        node_id: String,
        #[source]
        source: ResolutionError,
    },

    #[error("Node '{node_id}' failed during {phase}: {source}")]
    PhaseFailed {
        node_id: String,
        phase: NodePhase,
        #[source]
        source: NodeError,
    },

    #[error("Node '{node_id}' failed after {attempts} attempt(s): {source}")]
    ExecExhausted {
        node_id: String,
        attempts: u32,
        #[source]
        source: NodeError,
    },

    #[error("Node '{node_id}' returned action '{action}' but has no edge for it")]
    UnroutedAction { node_id: String, action: String },

    #[error("Execution cancelled before node '{next_node}'")]
    Cancelled { next_node: String },

    #[error("Execution exceeded the limit of {0} steps")]
    StepLimitExceeded(usize),
}

impl RuntimeError {
    /// The node the walk was at when the error occurred, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            RuntimeError::Resolution { node_id, .. }
            | RuntimeError::PhaseFailed { node_id, .. }
            | RuntimeError::ExecExhausted { node_id, .. }
            | RuntimeError::UnroutedAction { node_id, .. } => Some(node_id),
            RuntimeError::Cancelled { next_node } => Some(next_node),
            RuntimeError::StepLimitExceeded(_) => None,
        }
    }
}
