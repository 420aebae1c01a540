//! Error types for the pipeline engine

use thiserror::Error;

use crate::types::{PortDataType, Terminal};

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur in the pipeline engine
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `execute()` was called on a run that already started
    #[error("Execution graph can only be executed once")]
    AlreadyExecuted,

    /// Node does not exist in the document
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A node with this id already exists
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// Connection does not exist in the document
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// Port does not exist on the node
    #[error("Port '{port}' not found on node '{node}'")]
    PortNotFound { node: String, port: String },

    /// Port has the wrong direction for the requested binding
    #[error("Port '{port}' on node '{node}' is not a {expected:?} port")]
    TerminalMismatch {
        node: String,
        port: String,
        expected: Terminal,
    },

    /// Source and target port types cannot be connected
    #[error("Incompatible port types: {source_type:?} -> {target_type:?}")]
    IncompatiblePorts {
        source_type: PortDataType,
        target_type: PortDataType,
    },

    /// Completing the connection would introduce a cycle
    #[error("Connecting '{from}' to '{to}' would create a cycle")]
    WouldCreateCycle { from: String, to: String },

    /// No operation is registered for the node's type tag
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// The node's kind is not the one an operation expects
    #[error("Node '{node}' has type '{actual}', expected '{expected}'")]
    NodeTypeMismatch {
        node: String,
        expected: String,
        actual: String,
    },

    /// A node operation failed
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// A generation provider rejected a request or was unreachable
    #[error("Provider error: {0}")]
    Provider(String),

    /// Image decode, encode or processing error
    #[error("Image error: {0}")]
    Image(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Create an operation failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::OperationFailed(msg.into())
    }

    /// Create a provider error with a message
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create an image error with a message
    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }
}
