//! Node type registry for operation dispatch
//!
//! Maps node type tags to the operation that implements ports, execution,
//! output previews and connection hooks for that kind of node. The engine
//! never matches on node kinds itself; everything goes through here.
//!
//! # Usage
//!
//! ```ignore
//! use pipeline_engine::NodeRegistry;
//!
//! let mut registry = NodeRegistry::new();
//! registry.register("prompt", Arc::new(PromptOperation));
//!
//! let operation = registry.operation_for(&node)?;
//! let ports = operation.ports(&node);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::NodeContext;
use crate::error::{PipelineError, Result};
use crate::types::{ExecutionResult, InfoValues, InputValues, Node, NodeKind, PortMap};

/// Per-node-type operation
///
/// One implementation handles exactly one node type tag.
#[async_trait]
pub trait NodeOperation<N: NodeKind>: Send + Sync {
    /// Ports of the node; must be a pure function of its kind and parameters
    fn ports(&self, node: &Node<N>) -> PortMap;

    /// Run the node with its resolved inputs
    ///
    /// Writes back to the node (e.g. "last result" fields) must go through
    /// `ctx` so they are dropped once the run has been stopped.
    async fn execute(
        &self,
        ctx: &NodeContext<N>,
        node: &Node<N>,
        inputs: InputValues,
    ) -> Result<ExecutionResult>;

    /// Preview outputs from input previews without running anything
    fn output_info(&self, node: &Node<N>, inputs: &InfoValues) -> InfoValues;

    /// Called after a binding to `port` on this node is created
    fn on_port_connect(&self, _node: &mut Node<N>, _port: &str) {}

    /// Called after a binding to `port` on this node is removed
    fn on_port_disconnect(&self, _node: &mut Node<N>, _port: &str) {}
}

/// Registry of node types and their operations
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = builtin_registry(api);
/// registry.merge(plugin_registry); // plugin types override built-ins
/// ```
pub struct NodeRegistry<N: NodeKind> {
    entries: HashMap<String, Arc<dyn NodeOperation<N>>>,
}

impl<N: NodeKind> NodeRegistry<N> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register the operation for a node type
    pub fn register(&mut self, node_type: impl Into<String>, operation: Arc<dyn NodeOperation<N>>) {
        self.entries.insert(node_type.into(), operation);
    }

    /// Get the operation for a node type
    pub fn get_operation(&self, node_type: &str) -> Option<Arc<dyn NodeOperation<N>>> {
        self.entries.get(node_type).cloned()
    }

    /// Get the operation for a node, by its kind's type tag
    pub fn operation_for(&self, node: &Node<N>) -> Result<Arc<dyn NodeOperation<N>>> {
        self.get_operation(node.type_tag())
            .ok_or_else(|| PipelineError::UnknownNodeType(node.type_tag().to_string()))
    }

    /// Ports of a node, via its operation
    pub fn ports(&self, node: &Node<N>) -> Result<PortMap> {
        Ok(self.operation_for(node)?.ports(node))
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// List all registered node type strings, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same type.
    pub fn merge(&mut self, other: NodeRegistry<N>) {
        self.entries.extend(other.entries);
    }
}

impl<N: NodeKind> Default for NodeRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}
