//! Link-time registration of the built-in node kinds
//!
//! Every node module submits one [`BuiltinNode`] through `inventory`;
//! [`builtin_registry`] instantiates them all against a provider client.

use std::sync::Arc;

use pipeline_engine::{
    any_out_of_date, InfoValue, InfoValues, Node, NodeOperation, NodeRegistry, OutputValue,
    PortDataType,
};

use crate::api::PipelineApi;
use crate::kinds::PipelineNode;

/// Services shared by all built-in node operations
#[derive(Clone)]
pub struct NodeServices {
    pub api: Arc<dyn PipelineApi>,
}

/// Constructor for one built-in node type
pub type CreateFn = fn(&NodeServices) -> Arc<dyn NodeOperation<PipelineNode>>;

/// A built-in node type, collected at link time
pub struct BuiltinNode {
    pub node_type: &'static str,
    pub create: CreateFn,
}

impl BuiltinNode {
    pub const fn new(node_type: &'static str, create: CreateFn) -> Self {
        Self { node_type, create }
    }
}

inventory::collect!(BuiltinNode);

/// Registry holding every built-in node type, backed by `api`
pub fn builtin_registry(api: Arc<dyn PipelineApi>) -> NodeRegistry<PipelineNode> {
    let services = NodeServices { api };
    let mut registry = NodeRegistry::new();
    for builtin in inventory::iter::<BuiltinNode> {
        registry.register(builtin.node_type, (builtin.create)(&services));
    }
    log::debug!(
        "Registered {} built-in node types",
        registry.node_types().len()
    );
    registry
}

/// Preview for a parameter-only node: fresh unless the node itself is stale
pub(crate) fn source_info(
    node: &Node<PipelineNode>,
    port: &str,
    value: impl Into<OutputValue>,
    data_type: PortDataType,
) -> InfoValues {
    InfoValues::from([(
        port.to_string(),
        InfoValue::new(value, node.is_out_of_date(), data_type),
    )])
}

/// Preview reporting a processor's last result
pub(crate) fn last_result_info(
    node: &Node<PipelineNode>,
    inputs: &InfoValues,
    port: &str,
    last_result: Option<String>,
    data_type: PortDataType,
) -> InfoValues {
    InfoValues::from([(
        port.to_string(),
        InfoValue::new(last_result, processor_out_of_date(node, inputs), data_type),
    )])
}

pub(crate) fn processor_out_of_date(node: &Node<PipelineNode>, inputs: &InfoValues) -> bool {
    any_out_of_date(inputs) || node.is_out_of_date()
}
