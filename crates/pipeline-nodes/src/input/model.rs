//! Model Node
//!
//! Selects the generation model for downstream generate nodes.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PortDataType, PortDefinition, PortMap, Result,
};

use crate::builtins::{source_info, BuiltinNode, NodeServices};
use crate::kinds::{params, ModelParams, NodeParams, PipelineNode};

/// Emits the model as `provider:modelId`
pub struct ModelNode;

impl ModelNode {
    /// Port ID for the model output
    pub const PORT_OUTPUT: &'static str = "output";

    fn create(_services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(BuiltinNode::new(ModelParams::NODE_TYPE, ModelNode::create));

#[async_trait]
impl NodeOperation<PipelineNode> for ModelNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([PortDefinition::output(Self::PORT_OUTPUT, PortDataType::Model)])
    }

    async fn execute(
        &self,
        _ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        _inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let model = params::<ModelParams>(node)?.qualified();
        log::debug!("ModelNode {}: {}", node.id, model);
        Ok(outputs([(Self::PORT_OUTPUT, model.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, _inputs: &InfoValues) -> InfoValues {
        let model = ModelParams::from_kind(&node.kind).map(ModelParams::qualified);
        source_info(node, Self::PORT_OUTPUT, model, PortDataType::Model)
    }
}
