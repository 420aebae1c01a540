//! Load Image Node
//!
//! Emits an image URL picked by the user, or null when none is set.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PortDataType, PortDefinition, PortMap, Result,
};

use crate::builtins::{source_info, BuiltinNode, NodeServices};
use crate::kinds::{params, LoadImageParams, NodeParams, PipelineNode};

pub struct LoadImageNode;

impl LoadImageNode {
    pub const PORT_OUTPUT: &'static str = "output";

    fn create(_services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(BuiltinNode::new(
    LoadImageParams::NODE_TYPE,
    LoadImageNode::create
));

#[async_trait]
impl NodeOperation<PipelineNode> for LoadImageNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([PortDefinition::output(Self::PORT_OUTPUT, PortDataType::Image)])
    }

    async fn execute(
        &self,
        _ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        _inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let image_url = params::<LoadImageParams>(node)?.image_url.clone();
        Ok(outputs([(Self::PORT_OUTPUT, image_url.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, _inputs: &InfoValues) -> InfoValues {
        let image_url = LoadImageParams::from_kind(&node.kind).and_then(|p| p.image_url.clone());
        source_info(node, Self::PORT_OUTPUT, image_url, PortDataType::Image)
    }
}
