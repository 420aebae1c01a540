//! Number Node

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PipelineValue, PortDataType, PortDefinition, PortMap, Result,
};

use crate::builtins::{source_info, BuiltinNode, NodeServices};
use crate::kinds::{params, NodeParams, NumberParams, PipelineNode};

pub struct NumberNode;

impl NumberNode {
    pub const PORT_OUTPUT: &'static str = "output";

    fn create(_services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(BuiltinNode::new(NumberParams::NODE_TYPE, NumberNode::create));

#[async_trait]
impl NodeOperation<PipelineNode> for NumberNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([PortDefinition::output(Self::PORT_OUTPUT, PortDataType::Number)])
    }

    async fn execute(
        &self,
        _ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        _inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let value = params::<NumberParams>(node)?.value;
        Ok(outputs([(Self::PORT_OUTPUT, value.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, _inputs: &InfoValues) -> InfoValues {
        let value = NumberParams::from_kind(&node.kind)
            .map_or(PipelineValue::Null, |p| PipelineValue::Number(p.value));
        source_info(node, Self::PORT_OUTPUT, value, PortDataType::Number)
    }
}
