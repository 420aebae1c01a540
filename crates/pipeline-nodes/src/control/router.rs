//! Router Node
//!
//! Fans one input out to a configurable number of outputs. The port set
//! depends on the `outputCount` parameter.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    port_map, ExecutionResult, InfoValue, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, OutputValue, PipelineValue, PortDataType, PortDefinition, PortMap, Result,
};

use crate::builtins::{BuiltinNode, NodeServices};
use crate::kinds::{params, NodeParams, PipelineNode, RouterParams};

pub struct RouterNode;

impl RouterNode {
    pub const PORT_INPUT: &'static str = "input";

    /// Port ID of the `index`-th output
    pub fn output_port(index: usize) -> String {
        format!("out_{}", index)
    }

    fn create(_services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self)
    }

    fn output_count(node: &Node<PipelineNode>) -> usize {
        RouterParams::from_kind(&node.kind).map_or(0, |p| p.output_count)
    }
}

inventory::submit!(BuiltinNode::new(RouterParams::NODE_TYPE, RouterNode::create));

#[async_trait]
impl NodeOperation<PipelineNode> for RouterNode {
    fn ports(&self, node: &Node<PipelineNode>) -> PortMap {
        let outputs = (0..Self::output_count(node))
            .map(|i| PortDefinition::output(Self::output_port(i), PortDataType::Any));
        port_map(
            std::iter::once(PortDefinition::input(Self::PORT_INPUT, PortDataType::Any))
                .chain(outputs),
        )
    }

    async fn execute(
        &self,
        _ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let count = params::<RouterParams>(node)?.output_count;
        let value = inputs
            .get_input(Self::PORT_INPUT)
            .cloned()
            .unwrap_or(PipelineValue::Null);
        log::debug!("RouterNode {}: forwarding to {} outputs", node.id, count);

        Ok((0..count)
            .map(|i| (Self::output_port(i), OutputValue::Value(value.clone())))
            .collect())
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let forwarded = match inputs.get(Self::PORT_INPUT) {
            Some(input) => InfoValue::new(
                input.first().cloned().unwrap_or_else(OutputValue::null),
                input.is_out_of_date || node.is_out_of_date(),
                input.data_type,
            ),
            None => InfoValue::new(
                OutputValue::null(),
                node.is_out_of_date(),
                PortDataType::Any,
            ),
        };
        (0..Self::output_count(node))
            .map(|i| (Self::output_port(i), forwarded.clone()))
            .collect()
    }
}
