//! Prompt Node
//!
//! Free text typed by the user.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PortDataType, PortDefinition, PortMap, Result,
};

use crate::builtins::{source_info, BuiltinNode, NodeServices};
use crate::kinds::{params, NodeParams, PipelineNode, PromptParams};

pub struct PromptNode;

impl PromptNode {
    /// Port ID for the text output
    pub const PORT_OUTPUT: &'static str = "output";

    fn create(_services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(BuiltinNode::new(PromptParams::NODE_TYPE, PromptNode::create));

#[async_trait]
impl NodeOperation<PipelineNode> for PromptNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([PortDefinition::output(Self::PORT_OUTPUT, PortDataType::Text)])
    }

    async fn execute(
        &self,
        _ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        _inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let text = params::<PromptParams>(node)?.text.clone();
        log::debug!("PromptNode {}: {} chars", node.id, text.len());
        Ok(outputs([(Self::PORT_OUTPUT, text.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, _inputs: &InfoValues) -> InfoValues {
        let text = PromptParams::from_kind(&node.kind).map(|p| p.text.clone());
        source_info(node, Self::PORT_OUTPUT, text, PortDataType::Text)
    }
}
