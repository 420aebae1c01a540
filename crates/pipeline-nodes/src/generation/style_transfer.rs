//! Style Transfer Node

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PortDataType, PortDefinition, PortMap, Result,
};

use crate::api::{PipelineApi, StyleTransferRequest};
use crate::builtins::{last_result_info, BuiltinNode, NodeServices};
use crate::kinds::{params, update_params, NodeParams, PipelineNode, StyleTransferParams};

/// Applies the style of one image to a content image or a prompt
pub struct StyleTransferNode {
    api: Arc<dyn PipelineApi>,
}

impl StyleTransferNode {
    pub const PORT_STYLE: &'static str = "style";
    pub const PORT_CONTENT: &'static str = "content";
    pub const PORT_PROMPT: &'static str = "prompt";
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self { api }
    }

    fn create(services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self::new(services.api.clone()))
    }
}

inventory::submit!(BuiltinNode::new(
    StyleTransferParams::NODE_TYPE,
    StyleTransferNode::create
));

#[async_trait]
impl NodeOperation<PipelineNode> for StyleTransferNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([
            PortDefinition::input(Self::PORT_STYLE, PortDataType::Image),
            PortDefinition::input(Self::PORT_CONTENT, PortDataType::Image),
            PortDefinition::input(Self::PORT_PROMPT, PortDataType::Text),
            PortDefinition::output(Self::PORT_OUTPUT, PortDataType::Image),
        ])
    }

    async fn execute(
        &self,
        ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let params = params::<StyleTransferParams>(node)?;
        let request = StyleTransferRequest {
            style_image_url: inputs.get_text(Self::PORT_STYLE).unwrap_or_default(),
            content_image_url: inputs.get_text(Self::PORT_CONTENT),
            prompt: inputs.get_text(Self::PORT_PROMPT),
            model: params.model.clone(),
            strength: params.strength / 100.0,
        };
        log::debug!(
            "StyleTransferNode {}: model '{}', strength {}",
            node.id,
            request.model,
            request.strength
        );

        let image_url = self.api.style_transfer(request).await?.image_url;
        ctx.update_node(|kind| {
            update_params::<StyleTransferParams>(kind, |p| {
                p.last_result_url = Some(image_url.clone())
            })
        })?;

        Ok(outputs([(Self::PORT_OUTPUT, image_url.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let last =
            StyleTransferParams::from_kind(&node.kind).and_then(|p| p.last_result_url.clone());
        last_result_info(node, inputs, Self::PORT_OUTPUT, last, PortDataType::Image)
    }
}
