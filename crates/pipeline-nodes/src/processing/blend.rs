//! Blend Node
//!
//! Composites image B over image A with a blend mode and opacity.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PortDataType, PortDefinition, PortMap, Result,
};

use crate::api::PipelineApi;
use crate::builtins::{last_result_info, BuiltinNode, NodeServices};
use crate::imaging;
use crate::kinds::{params, update_params, BlendParams, NodeParams, PipelineNode};

/// Composites two images; a single connected image passes through
pub struct BlendNode {
    api: Arc<dyn PipelineApi>,
}

impl BlendNode {
    /// Port ID for the bottom image
    pub const PORT_IMAGE_A: &'static str = "imageA";
    /// Port ID for the top image
    pub const PORT_IMAGE_B: &'static str = "imageB";
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self { api }
    }

    fn create(services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self::new(services.api.clone()))
    }

    async fn composite(&self, params: &BlendParams, a: &str, b: &str) -> Result<String> {
        let bottom = imaging::load_image(self.api.as_ref(), a).await?;
        let top = imaging::load_image(self.api.as_ref(), b).await?;
        let blended = imaging::blend(&bottom, &top, params.mode, (params.opacity / 100.0) as f32);
        imaging::encode_png_data_url(&blended)
    }
}

inventory::submit!(BuiltinNode::new(BlendParams::NODE_TYPE, BlendNode::create));

#[async_trait]
impl NodeOperation<PipelineNode> for BlendNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([
            PortDefinition::input(Self::PORT_IMAGE_A, PortDataType::Image),
            PortDefinition::input(Self::PORT_IMAGE_B, PortDataType::Image),
            PortDefinition::output(Self::PORT_OUTPUT, PortDataType::Image),
        ])
    }

    async fn execute(
        &self,
        ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let params = params::<BlendParams>(node)?;
        let a = inputs.get_text(Self::PORT_IMAGE_A);
        let b = inputs.get_text(Self::PORT_IMAGE_B);

        let result = match (a, b) {
            (Some(a), Some(b)) => {
                log::debug!(
                    "BlendNode {}: {:?} at {}%",
                    node.id,
                    params.mode,
                    params.opacity
                );
                Some(self.composite(params, &a, &b).await?)
            }
            (Some(only), None) | (None, Some(only)) => Some(only),
            (None, None) => None,
        };

        ctx.update_node(|kind| {
            update_params::<BlendParams>(kind, |p| p.last_result_url = result.clone())
        })?;
        Ok(outputs([(Self::PORT_OUTPUT, result.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let last = BlendParams::from_kind(&node.kind).and_then(|p| p.last_result_url.clone());
        last_result_info(node, inputs, Self::PORT_OUTPUT, last, PortDataType::Image)
    }
}
