//! Upscale Node

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PortDataType, PortDefinition, PortMap, Result,
};

use crate::api::{PipelineApi, UpscaleRequest};
use crate::builtins::{last_result_info, BuiltinNode, NodeServices};
use crate::kinds::{params, update_params, NodeParams, PipelineNode, UpscaleParams};

/// Upscales an image by 2x or 4x through the provider
pub struct UpscaleNode {
    api: Arc<dyn PipelineApi>,
}

impl UpscaleNode {
    pub const PORT_IMAGE: &'static str = "image";
    pub const PORT_OUTPUT: &'static str = "output";

    /// Factor used when the scale parameter does not parse
    pub const DEFAULT_SCALE: f64 = 2.0;

    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self { api }
    }

    fn create(services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self::new(services.api.clone()))
    }

    fn scale_factor(scale: &str) -> f64 {
        scale
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite() && *s != 0.0)
            .unwrap_or(Self::DEFAULT_SCALE)
    }
}

inventory::submit!(BuiltinNode::new(UpscaleParams::NODE_TYPE, UpscaleNode::create));

#[async_trait]
impl NodeOperation<PipelineNode> for UpscaleNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([
            PortDefinition::input(Self::PORT_IMAGE, PortDataType::Image),
            PortDefinition::output(Self::PORT_OUTPUT, PortDataType::Image),
        ])
    }

    async fn execute(
        &self,
        ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let params = params::<UpscaleParams>(node)?;
        let request = UpscaleRequest {
            image_url: inputs.get_text(Self::PORT_IMAGE).unwrap_or_default(),
            scale: Self::scale_factor(&params.scale),
            method: params.method.clone(),
        };
        log::debug!(
            "UpscaleNode {}: {}x ({})",
            node.id,
            request.scale,
            request.method
        );

        let image_url = self.api.upscale(request).await?.image_url;
        ctx.update_node(|kind| {
            update_params::<UpscaleParams>(kind, |p| p.last_result_url = Some(image_url.clone()))
        })?;

        Ok(outputs([(Self::PORT_OUTPUT, image_url.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let last = UpscaleParams::from_kind(&node.kind).and_then(|p| p.last_result_url.clone());
        last_result_info(node, inputs, Self::PORT_OUTPUT, last, PortDataType::Image)
    }
}
