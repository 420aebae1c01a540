//! Adjust Node
//!
//! Brightness, contrast and saturation applied locally, with the same
//! semantics as the CSS filters of the same names.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, OutputValue, PortDataType, PortDefinition, PortMap, Result,
};

use crate::api::PipelineApi;
use crate::builtins::{last_result_info, BuiltinNode, NodeServices};
use crate::imaging;
use crate::kinds::{params, update_params, AdjustParams, NodeParams, PipelineNode};

pub struct AdjustNode {
    api: Arc<dyn PipelineApi>,
}

impl AdjustNode {
    pub const PORT_IMAGE: &'static str = "image";
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self { api }
    }

    fn create(services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self::new(services.api.clone()))
    }
}

inventory::submit!(BuiltinNode::new(AdjustParams::NODE_TYPE, AdjustNode::create));

#[async_trait]
impl NodeOperation<PipelineNode> for AdjustNode {
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
        let Some(image_url) = inputs.get_text(Self::PORT_IMAGE) else {
            ctx.update_node(|kind| {
                update_params::<AdjustParams>(kind, |p| p.last_result_url = None)
            })?;
            return Ok(outputs([(Self::PORT_OUTPUT, OutputValue::null())]));
        };

        let (brightness, contrast, saturation) = {
            let p = params::<AdjustParams>(node)?;
            (
                imaging::slider_factor(p.brightness),
                imaging::slider_factor(p.contrast),
                imaging::slider_factor(p.saturation),
            )
        };
        log::debug!(
            "AdjustNode {}: brightness {}, contrast {}, saturation {}",
            node.id,
            brightness,
            contrast,
            saturation
        );

        let image = imaging::load_image(self.api.as_ref(), &image_url).await?;
        let adjusted = imaging::adjust(&image, brightness, contrast, saturation);
        let data_url = imaging::encode_png_data_url(&adjusted)?;

        ctx.update_node(|kind| {
            update_params::<AdjustParams>(kind, |p| p.last_result_url = Some(data_url.clone()))
        })?;
        Ok(outputs([(Self::PORT_OUTPUT, data_url.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let last = AdjustParams::from_kind(&node.kind).and_then(|p| p.last_result_url.clone());
        last_result_info(node, inputs, Self::PORT_OUTPUT, last, PortDataType::Image)
    }
}
