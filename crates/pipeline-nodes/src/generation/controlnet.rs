//! ControlNet Node
//!
//! Generation guided by a control image (edges, depth, pose, segmentation).

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PortDataType, PortDefinition, PortMap, Result,
};

use crate::api::{GenerateRequest, PipelineApi};
use crate::builtins::{last_result_info, BuiltinNode, NodeServices};
use crate::kinds::{params, update_params, ControlNetParams, NodeParams, PipelineNode};

pub struct ControlNetNode {
    api: Arc<dyn PipelineApi>,
}

impl ControlNetNode {
    pub const PORT_MODEL: &'static str = "model";
    /// Port ID for the control image
    pub const PORT_IMAGE: &'static str = "image";
    pub const PORT_PROMPT: &'static str = "prompt";
    pub const PORT_OUTPUT: &'static str = "output";

    pub const DEFAULT_MODEL: &'static str = "stable-diffusion:sdxl";
    /// ControlNet runs with a fixed guidance scale
    pub const CFG_SCALE: f64 = 7.0;

    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self { api }
    }

    fn create(services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self::new(services.api.clone()))
    }
}

inventory::submit!(BuiltinNode::new(
    ControlNetParams::NODE_TYPE,
    ControlNetNode::create
));

#[async_trait]
impl NodeOperation<PipelineNode> for ControlNetNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([
            PortDefinition::input(Self::PORT_MODEL, PortDataType::Model),
            PortDefinition::input(Self::PORT_IMAGE, PortDataType::Image),
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
        let params = params::<ControlNetParams>(node)?;
        let model = inputs
            .get_text(Self::PORT_MODEL)
            .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());
        let prompt = inputs.get_text(Self::PORT_PROMPT).unwrap_or_default();

        let request = GenerateRequest {
            steps: Some(params.steps),
            cfg_scale: Some(Self::CFG_SCALE),
            control_net_mode: Some(params.mode.clone()),
            control_net_strength: Some(params.strength),
            reference_image_url: inputs.get_text(Self::PORT_IMAGE),
            ..GenerateRequest::new(model, prompt)
        };
        log::debug!(
            "ControlNetNode {}: mode '{}' at strength {}",
            node.id,
            params.mode,
            params.strength
        );

        let image_url = self.api.generate(request).await?.image_url;
        ctx.update_node(|kind| {
            update_params::<ControlNetParams>(kind, |p| p.last_result_url = Some(image_url.clone()))
        })?;

        Ok(outputs([(Self::PORT_OUTPUT, image_url.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let last = ControlNetParams::from_kind(&node.kind).and_then(|p| p.last_result_url.clone());
        last_result_info(node, inputs, Self::PORT_OUTPUT, last, PortDataType::Image)
    }
}
