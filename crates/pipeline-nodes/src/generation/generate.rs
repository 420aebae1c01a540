//! Generate Node
//!
//! Text-to-image (or image-guided) generation. Several prompt nodes may feed
//! the multi `prompt` port; their texts are joined in connection order.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PipelineValue, PortDataType, PortDefinition, PortMap, Result,
};

use crate::api::{GenerateRequest, PipelineApi};
use crate::builtins::{last_result_info, BuiltinNode, NodeServices};
use crate::kinds::{params, update_params, GenerateParams, NodeParams, PipelineNode};

/// Generates an image from a model, prompts and an optional reference
///
/// # Inputs
/// - `model` (optional) - `provider:model`, defaults to [`Self::DEFAULT_MODEL`]
/// - `prompt` (multi) - prompt fragments, joined with `", "`
/// - `negative` (optional) - negative prompt
/// - `image` (optional) - reference image URL
///
/// # Outputs
/// - `output` - URL of the generated image
pub struct GenerateNode {
    api: Arc<dyn PipelineApi>,
}

impl GenerateNode {
    /// Port ID for model input
    pub const PORT_MODEL: &'static str = "model";
    /// Port ID for prompt input (multi)
    pub const PORT_PROMPT: &'static str = "prompt";
    /// Port ID for negative prompt input
    pub const PORT_NEGATIVE: &'static str = "negative";
    /// Port ID for reference image input
    pub const PORT_IMAGE: &'static str = "image";
    /// Port ID for image output
    pub const PORT_OUTPUT: &'static str = "output";

    /// Model used when nothing is connected to `model`
    pub const DEFAULT_MODEL: &'static str = "flux:flux-dev";
    /// Prompt used when every connected prompt is empty
    pub const DEFAULT_PROMPT: &'static str = "default";

    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self { api }
    }

    fn create(services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self::new(services.api.clone()))
    }

    fn joined_prompt(inputs: &InputValues) -> String {
        let prompt = inputs
            .get_input_multi(Self::PORT_PROMPT)
            .iter()
            .filter_map(PipelineValue::to_text)
            .collect::<Vec<_>>()
            .join(", ");
        if prompt.is_empty() {
            Self::DEFAULT_PROMPT.to_string()
        } else {
            prompt
        }
    }
}

inventory::submit!(BuiltinNode::new(GenerateParams::NODE_TYPE, GenerateNode::create));

#[async_trait]
impl NodeOperation<PipelineNode> for GenerateNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([
            PortDefinition::input(Self::PORT_MODEL, PortDataType::Model),
            PortDefinition::input(Self::PORT_PROMPT, PortDataType::Text).multi(),
            PortDefinition::input(Self::PORT_NEGATIVE, PortDataType::Text),
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
        let params = params::<GenerateParams>(node)?;
        let model = inputs
            .get_text(Self::PORT_MODEL)
            .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());

        let request = GenerateRequest {
            negative_prompt: inputs.get_text(Self::PORT_NEGATIVE),
            steps: Some(params.steps),
            cfg_scale: Some(params.cfg_scale),
            seed: Some(params.seed),
            reference_image_url: inputs.get_text(Self::PORT_IMAGE),
            ..GenerateRequest::new(model, Self::joined_prompt(&inputs))
        };
        log::debug!(
            "GenerateNode {}: model '{}', prompt '{}'",
            node.id,
            request.model,
            request.prompt
        );

        let image_url = self.api.generate(request).await?.image_url;
        ctx.update_node(|kind| {
            update_params::<GenerateParams>(kind, |p| p.last_result_url = Some(image_url.clone()))
        })?;

        Ok(outputs([(Self::PORT_OUTPUT, image_url.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let last = GenerateParams::from_kind(&node.kind).and_then(|p| p.last_result_url.clone());
        last_result_info(node, inputs, Self::PORT_OUTPUT, last, PortDataType::Image)
    }
}
