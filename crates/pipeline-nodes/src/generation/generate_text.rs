//! Generate Text Node
//!
//! Asks the provider for text, optionally about an input (often an image
//! URL). Useful for captioning and prompt expansion.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PortDataType, PortDefinition, PortMap, Result,
};

use crate::api::{GenerateTextRequest, PipelineApi};
use crate::builtins::{last_result_info, BuiltinNode, NodeServices};
use crate::kinds::{update_params, GenerateTextParams, NodeParams, PipelineNode};

pub struct GenerateTextNode {
    api: Arc<dyn PipelineApi>,
}

impl GenerateTextNode {
    /// Port ID for the subject input (any type, sent as text)
    pub const PORT_INPUT: &'static str = "input";
    /// Port ID for the instruction input
    pub const PORT_PROMPT: &'static str = "prompt";
    pub const PORT_OUTPUT: &'static str = "output";

    pub const DEFAULT_PROMPT: &'static str = "Describe this image in detail.";

    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self { api }
    }

    fn create(services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self::new(services.api.clone()))
    }
}

inventory::submit!(BuiltinNode::new(
    GenerateTextParams::NODE_TYPE,
    GenerateTextNode::create
));

#[async_trait]
impl NodeOperation<PipelineNode> for GenerateTextNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([
            PortDefinition::input(Self::PORT_INPUT, PortDataType::Any),
            PortDefinition::input(Self::PORT_PROMPT, PortDataType::Text),
            PortDefinition::output(Self::PORT_OUTPUT, PortDataType::Text),
        ])
    }

    async fn execute(
        &self,
        ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let request = GenerateTextRequest {
            input: inputs.get_text(Self::PORT_INPUT),
            prompt: inputs
                .get_text(Self::PORT_PROMPT)
                .unwrap_or_else(|| Self::DEFAULT_PROMPT.to_string()),
        };
        log::debug!(
            "GenerateTextNode {}: prompt '{}', input {}",
            node.id,
            request.prompt,
            if request.input.is_some() { "set" } else { "none" }
        );

        let text = self.api.generate_text(request).await?.text;
        ctx.update_node(|kind| {
            update_params::<GenerateTextParams>(kind, |p| p.last_result_text = Some(text.clone()))
        })?;

        Ok(outputs([(Self::PORT_OUTPUT, text.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let last =
            GenerateTextParams::from_kind(&node.kind).and_then(|p| p.last_result_text.clone());
        last_result_info(node, inputs, Self::PORT_OUTPUT, last, PortDataType::Text)
    }
}
