//! IP-Adapter Node
//!
//! Generates from a prompt while borrowing the look of a reference image.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, PortDataType, PortDefinition, PortMap, Result,
};

use crate::api::{IpAdapterRequest, PipelineApi};
use crate::builtins::{last_result_info, BuiltinNode, NodeServices};
use crate::kinds::{params, update_params, IpAdapterParams, NodeParams, PipelineNode};

pub struct IpAdapterNode {
    api: Arc<dyn PipelineApi>,
}

impl IpAdapterNode {
    pub const PORT_IMAGE: &'static str = "image";
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
    IpAdapterParams::NODE_TYPE,
    IpAdapterNode::create
));

#[async_trait]
impl NodeOperation<PipelineNode> for IpAdapterNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([
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
        let params = params::<IpAdapterParams>(node)?;
        let request = IpAdapterRequest {
            image_url: inputs.get_text(Self::PORT_IMAGE).unwrap_or_default(),
            prompt: inputs.get_text(Self::PORT_PROMPT).unwrap_or_default(),
            scale: params.scale / 100.0,
            steps: params.steps,
        };
        log::debug!("IpAdapterNode {}: scale {}", node.id, request.scale);

        let image_url = self.api.ip_adapter(request).await?.image_url;
        ctx.update_node(|kind| {
            update_params::<IpAdapterParams>(kind, |p| p.last_result_url = Some(image_url.clone()))
        })?;

        Ok(outputs([(Self::PORT_OUTPUT, image_url.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let last = IpAdapterParams::from_kind(&node.kind).and_then(|p| p.last_result_url.clone());
        last_result_info(node, inputs, Self::PORT_OUTPUT, last, PortDataType::Image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        add_node, output, run_node, test_document, ApiCall, MockPipelineApi,
    };

    #[tokio::test]
    async fn test_scale_is_sent_as_fraction() {
        let api = MockPipelineApi::new();
        let doc = test_document(api.clone());
        add_node(&doc, "ip", |_: &mut IpAdapterParams| {});

        let inputs = InputValues::new()
            .with(IpAdapterNode::PORT_IMAGE, "https://img.test/face.png")
            .with(IpAdapterNode::PORT_PROMPT, "astronaut");
        let result = run_node(&doc, "ip", inputs).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![ApiCall::IpAdapter(IpAdapterRequest {
                image_url: "https://img.test/face.png".to_string(),
                prompt: "astronaut".to_string(),
                scale: 0.6,
                steps: 30,
            })]
        );
        assert_eq!(
            output(&result, IpAdapterNode::PORT_OUTPUT).as_text(),
            Some("mock://ip-adapter/1")
        );
    }
}
