//! Preview Node
//!
//! Terminal node that keeps the image it last received for display.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    port_map, ExecutionResult, InfoValues, InputValues, Node, NodeContext, NodeOperation,
    PortDataType, PortDefinition, PortMap, Result,
};

use crate::builtins::{BuiltinNode, NodeServices};
use crate::kinds::{update_params, NodeParams, PipelineNode, PreviewParams};

pub struct PreviewNode;

impl PreviewNode {
    pub const PORT_IMAGE: &'static str = "image";

    fn create(_services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(BuiltinNode::new(PreviewParams::NODE_TYPE, PreviewNode::create));

#[async_trait]
impl NodeOperation<PipelineNode> for PreviewNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([PortDefinition::input(Self::PORT_IMAGE, PortDataType::Image)])
    }

    async fn execute(
        &self,
        ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let image_url = inputs.get_text(Self::PORT_IMAGE);
        log::debug!(
            "PreviewNode {}: {}",
            node.id,
            image_url.as_deref().unwrap_or("no image")
        );
        ctx.update_node(|kind| {
            update_params::<PreviewParams>(kind, |p| p.last_image_url = image_url.clone())
        })?;
        Ok(ExecutionResult::new())
    }

    fn output_info(&self, _node: &Node<PipelineNode>, _inputs: &InfoValues) -> InfoValues {
        InfoValues::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_node, params_of, run_node, test_document, MockPipelineApi};

    #[tokio::test]
    async fn test_stores_last_image() {
        let doc = test_document(MockPipelineApi::new());
        add_node(&doc, "v", |_: &mut PreviewParams| {});

        let inputs = InputValues::new().with(PreviewNode::PORT_IMAGE, "mock://generate/1");
        let result = run_node(&doc, "v", inputs).await.unwrap();
        assert!(result.is_empty());

        let params: PreviewParams = params_of(&doc, "v");
        assert_eq!(params.last_image_url.as_deref(), Some("mock://generate/1"));
        assert!(doc.output_port_info("v").unwrap().is_empty());
    }
}
