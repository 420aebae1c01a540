//! Iterator Node
//!
//! Runs one generation per line of its item list, reporting progress after
//! each. Stops issuing requests once its run is stopped.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValue, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, OutputValue, PortDataType, PortDefinition, PortMap, Result,
};

use crate::api::{GenerateRequest, PipelineApi};
use crate::builtins::{processor_out_of_date, BuiltinNode, NodeServices};
use crate::kinds::{params, update_params, IteratorParams, NodeParams, PipelineNode};

pub struct IteratorNode {
    api: Arc<dyn PipelineApi>,
}

impl IteratorNode {
    /// Port ID for the prompt prefix shared by every item
    pub const PORT_TEMPLATE: &'static str = "template";
    /// Port ID for the last generated image
    pub const PORT_OUTPUT: &'static str = "output";
    /// Port ID for the last processed item
    pub const PORT_CURRENT_ITEM: &'static str = "current_item";

    pub const MODEL: &'static str = "stable-diffusion:sdxl";

    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self { api }
    }

    fn create(services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self::new(services.api.clone()))
    }
}

inventory::submit!(BuiltinNode::new(IteratorParams::NODE_TYPE, IteratorNode::create));

#[async_trait]
impl NodeOperation<PipelineNode> for IteratorNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([
            PortDefinition::input(Self::PORT_TEMPLATE, PortDataType::Any),
            PortDefinition::output(Self::PORT_OUTPUT, PortDataType::Image),
            PortDefinition::output(Self::PORT_CURRENT_ITEM, PortDataType::Text),
        ])
    }

    async fn execute(
        &self,
        ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let items: Vec<String> = params::<IteratorParams>(node)?
            .item_list()
            .into_iter()
            .map(str::to_string)
            .collect();

        if items.is_empty() {
            ctx.update_node(|kind| {
                update_params::<IteratorParams>(kind, |p| {
                    p.completed_count = 0;
                    p.total_count = 0;
                    p.last_result_url = None;
                })
            })?;
            return Ok(outputs([
                (Self::PORT_OUTPUT, OutputValue::null()),
                (Self::PORT_CURRENT_ITEM, OutputValue::null()),
            ]));
        }

        let total = items.len();
        ctx.update_node(|kind| {
            update_params::<IteratorParams>(kind, |p| {
                p.completed_count = 0;
                p.total_count = total;
            })
        })?;

        let template = inputs.get_text(Self::PORT_TEMPLATE);
        let mut last_result = None;
        let mut last_item = None;
        for (i, item) in items.iter().enumerate() {
            if !ctx.is_active() {
                log::debug!("IteratorNode {}: run stopped after {} items", node.id, i);
                break;
            }
            let prompt = match &template {
                Some(template) => format!("{}, {}", template, item),
                None => item.clone(),
            };
            log::debug!("IteratorNode {}: item {}/{}: '{}'", node.id, i + 1, total, prompt);

            let image_url = self
                .api
                .generate(GenerateRequest::new(Self::MODEL, prompt))
                .await?
                .image_url;
            ctx.update_node(|kind| {
                update_params::<IteratorParams>(kind, |p| {
                    p.completed_count = i + 1;
                    p.last_result_url = Some(image_url.clone());
                })
            })?;
            ctx.report_progress(i + 1, total);
            last_result = Some(image_url);
            last_item = Some(item.clone());
        }

        Ok(outputs([
            (Self::PORT_OUTPUT, last_result.into()),
            (Self::PORT_CURRENT_ITEM, last_item.into()),
        ]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let params = IteratorParams::from_kind(&node.kind);
        let last = params.and_then(|p| p.last_result_url.clone());
        let current = params.and_then(|p| p.current_item().map(str::to_string));
        let out_of_date = processor_out_of_date(node, inputs);

        InfoValues::from([
            (
                Self::PORT_OUTPUT.to_string(),
                InfoValue::new(last, out_of_date, PortDataType::Image),
            ),
            (
                Self::PORT_CURRENT_ITEM.to_string(),
                InfoValue::new(current, out_of_date, PortDataType::Text),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_node, output, params_of, run_node, test_document, MockPipelineApi};

    #[tokio::test]
    async fn test_one_generation_per_item() {
        let api = MockPipelineApi::new();
        let doc = test_document(api.clone());
        add_node(&doc, "it", |_: &mut IteratorParams| {});

        let inputs = InputValues::new().with(IteratorNode::PORT_TEMPLATE, "watercolor");
        let result = run_node(&doc, "it", inputs).await.unwrap();

        let prompts: Vec<_> = api
            .generate_requests()
            .into_iter()
            .map(|r| (r.model, r.prompt))
            .collect();
        assert_eq!(
            prompts,
            vec![
                (IteratorNode::MODEL.to_string(), "watercolor, cat".to_string()),
                (IteratorNode::MODEL.to_string(), "watercolor, dog".to_string()),
                (IteratorNode::MODEL.to_string(), "watercolor, bird".to_string()),
            ]
        );
        assert_eq!(
            output(&result, IteratorNode::PORT_OUTPUT).as_text(),
            Some("mock://generate/3")
        );
        assert_eq!(
            output(&result, IteratorNode::PORT_CURRENT_ITEM).as_text(),
            Some("bird")
        );

        let params: IteratorParams = params_of(&doc, "it");
        assert_eq!(params.completed_count, 3);
        assert_eq!(params.total_count, 3);
        assert_eq!(params.last_result_url.as_deref(), Some("mock://generate/3"));

        let info = doc.output_port_info("it").unwrap();
        assert_eq!(info["current_item"].text(), Some("bird"));
    }

    #[tokio::test]
    async fn test_empty_items_reset_progress() {
        let api = MockPipelineApi::new();
        let doc = test_document(api.clone());
        add_node(&doc, "it", |p: &mut IteratorParams| {
            p.items = " \n\n".to_string();
            p.completed_count = 2;
            p.total_count = 2;
            p.last_result_url = Some("mock://old".to_string());
        });

        let result = run_node(&doc, "it", InputValues::new()).await.unwrap();

        assert!(api.calls().is_empty());
        assert!(output(&result, IteratorNode::PORT_OUTPUT).is_null());
        assert!(output(&result, IteratorNode::PORT_CURRENT_ITEM).is_null());
        let params: IteratorParams = params_of(&doc, "it");
        assert_eq!((params.completed_count, params.total_count), (0, 0));
        assert_eq!(params.last_result_url, None);
    }

    #[tokio::test]
    async fn test_items_without_template() {
        let api = MockPipelineApi::new();
        let doc = test_document(api.clone());
        add_node(&doc, "it", |p: &mut IteratorParams| p.items = "moon".to_string());

        run_node(&doc, "it", InputValues::new()).await.unwrap();
        assert_eq!(api.generate_requests()[0].prompt, "moon");
    }

    #[tokio::test]
    async fn test_stopped_run_reports_last_processed_item() {
        let api = MockPipelineApi::new();
        let doc = test_document(api.clone());
        add_node(&doc, "it", |_: &mut IteratorParams| {});
        let ctx = Arc::new(NodeContext::standalone("it", doc.clone()));
        let stopper = ctx.clone();
        api.after_generate(move |n| {
            if n == 2 {
                stopper.stop_run();
            }
        });

        let node = doc.get_node("it").unwrap();
        let operation = doc.registry().operation_for(&node).unwrap();
        let result = operation.execute(&ctx, &node, InputValues::new()).await.unwrap();

        assert_eq!(api.generate_requests().len(), 2);
        assert_eq!(
            output(&result, IteratorNode::PORT_OUTPUT).as_text(),
            Some("mock://generate/2")
        );
        assert_eq!(
            output(&result, IteratorNode::PORT_CURRENT_ITEM).as_text(),
            Some("dog")
        );
        // The second write-back came after the stop.
        let params: IteratorParams = params_of(&doc, "it");
        assert_eq!(params.completed_count, 1);
    }
}
