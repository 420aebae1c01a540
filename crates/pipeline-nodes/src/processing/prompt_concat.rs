//! Prompt Concat Node
//!
//! Joins prefix, main and suffix text with a chosen separator, skipping
//! empty or non-text parts.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    outputs, port_map, ExecutionResult, InfoValue, InfoValues, InputValues, Node, NodeContext,
    NodeOperation, OutputValue, PipelineValue, PortDataType, PortDefinition, PortMap, Result,
};

use crate::builtins::{processor_out_of_date, BuiltinNode, NodeServices};
use crate::kinds::{params, NodeParams, PipelineNode, PromptConcatParams, Separator};

pub struct PromptConcatNode;

impl PromptConcatNode {
    pub const PORT_PREFIX: &'static str = "prefix";
    pub const PORT_MAIN: &'static str = "main";
    pub const PORT_SUFFIX: &'static str = "suffix";
    pub const PORT_OUTPUT: &'static str = "output";

    const PARTS: [&'static str; 3] = [Self::PORT_PREFIX, Self::PORT_MAIN, Self::PORT_SUFFIX];

    fn create(_services: &NodeServices) -> Arc<dyn NodeOperation<PipelineNode>> {
        Arc::new(Self)
    }

    fn join<'a>(parts: impl Iterator<Item = Option<&'a str>>, separator: Separator) -> String {
        parts
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(separator.as_str())
    }
}

inventory::submit!(BuiltinNode::new(
    PromptConcatParams::NODE_TYPE,
    PromptConcatNode::create
));

#[async_trait]
impl NodeOperation<PipelineNode> for PromptConcatNode {
    fn ports(&self, _node: &Node<PipelineNode>) -> PortMap {
        port_map([
            PortDefinition::input(Self::PORT_PREFIX, PortDataType::Text),
            PortDefinition::input(Self::PORT_MAIN, PortDataType::Text),
            PortDefinition::input(Self::PORT_SUFFIX, PortDataType::Text),
            PortDefinition::output(Self::PORT_OUTPUT, PortDataType::Text),
        ])
    }

    async fn execute(
        &self,
        _ctx: &NodeContext<PipelineNode>,
        node: &Node<PipelineNode>,
        inputs: InputValues,
    ) -> Result<ExecutionResult> {
        let separator = params::<PromptConcatParams>(node)?.separator;
        let parts = Self::PARTS
            .iter()
            .map(|port| inputs.get_input(port).and_then(PipelineValue::as_text));
        let text = Self::join(parts, separator);
        Ok(outputs([(Self::PORT_OUTPUT, text.into())]))
    }

    fn output_info(&self, node: &Node<PipelineNode>, inputs: &InfoValues) -> InfoValues {
        let separator = PromptConcatParams::from_kind(&node.kind)
            .map(|p| p.separator)
            .unwrap_or_default();
        let parts = Self::PARTS
            .iter()
            .map(|port| inputs.get(*port).and_then(InfoValue::text));
        let text = Self::join(parts, separator);
        let value = if text.is_empty() {
            OutputValue::null()
        } else {
            text.into()
        };
        InfoValues::from([(
            Self::PORT_OUTPUT.to_string(),
            InfoValue::new(value, processor_out_of_date(node, inputs), PortDataType::Text),
        )])
    }
}
