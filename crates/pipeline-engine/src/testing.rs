//! Test node kinds shared by the engine's unit tests

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::context::NodeContext;
use crate::document::Document;
use crate::error::{PipelineError, Result};
use crate::registry::{NodeOperation, NodeRegistry};
use crate::types::{
    any_out_of_date, outputs, port_map, ExecutionResult, InfoValue, InfoValues, InputValues,
    Node, NodeId, NodeKind, OutputValue, PipelineValue, PortDataType, PortDefinition, PortMap,
};

/// Release handle for a `gate` node
#[derive(Clone, Default)]
pub struct Gate(Arc<Notify>);

impl Gate {
    pub fn release(&self) {
        self.0.notify_one();
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Gate")
    }
}

impl PartialEq for Gate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestNode {
    /// Emits `value` on `out`
    Source {
        value: PipelineValue,
        data_type: PortDataType,
    },
    /// Emits the stop sentinel on `out`
    Stop,
    /// Forwards `in` to `out`
    Pass { data_type: PortDataType },
    /// Joins every value on the multi port `in` with `+`
    Collect,
    /// Emits its label, ignoring `in`
    Tagged { label: String },
    /// Waits for its gate, then marks itself completed
    Gate { gate: Gate, completed: bool },
    /// Always fails
    Fail,
    /// Consumes `in`, no outputs
    Sink,
}

impl TestNode {
    pub fn source(text: &str) -> Self {
        TestNode::Source {
            value: text.into(),
            data_type: PortDataType::Text,
        }
    }

    pub fn typed_source(value: impl Into<PipelineValue>, data_type: PortDataType) -> Self {
        TestNode::Source {
            value: value.into(),
            data_type,
        }
    }

    pub fn pass() -> Self {
        TestNode::Pass {
            data_type: PortDataType::Any,
        }
    }

    pub fn tagged(label: &str) -> Self {
        TestNode::Tagged {
            label: label.to_string(),
        }
    }

    pub fn gate(gate: &Gate) -> Self {
        TestNode::Gate {
            gate: gate.clone(),
            completed: false,
        }
    }
}

impl NodeKind for TestNode {
    fn type_tag(&self) -> &'static str {
        match self {
            TestNode::Source { .. } => "source",
            TestNode::Stop => "stop",
            TestNode::Pass { .. } => "pass",
            TestNode::Collect => "collect",
            TestNode::Tagged { .. } => "tagged",
            TestNode::Gate { .. } => "gate",
            TestNode::Fail => "fail",
            TestNode::Sink => "sink",
        }
    }
}

/// Records hook calls and executions across a test
#[derive(Default)]
pub struct TestLog {
    hooks: Mutex<Vec<String>>,
    executions: Mutex<Vec<(NodeId, InputValues)>>,
}

impl TestLog {
    pub fn hooks(&self) -> Vec<String> {
        self.hooks.lock().clone()
    }

    /// Node ids in the order their operations started
    pub fn executed(&self) -> Vec<NodeId> {
        self.executions.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn inputs_of(&self, node_id: &str) -> Option<InputValues> {
        self.executions
            .lock()
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, inputs)| inputs.clone())
    }

    pub fn position(&self, node_id: &str) -> Option<usize> {
        self.executed().iter().position(|id| id == node_id)
    }
}

struct TestOperation {
    log: Arc<TestLog>,
}

#[async_trait]
impl NodeOperation<TestNode> for TestOperation {
    fn ports(&self, node: &Node<TestNode>) -> PortMap {
        let input = PortDefinition::input("in", PortDataType::Any);
        let output = PortDefinition::output("out", PortDataType::Any);
        match &node.kind {
            TestNode::Source { data_type, .. } => {
                port_map([PortDefinition::output("out", *data_type)])
            }
            TestNode::Stop => port_map([output]),
            TestNode::Pass { data_type } => port_map([
                PortDefinition::input("in", *data_type),
                PortDefinition::output("out", *data_type),
            ]),
            TestNode::Collect => port_map([
                input.multi(),
                PortDefinition::output("out", PortDataType::Text),
            ]),
            TestNode::Tagged { .. } => port_map([
                input,
                PortDefinition::output("out", PortDataType::Text),
            ]),
            TestNode::Gate { .. } | TestNode::Fail => port_map([input, output]),
            TestNode::Sink => port_map([input]),
        }
    }

    async fn execute(
        &self,
        ctx: &NodeContext<TestNode>,
        node: &Node<TestNode>,
        inputs: InputValues,
    ) -> Result<ExecutionResult> {
        self.log
            .executions
            .lock()
            .push((node.id.clone(), inputs.clone()));

        match &node.kind {
            TestNode::Source { value, .. } => Ok(outputs([("out", value.clone().into())])),
            TestNode::Stop => Ok(outputs([("out", OutputValue::Stop)])),
            TestNode::Pass { .. } => {
                let value = inputs.get_input("in").cloned().unwrap_or_default();
                Ok(outputs([("out", value.into())]))
            }
            TestNode::Collect => {
                let joined = inputs
                    .get_input_multi("in")
                    .iter()
                    .filter_map(PipelineValue::to_text)
                    .collect::<Vec<_>>()
                    .join("+");
                Ok(outputs([("out", joined.into())]))
            }
            TestNode::Tagged { label } => Ok(outputs([("out", label.as_str().into())])),
            TestNode::Gate { gate, .. } => {
                gate.0.notified().await;
                ctx.update_node(|kind| {
                    if let TestNode::Gate { completed, .. } = kind {
                        *completed = true;
                    }
                })?;
                Ok(outputs([("out", "gated".into())]))
            }
            TestNode::Fail => Err(PipelineError::failed("boom")),
            TestNode::Sink => Ok(ExecutionResult::new()),
        }
    }

    fn output_info(&self, node: &Node<TestNode>, inputs: &InfoValues) -> InfoValues {
        let stale = any_out_of_date(inputs) || node.is_out_of_date();
        let value: OutputValue = match &node.kind {
            TestNode::Source { value, .. } => value.clone().into(),
            TestNode::Stop => OutputValue::Stop,
            TestNode::Pass { .. } => inputs
                .get("in")
                .and_then(InfoValue::first)
                .cloned()
                .unwrap_or_else(OutputValue::null),
            TestNode::Tagged { label } => label.as_str().into(),
            TestNode::Sink => return InfoValues::new(),
            TestNode::Collect | TestNode::Gate { .. } | TestNode::Fail => OutputValue::null(),
        };
        let mut info = InfoValues::new();
        info.insert("out".to_string(), InfoValue::new(value, stale, PortDataType::Any));
        info
    }

    fn on_port_connect(&self, node: &mut Node<TestNode>, port: &str) {
        self.log
            .hooks
            .lock()
            .push(format!("connect {}.{}", node.id, port));
    }

    fn on_port_disconnect(&self, node: &mut Node<TestNode>, port: &str) {
        self.log
            .hooks
            .lock()
            .push(format!("disconnect {}.{}", node.id, port));
    }
}

pub fn test_registry_with_log(log: Arc<TestLog>) -> NodeRegistry<TestNode> {
    let operation: Arc<dyn NodeOperation<TestNode>> = Arc::new(TestOperation { log });
    let mut registry = NodeRegistry::new();
    for tag in [
        "source", "stop", "pass", "collect", "tagged", "gate", "fail", "sink",
    ] {
        registry.register(tag, operation.clone());
    }
    registry
}

pub fn test_registry() -> NodeRegistry<TestNode> {
    test_registry_with_log(Arc::new(TestLog::default()))
}

pub fn test_document_with_log() -> (Arc<Document<TestNode>>, Arc<TestLog>) {
    let log = Arc::new(TestLog::default());
    let registry = Arc::new(test_registry_with_log(log.clone()));
    (Arc::new(Document::new(registry)), log)
}

pub fn test_document() -> Arc<Document<TestNode>> {
    test_document_with_log().0
}

/// Route engine logs to the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
