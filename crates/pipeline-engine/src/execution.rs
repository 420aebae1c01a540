//! Single-use execution graph and its scheduler
//!
//! A run discovers the nodes downstream of its starting set once, then
//! drives them with `execute_node_if_ready`: each node runs when every
//! in-run producer has finished, and on completion fans out to its
//! dependents. Fan-out is a `try_join_all` inside the caller's task, so
//! no tasks are spawned and the first failure aborts the whole run.
//!
//! Per-node records only move forward (`waiting -> executing -> executed`),
//! which keeps a malformed (cyclic) graph from looping.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{try_join_all, BoxFuture};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::builder::{build_graph, DiscoveredGraph, DiscoveredNode};
use crate::context::{NodeContext, RunControl, RunState};
use crate::document::{Document, NodeRepository};
use crate::error::Result;
use crate::events::{EventSink, NullEventSink, PipelineEvent};
use crate::registry::NodeRegistry;
use crate::types::{ExecutionResult, InputValues, NodeId, NodeKind, OutputValue, PortMap};

/// Public view of a node's state within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Waiting,
    Executing,
    Executed,
}

enum NodeRecord {
    Waiting,
    Executing,
    Executed(ExecutionResult),
}

impl NodeRecord {
    fn status(&self) -> NodeStatus {
        match self {
            NodeRecord::Waiting => NodeStatus::Waiting,
            NodeRecord::Executing => NodeStatus::Executing,
            NodeRecord::Executed(_) => NodeStatus::Executed,
        }
    }
}

/// One execution attempt over a discovered subgraph
pub struct ExecutionGraph<N: NodeKind> {
    run: Arc<RunControl>,
    repository: Arc<dyn NodeRepository<N>>,
    registry: Arc<NodeRegistry<N>>,
    events: Arc<dyn EventSink>,
    starting_node_ids: Vec<NodeId>,
    graph: DiscoveredGraph<N>,
    records: Mutex<HashMap<NodeId, NodeRecord>>,
}

impl<N: NodeKind> ExecutionGraph<N> {
    /// Discover the run's nodes; topology is fixed from here on
    pub fn new(
        repository: Arc<dyn NodeRepository<N>>,
        registry: Arc<NodeRegistry<N>>,
        starting_node_ids: Vec<NodeId>,
    ) -> Self {
        let graph = build_graph(&*repository, &starting_node_ids);
        let records = graph
            .keys()
            .map(|id| (id.clone(), NodeRecord::Waiting))
            .collect();
        Self {
            run: Arc::new(RunControl::new()),
            repository,
            registry,
            events: Arc::new(NullEventSink),
            starting_node_ids,
            graph,
            records: Mutex::new(records),
        }
    }

    /// Build a run over a document, using the document's registry
    pub fn for_document(document: Arc<Document<N>>, starting_node_ids: Vec<NodeId>) -> Self {
        let registry = document.registry().clone();
        Self::new(document, registry, starting_node_ids)
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn run_id(&self) -> &str {
        self.run.id()
    }

    pub fn state(&self) -> RunState {
        self.run.state()
    }

    /// Ids of every node taking part in this run, sorted
    pub fn discovered_node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.graph.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// State of a node in this run, `None` for nodes outside it
    pub fn get_node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.records.lock().get(node_id).map(NodeRecord::status)
    }

    /// Outputs recorded for an executed node
    pub fn outputs(&self, node_id: &str) -> Option<ExecutionResult> {
        match self.records.lock().get(node_id)? {
            NodeRecord::Executed(outputs) => Some(outputs.clone()),
            _ => None,
        }
    }

    /// Stop the run; work in flight finishes but its results are dropped
    pub fn stop(&self) {
        if self.run.stop() {
            log::info!("Run {} stopped", self.run.id());
            self.emit(PipelineEvent::RunStopped {
                run_id: self.run.id().to_string(),
            });
        }
    }

    /// Start the run
    ///
    /// Fails immediately with `AlreadyExecuted` if this graph has been
    /// started (or stopped) before. The returned future drives the run to
    /// completion; dropping it stops the run.
    pub fn execute(&self) -> Result<BoxFuture<'_, Result<()>>> {
        self.run.begin()?;
        log::info!(
            "Run {} started from {:?} ({} nodes)",
            self.run.id(),
            self.starting_node_ids,
            self.graph.len()
        );
        self.emit(PipelineEvent::RunStarted {
            run_id: self.run.id().to_string(),
            starting_node_ids: self.starting_node_ids.clone(),
        });

        let guard = StopOnDrop(self.run.clone());
        Ok(Box::pin(async move {
            let _guard = guard;
            let attempts = self
                .starting_node_ids
                .iter()
                .map(|id| self.execute_node_if_ready(id.clone()));
            let result = try_join_all(attempts).await.map(|_| ());
            let finished = self.run.stop();
            let run_id = self.run.id().to_string();
            match &result {
                Ok(()) if finished => {
                    log::info!("Run {} completed", run_id);
                    self.emit(PipelineEvent::RunCompleted { run_id });
                }
                Ok(()) => {}
                Err(e) => {
                    log::warn!("Run {} failed: {}", run_id, e);
                    self.emit(PipelineEvent::RunFailed {
                        run_id,
                        error: e.to_string(),
                    });
                }
            }
            result
        }))
    }

    fn execute_node_if_ready(&self, node_id: NodeId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.run.is_executing() {
                return Ok(());
            }
            let Some(discovered) = self.graph.get(&node_id) else {
                return Ok(());
            };
            let Some(node) = self.repository.get_node(&node_id) else {
                log::warn!("Node {} disappeared before it could run", node_id);
                return Ok(());
            };
            let operation = self.registry.operation_for(&node)?;
            let ports = operation.ports(&node);
            let Some(inputs) = self
                .run
                .while_executing(|| self.claim(discovered, &ports))
                .flatten()
            else {
                return Ok(());
            };

            log::debug!("Executing node {} ({})", node_id, node.type_tag());
            let stale = StaleFlag::mark(&*self.repository, &node_id, self.run.id());
            self.emit(PipelineEvent::NodeStarted {
                node_id: node_id.clone(),
                run_id: self.run.id().to_string(),
            });
            let ctx = NodeContext::new(
                node_id.clone(),
                self.run.clone(),
                self.repository.clone(),
                self.events.clone(),
            );
            let result = operation.execute(&ctx, &node, inputs).await;
            drop(stale);

            let outputs = match result {
                Ok(outputs) => outputs,
                Err(e) => {
                    log::warn!("Node {} failed: {}", node_id, e);
                    self.emit(PipelineEvent::NodeFailed {
                        node_id: node_id.clone(),
                        run_id: self.run.id().to_string(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            };

            let recorded = self
                .run
                .while_executing(|| {
                    self.records
                        .lock()
                        .insert(node_id.clone(), NodeRecord::Executed(outputs));
                })
                .is_some();
            if !recorded {
                log::warn!(
                    "Discarding result of node {} from stopped run {}",
                    node_id,
                    self.run.id()
                );
                return Ok(());
            }
            self.emit(PipelineEvent::NodeCompleted {
                node_id: node_id.clone(),
                run_id: self.run.id().to_string(),
            });

            let dependents = discovered
                .outbound()
                .map(|c| self.execute_node_if_ready(c.connected_node_id.clone()));
            try_join_all(dependents).await?;
            Ok(())
        })
    }

    /// Resolve inputs and move the node to `executing`, atomically
    ///
    /// Returns `None` when the node is not waiting, a producer is not
    /// ready, or a producer emitted the stop sentinel.
    fn claim(&self, discovered: &DiscoveredNode<N>, ports: &PortMap) -> Option<InputValues> {
        let node_id = &discovered.node.id;
        let mut records = self.records.lock();
        if !matches!(records.get(node_id), Some(NodeRecord::Waiting)) {
            return None;
        }

        let mut inbound: Vec<_> = discovered.inbound().collect();
        inbound.sort_by_key(|c| c.order);

        let mut inputs = InputValues::new();
        for connection in inbound {
            let producer = &connection.connected_node_id;
            let value = match records.get(producer) {
                Some(NodeRecord::Executed(outputs)) => outputs
                    .get(&connection.connected_port_id)
                    .cloned()
                    .unwrap_or_else(OutputValue::null),
                Some(_) => {
                    log::debug!("Node {} waits for {}", node_id, producer);
                    return None;
                }
                None => {
                    let snapshot = self
                        .repository
                        .last_output_snapshot(producer)
                        .and_then(|mut info| info.remove(&connection.connected_port_id))
                        .and_then(|info| info.first().cloned());
                    match snapshot {
                        Some(value) => value,
                        None => {
                            log::debug!(
                                "Node {} has no snapshot for {}.{}",
                                node_id,
                                producer,
                                connection.connected_port_id
                            );
                            return None;
                        }
                    }
                }
            };
            let Some(value) = value.value() else {
                log::debug!("Node {} skipped: {} stopped", node_id, producer);
                return None;
            };
            let multi = ports
                .get(&connection.own_port_id)
                .is_some_and(|port| port.multi);
            inputs.accumulate(&connection.own_port_id, value.clone(), multi);
        }

        records.insert(node_id.clone(), NodeRecord::Executing);
        Some(inputs)
    }

    fn emit(&self, event: PipelineEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to send event for run {}: {}", self.run.id(), e);
        }
    }
}

/// Moves the run to `stopped` when the run future goes away
struct StopOnDrop(Arc<RunControl>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Holds a node's stale flag for the duration of its operation
struct StaleFlag<'a, N: NodeKind> {
    repository: &'a dyn NodeRepository<N>,
    node_id: &'a str,
    run_id: &'a str,
}

impl<'a, N: NodeKind> StaleFlag<'a, N> {
    fn mark(repository: &'a dyn NodeRepository<N>, node_id: &'a str, run_id: &'a str) -> Self {
        repository.mark_stale(node_id, run_id);
        Self {
            repository,
            node_id,
            run_id,
        }
    }
}

impl<N: NodeKind> Drop for StaleFlag<'_, N> {
    fn drop(&mut self) {
        self.repository.clear_stale(self.node_id, self.run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::{connect, connect_with_order};
    use crate::error::PipelineError;
    use crate::events::VecEventSink;
    use crate::testing::{init_logging, test_document_with_log, Gate, TestNode};
    use crate::types::{InputValue, PipelineValue};

    fn input_list(values: &[&str]) -> InputValue {
        InputValue::Multi(values.iter().map(|v| PipelineValue::from(*v)).collect())
    }

    #[tokio::test]
    async fn test_multi_input_keeps_creation_order() {
        init_logging();
        let (doc, log) = test_document_with_log();
        for id in ["a", "b", "c"] {
            doc.add_node(id, TestNode::source(id)).unwrap();
        }
        doc.add_node("collect", TestNode::Collect).unwrap();
        for id in ["a", "b", "c"] {
            connect(&doc, id, "out", "collect", "in").unwrap();
        }

        let graph = ExecutionGraph::for_document(
            doc.clone(),
            vec!["c".to_string(), "b".to_string(), "a".to_string()],
        );
        graph.execute().unwrap().await.unwrap();

        let inputs = log.inputs_of("collect").unwrap();
        assert_eq!(inputs.get("in"), Some(&input_list(&["a", "b", "c"])));
        assert_eq!(
            graph.outputs("collect").unwrap()["out"],
            OutputValue::from("a+b+c")
        );
        assert_eq!(log.executed().iter().filter(|id| *id == "collect").count(), 1);
    }

    #[tokio::test]
    async fn test_fan_in_from_either_prompt() {
        for start in ["first", "second"] {
            let (doc, log) = test_document_with_log();
            doc.add_node("first", TestNode::source("one")).unwrap();
            doc.add_node("second", TestNode::source("two")).unwrap();
            doc.add_node("collect", TestNode::Collect).unwrap();
            connect_with_order(&doc, "second", "out", "collect", "in", 2).unwrap();
            connect_with_order(&doc, "first", "out", "collect", "in", 1).unwrap();

            let graph = ExecutionGraph::for_document(doc.clone(), vec![start.to_string()]);
            graph.execute().unwrap().await.unwrap();

            let inputs = log.inputs_of("collect").unwrap();
            assert_eq!(inputs.get("in"), Some(&input_list(&["one", "two"])));
            assert_eq!(graph.get_node_status("collect"), Some(NodeStatus::Executed));
        }
    }

    #[tokio::test]
    async fn test_stop_output_leaves_consumer_waiting() {
        let (doc, log) = test_document_with_log();
        doc.add_node("halt", TestNode::Stop).unwrap();
        doc.add_node("sink", TestNode::Sink).unwrap();
        connect(&doc, "halt", "out", "sink", "in").unwrap();

        let graph = ExecutionGraph::for_document(doc.clone(), vec!["halt".to_string()]);
        graph.execute().unwrap().await.unwrap();

        assert_eq!(graph.get_node_status("halt"), Some(NodeStatus::Executed));
        assert_eq!(graph.get_node_status("sink"), Some(NodeStatus::Waiting));
        assert_eq!(graph.state(), RunState::Stopped);
        assert_eq!(log.executed(), vec!["halt"]);
    }

    #[tokio::test]
    async fn test_second_execute_fails_before_any_work() {
        let (doc, log) = test_document_with_log();
        doc.add_node("a", TestNode::source("a")).unwrap();
        let graph = ExecutionGraph::for_document(doc.clone(), vec!["a".to_string()]);

        let first = graph.execute().unwrap();
        assert!(matches!(graph.execute(), Err(PipelineError::AlreadyExecuted)));
        drop(first);

        assert!(log.executed().is_empty());
        assert_eq!(graph.state(), RunState::Stopped);
        assert!(matches!(graph.execute(), Err(PipelineError::AlreadyExecuted)));
    }

    #[tokio::test]
    async fn test_diamond_runs_join_node_once_after_both_branches() {
        let (doc, log) = test_document_with_log();
        doc.add_node("a", TestNode::source("a")).unwrap();
        doc.add_node("b", TestNode::pass()).unwrap();
        doc.add_node("c", TestNode::pass()).unwrap();
        doc.add_node("d", TestNode::Collect).unwrap();
        connect(&doc, "a", "out", "b", "in").unwrap();
        connect(&doc, "a", "out", "c", "in").unwrap();
        connect(&doc, "b", "out", "d", "in").unwrap();
        connect(&doc, "c", "out", "d", "in").unwrap();

        let graph = ExecutionGraph::for_document(doc.clone(), vec!["a".to_string()]);
        assert_eq!(graph.discovered_node_ids(), vec!["a", "b", "c", "d"]);
        graph.execute().unwrap().await.unwrap();

        let executed = log.executed();
        assert_eq!(executed.len(), 4);
        let d = log.position("d").unwrap();
        assert!(log.position("b").unwrap() < d);
        assert!(log.position("c").unwrap() < d);
        assert_eq!(graph.outputs("d").unwrap()["out"], OutputValue::from("a+a"));
    }

    #[tokio::test]
    async fn test_parameter_edit_mid_run_is_observed() {
        let (doc, _log) = test_document_with_log();
        let gate = Gate::default();
        doc.add_node("g", TestNode::gate(&gate)).unwrap();
        doc.add_node("t", TestNode::tagged("before")).unwrap();
        connect(&doc, "g", "out", "t", "in").unwrap();

        let graph = ExecutionGraph::for_document(doc.clone(), vec!["g".to_string()]);
        let run = graph.execute().unwrap();
        let edit = async {
            tokio::task::yield_now().await;
            doc.update_node("t", |kind| *kind = TestNode::tagged("edited"))
                .unwrap();
            gate.release();
        };
        let (result, ()) = tokio::join!(run, edit);
        result.unwrap();

        assert_eq!(graph.outputs("t").unwrap()["out"], OutputValue::from("edited"));
    }

    #[tokio::test]
    async fn test_completion_after_stop_is_discarded() {
        let (doc, _log) = test_document_with_log();
        let gate = Gate::default();
        doc.add_node("g", TestNode::gate(&gate)).unwrap();
        doc.add_node("sink", TestNode::Sink).unwrap();
        connect(&doc, "g", "out", "sink", "in").unwrap();
        let events = Arc::new(VecEventSink::new());

        let graph = ExecutionGraph::for_document(doc.clone(), vec!["g".to_string()])
            .with_events(events.clone());
        let run = graph.execute().unwrap();
        let cancel = async {
            tokio::task::yield_now().await;
            assert!(doc.get_node("g").unwrap().is_out_of_date());
            graph.stop();
            gate.release();
        };
        let (result, ()) = tokio::join!(run, cancel);
        result.unwrap();

        assert_eq!(graph.get_node_status("g"), Some(NodeStatus::Executing));
        assert_eq!(graph.get_node_status("sink"), Some(NodeStatus::Waiting));
        assert!(graph.outputs("g").is_none());
        let node = doc.get_node("g").unwrap();
        assert_eq!(node.kind, TestNode::gate(&gate));
        assert!(!node.is_out_of_date());

        let events = events.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::RunStopped { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, PipelineEvent::RunCompleted { .. })));
    }

    #[tokio::test]
    async fn test_failure_aborts_run_and_clears_stale_flag() {
        let (doc, log) = test_document_with_log();
        doc.add_node("a", TestNode::source("a")).unwrap();
        doc.add_node("f", TestNode::Fail).unwrap();
        doc.add_node("s", TestNode::Sink).unwrap();
        connect(&doc, "a", "out", "f", "in").unwrap();
        connect(&doc, "f", "out", "s", "in").unwrap();
        let events = Arc::new(VecEventSink::new());

        let graph = ExecutionGraph::for_document(doc.clone(), vec!["a".to_string()])
            .with_events(events.clone());
        let result = graph.execute().unwrap().await;

        assert!(matches!(result, Err(PipelineError::OperationFailed(_))));
        assert_eq!(graph.state(), RunState::Stopped);
        assert_eq!(log.executed(), vec!["a", "f"]);
        assert!(!doc.get_node("f").unwrap().is_out_of_date());

        let events = events.events();
        assert!(events.iter().any(
            |e| matches!(e, PipelineEvent::NodeFailed { node_id, .. } if node_id == "f")
        ));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::RunFailed { .. })));
    }

    #[tokio::test]
    async fn test_outside_producer_is_read_from_snapshot() {
        let (doc, log) = test_document_with_log();
        doc.add_node("a", TestNode::source("a")).unwrap();
        doc.add_node("idle", TestNode::Fail).unwrap();
        doc.add_node("collect", TestNode::Collect).unwrap();
        connect(&doc, "a", "out", "collect", "in").unwrap();
        connect(&doc, "idle", "out", "collect", "in").unwrap();

        let graph = ExecutionGraph::for_document(doc.clone(), vec!["a".to_string()]);
        graph.execute().unwrap().await.unwrap();

        assert_eq!(graph.get_node_status("idle"), None);
        let inputs = log.inputs_of("collect").unwrap();
        assert_eq!(
            inputs.get("in"),
            Some(&InputValue::Multi(vec![
                PipelineValue::from("a"),
                PipelineValue::Null
            ]))
        );
    }
}
