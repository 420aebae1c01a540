//! Execution state: the one active run per document
//!
//! Starting a run stops whatever run was active before it. The slot is
//! cleared when the run finishes, is stopped, or its future is dropped,
//! and only ever by the run it still points at.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::document::{Document, NodeRepository};
use crate::error::Result;
use crate::events::{EventSink, NullEventSink};
use crate::execution::{ExecutionGraph, NodeStatus};
use crate::registry::NodeRegistry;
use crate::types::{NodeId, NodeKind};

pub struct ExecutionState<N: NodeKind> {
    repository: Arc<dyn NodeRepository<N>>,
    registry: Arc<NodeRegistry<N>>,
    events: Arc<dyn EventSink>,
    running: Mutex<Option<Arc<ExecutionGraph<N>>>>,
}

impl<N: NodeKind> ExecutionState<N> {
    pub fn new(repository: Arc<dyn NodeRepository<N>>, registry: Arc<NodeRegistry<N>>) -> Self {
        Self {
            repository,
            registry,
            events: Arc::new(NullEventSink),
            running: Mutex::new(None),
        }
    }

    /// Execution state over a document and its registry
    pub fn for_document(document: Arc<Document<N>>) -> Self {
        let registry = document.registry().clone();
        Self::new(document, registry)
    }

    /// Route events of every run started from here to `events`
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Stop the active run, if any, then run from `starting_node_ids`
    ///
    /// Resolves when the new run finishes, with the run's result.
    pub async fn start_execution(&self, starting_node_ids: Vec<NodeId>) -> Result<()> {
        let graph = {
            let mut running = self.running.lock();
            if let Some(previous) = running.take() {
                log::info!("Stopping run {} to start a new one", previous.run_id());
                previous.stop();
            }
            let graph = Arc::new(
                ExecutionGraph::new(
                    self.repository.clone(),
                    self.registry.clone(),
                    starting_node_ids,
                )
                .with_events(self.events.clone()),
            );
            *running = Some(graph.clone());
            graph
        };

        let _slot = SlotGuard {
            running: &self.running,
            graph: &graph,
        };
        let result = graph.execute()?.await;
        result
    }

    /// Stop the active run and free the slot immediately
    pub fn stop_execution(&self) {
        if let Some(graph) = self.running.lock().take() {
            graph.stop();
        }
    }

    /// Status of a node in the active run
    pub fn get_node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.running
            .lock()
            .as_ref()
            .and_then(|graph| graph.get_node_status(node_id))
    }

    pub fn current_run(&self) -> Option<Arc<ExecutionGraph<N>>> {
        self.running.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

/// Clears the slot on exit, if it still holds this run
struct SlotGuard<'a, N: NodeKind> {
    running: &'a Mutex<Option<Arc<ExecutionGraph<N>>>>,
    graph: &'a Arc<ExecutionGraph<N>>,
}

impl<N: NodeKind> Drop for SlotGuard<'_, N> {
    fn drop(&mut self) {
        let mut running = self.running.lock();
        if running
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, self.graph))
        {
            *running = None;
        }
    }
}
