//! Run control and the per-node context handed to operations

use std::sync::Arc;

use parking_lot::Mutex;

use crate::document::NodeRepository;
use crate::error::{PipelineError, Result};
use crate::events::{EventSink, NullEventSink, PipelineEvent};
use crate::types::{Node, NodeKind, RunId};

/// Lifecycle of a run as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Waiting,
    Executing,
    Stopped,
}

/// Shared run flag, checked at node entry and before every write-back
pub(crate) struct RunControl {
    id: RunId,
    state: Mutex<RunState>,
}

impl RunControl {
    pub(crate) fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: Mutex::new(RunState::Waiting),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub(crate) fn is_executing(&self) -> bool {
        self.state() == RunState::Executing
    }

    /// Waiting -> Executing; anything else is a second execute
    pub(crate) fn begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != RunState::Waiting {
            return Err(PipelineError::AlreadyExecuted);
        }
        *state = RunState::Executing;
        Ok(())
    }

    /// Move to Stopped; returns true if the run was not already stopped
    pub(crate) fn stop(&self) -> bool {
        let mut state = self.state.lock();
        let changed = *state != RunState::Stopped;
        *state = RunState::Stopped;
        changed
    }

    /// Run `f` only while the run is executing, holding the state lock
    pub(crate) fn while_executing<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let state = self.state.lock();
        (*state == RunState::Executing).then(f)
    }
}

/// Context for one node execution
///
/// Gives an operation access to its own node in the document. Every
/// write goes through the run flag, so a stopped run cannot mutate the
/// document after the fact.
pub struct NodeContext<N: NodeKind> {
    node_id: String,
    run: Arc<RunControl>,
    repository: Arc<dyn NodeRepository<N>>,
    events: Arc<dyn EventSink>,
}

impl<N: NodeKind> NodeContext<N> {
    pub(crate) fn new(
        node_id: impl Into<String>,
        run: Arc<RunControl>,
        repository: Arc<dyn NodeRepository<N>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            run,
            repository,
            events,
        }
    }

    /// A context outside any scheduled run, always active
    ///
    /// Used to invoke an operation directly (tests, single-node tools).
    pub fn standalone(node_id: impl Into<String>, repository: Arc<dyn NodeRepository<N>>) -> Self {
        let run = Arc::new(RunControl::new());
        *run.state.lock() = RunState::Executing;
        Self::new(node_id, run, repository, Arc::new(NullEventSink))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn run_id(&self) -> &str {
        self.run.id()
    }

    /// Whether the owning run is still executing
    pub fn is_active(&self) -> bool {
        self.run.is_executing()
    }

    /// Current state of this node in the document
    pub fn current(&self) -> Option<Node<N>> {
        self.repository.get_node(&self.node_id)
    }

    /// Patch this node's kind in the document
    ///
    /// Returns `Ok(false)` without writing when the run has been stopped.
    pub fn update_node(&self, update: impl FnOnce(&mut N)) -> Result<bool> {
        let mut update = Some(update);
        let written = self.run.while_executing(|| {
            self.repository.update_node(&self.node_id, &mut |kind| {
                if let Some(f) = update.take() {
                    f(kind);
                }
            })
        });
        match written {
            Some(result) => result.map(|_| true),
            None => {
                log::debug!(
                    "Dropping write to node {} from stopped run {}",
                    self.node_id,
                    self.run.id()
                );
                Ok(false)
            }
        }
    }

    /// Stop the run this node belongs to
    ///
    /// Every node of the run loses its writes and progress from here on.
    pub fn stop_run(&self) {
        if self.run.stop() {
            log::info!("Run {} stopped by node {}", self.run.id(), self.node_id);
            let event = PipelineEvent::RunStopped {
                run_id: self.run.id().to_string(),
            };
            if let Err(e) = self.events.send(event) {
                log::warn!("Failed to send stop for run {}: {}", self.run.id(), e);
            }
        }
    }

    /// Report progress of a long-running operation
    pub fn report_progress(&self, completed: usize, total: usize) {
        if !self.is_active() {
            return;
        }
        let event = PipelineEvent::node_progress(&self.node_id, self.run.id(), completed, total);
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to send progress for {}: {}", self.node_id, e);
        }
    }
}
