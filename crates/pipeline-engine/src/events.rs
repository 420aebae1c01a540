//! Event types for streaming run progress
//!
//! Events are sent from the scheduler to the editing UI (or any consumer)
//! to report run lifecycle, per-node state changes and progress.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Receiver of scheduler events
///
/// Sinks are called synchronously from the scheduler, so `send` must not
/// block.
pub trait EventSink: Send + Sync {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError>;
}

/// A sink refused an event
#[derive(Debug, Clone, Error)]
#[error("event sink: {reason}")]
pub struct EventError {
    pub reason: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            reason: "receiver dropped".to_string(),
        }
    }
}

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// Run started executing
    #[serde(rename_all = "camelCase")]
    RunStarted {
        run_id: String,
        starting_node_ids: Vec<String>,
    },

    /// All reachable work finished
    #[serde(rename_all = "camelCase")]
    RunCompleted { run_id: String },

    /// A node operation failed and the run was aborted
    #[serde(rename_all = "camelCase")]
    RunFailed { run_id: String, error: String },

    /// Run was stopped before completing
    #[serde(rename_all = "camelCase")]
    RunStopped { run_id: String },

    /// A node's inputs resolved and its operation started
    #[serde(rename_all = "camelCase")]
    NodeStarted { node_id: String, run_id: String },

    /// A node's outputs were recorded
    #[serde(rename_all = "camelCase")]
    NodeCompleted { node_id: String, run_id: String },

    /// A node's operation failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node_id: String,
        run_id: String,
        error: String,
    },

    /// Progress reported by a long-running node
    #[serde(rename_all = "camelCase")]
    NodeProgress {
        node_id: String,
        run_id: String,
        completed: usize,
        total: usize,
    },
}

impl PipelineEvent {
    /// Create a node progress event
    pub fn node_progress(node_id: &str, run_id: &str, completed: usize, total: usize) -> Self {
        Self::NodeProgress {
            node_id: node_id.to_string(),
            run_id: run_id.to_string(),
            completed,
            total,
        }
    }

    /// Node this event concerns, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::NodeProgress { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Drops every event
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: PipelineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Keeps every event in memory, in emission order
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<PipelineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events to an unbounded channel, typically drained by a UI task
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .map_err(|_| EventError::channel_closed())
    }
}
