//! Pipeline Engine - dataflow execution for node-based image pipelines
//!
//! This crate provides the document model and scheduler behind a visual
//! pipeline editor. It supports:
//!
//! - Typed ports and connections made of `start`/`end` bindings
//! - Authoring checks: type compatibility, single occupancy, cycle refusal
//! - Forward discovery of the subgraph downstream of the played nodes
//! - Readiness-driven scheduling with concurrent fan-out
//! - Cooperative cancellation: stopped runs never write back
//! - Templates: save a node selection and stamp fresh copies of it
//!
//! # Architecture
//!
//! The engine is generic over a closed node-kind enum (`N: NodeKind`) and
//! dispatches to one `NodeOperation` per type tag:
//!
//! - `Document`: in-memory nodes, connections and bindings
//! - `ExecutionGraph`: one single-use run over a discovered subgraph
//! - `ExecutionState`: the one active run per document
//! - `EventSink`: run and node events (not tied to any UI)
//!
//! # Example
//!
//! ```ignore
//! use pipeline_engine::{authoring, Document, ExecutionState};
//!
//! let document = Arc::new(Document::new(registry));
//! document.add_node("prompt", prompt)?;
//! document.add_node("generate", generate)?;
//! authoring::connect(&document, "prompt", "output", "generate", "prompt")?;
//!
//! let state = ExecutionState::for_document(document.clone());
//! state.start_execution(vec!["prompt".to_string()]).await?;
//! ```

pub mod authoring;
mod bindings;
pub mod builder;
pub mod context;
pub mod document;
pub mod error;
pub mod events;
pub mod execution;
mod port_info;
pub mod regions;
pub mod registry;
pub mod state;
pub mod templates;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types
pub use authoring::DragOutcome;
pub use context::{NodeContext, RunState};
pub use document::{Binding, BindingProps, ConnectionBindings, Document, NodeRepository};
pub use error::{PipelineError, Result};
pub use events::{
    ChannelEventSink, EventError, EventSink, NullEventSink, PipelineEvent, VecEventSink,
};
pub use execution::{ExecutionGraph, NodeStatus};
pub use regions::PipelineRegion;
pub use registry::{NodeOperation, NodeRegistry};
pub use state::ExecutionState;
pub use templates::{PipelineTemplate, TemplateConnection, TemplateNode};
pub use types::*;
pub use validation::{are_compatible, find_first_compatible_port, would_create_cycle};
