//! Pipeline Nodes
//!
//! Built-in node kinds for the image pipeline engine, plus the client for
//! the generation provider they call.
//!
//! # Categories
//!
//! - **Input**: parameter-only sources (model, prompt, number, image)
//! - **Generation**: provider-backed image and text generation
//! - **Processing**: upscale, local colour adjust and blend, prompt concat
//! - **Control**: routing one value to several consumers
//! - **Output**: preview sinks
//!
//! # Example
//!
//! ```ignore
//! use pipeline_nodes::{builtin_registry, HttpPipelineApi, PipelineConfig};
//!
//! let api = Arc::new(HttpPipelineApi::new(&PipelineConfig::from_env())?);
//! let document = Arc::new(Document::new(Arc::new(builtin_registry(api))));
//! ```

pub mod api;
pub mod builtins;
pub mod config;
pub mod control;
pub mod generation;
pub mod imaging;
pub mod input;
pub mod kinds;
pub mod output;
pub mod processing;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiError, HttpPipelineApi, PipelineApi};
pub use builtins::{builtin_registry, BuiltinNode, NodeServices};
pub use config::PipelineConfig;
pub use control::*;
pub use generation::*;
pub use input::*;
pub use kinds::{NodeParams, PipelineNode, NODE_TYPES};
pub use output::*;
pub use processing::*;
