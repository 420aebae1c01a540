//! Generation nodes
//!
//! Nodes that call the generation provider and remember their last result
//! on the node so previews survive between runs.

mod controlnet;
mod generate;
mod generate_text;
mod ip_adapter;
mod iterator;
mod style_transfer;

pub use controlnet::ControlNetNode;
pub use generate::GenerateNode;
pub use generate_text::GenerateTextNode;
pub use ip_adapter::IpAdapterNode;
pub use iterator::IteratorNode;
pub use style_transfer::StyleTransferNode;
