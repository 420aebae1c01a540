//! Output nodes

mod preview;

pub use preview::PreviewNode;
