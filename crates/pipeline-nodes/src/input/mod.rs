//! Input nodes
//!
//! Parameter-only sources: they have no inputs and emit what the user set.

mod load_image;
mod model;
mod number;
mod prompt;

pub use load_image::LoadImageNode;
pub use model::ModelNode;
pub use number::NumberNode;
pub use prompt::PromptNode;
