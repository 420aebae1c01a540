//! Processing nodes
//!
//! Transform images or text. Upscale goes through the provider; adjust and
//! blend work on pixels locally; prompt-concat is pure text.

mod adjust;
mod blend;
mod prompt_concat;
mod upscale;

pub use adjust::AdjustNode;
pub use blend::BlendNode;
pub use prompt_concat::PromptConcatNode;
pub use upscale::UpscaleNode;
