//! Control flow nodes

mod router;

pub use router::RouterNode;
