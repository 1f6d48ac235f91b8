//! inkwell/crates/domains/src/lib.rs
//!
//! The central domain model and interface definitions for Inkwell.

pub mod errors;
pub mod models;
pub mod policy;
pub mod ports;
pub mod slug;
pub mod tree;
pub mod validation;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use policy::*;
pub use ports::*;
pub use tree::{build_forest, Placement, TreeItem, TreeNode, TreePosition};
