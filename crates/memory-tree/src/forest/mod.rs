//! Forest algorithms over the flat node table
//!
//! Both operate on a per-request snapshot from the node store; no tree is
//! cached between requests.

pub mod assembler;
pub mod descendants;

pub use assembler::{build_forest, TreeNode};
pub use descendants::collect_subtree;
