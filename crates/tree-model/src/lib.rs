//! Tree Model Library
//!
//! Arena-backed node model for a headless hierarchical selection widget.
//!
//! # Core Concepts
//!
//! - **TreeNodeData**: Serializable, recursively nested input description
//! - **Forest**: Arena storing every node of a multi-root tree; parents own
//!   child indices, children keep a non-owning parent index
//! - **TreeNode**: Per-node structure (`level`, `index`, `path`) and flags
//! - **Tree**: Generic navigation trait with pre/post/breadth-first walkers
//!
//! # Example
//!
//! ```
//! use tree_model::prelude::*;
//!
//! let forest = Forest::from_data(&[
//!     TreeNodeData::new("docs", "Docs").child(TreeNodeData::new("readme", "README")),
//! ]);
//!
//! for id in forest.walk(TraversalOrder::PreOrder) {
//!     let node = forest.get(id).unwrap();
//!     println!("{:indent$}{}", "", node.label, indent = node.level * 2);
//! }
//! ```

mod data;
mod forest;
mod node;
mod traits;

pub use data::TreeNodeData;
pub use forest::Forest;
pub use node::{HighlightRange, NodeField, NodeFlags, NodeId, NodeKey, NodePath, TreeNode};
pub use traits::{TraversalOrder, Tree, TreeTraversal, TreeWalker};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        Forest, NodeField, NodeFlags, NodeId, NodeKey, TraversalOrder, Tree, TreeNode,
        TreeNodeData, TreeTraversal,
    };
}
