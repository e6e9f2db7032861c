//! Tree Engine Library
//!
//! Headless state engine for hierarchical selection widgets. It decides
//! what is selected, expanded, matched and visible, and where a dragged node
//! would land; rendering is left to adapters.
//!
//! # Core Concepts
//!
//! - **StateManager**: Reducer applying [`TreeAction`]s to a copy-on-write
//!   [`TreeState`] snapshot and notifying subscribers
//! - **SelectionEngine**: None, single, multiple and cascade selection with
//!   indeterminate parents
//! - **SearchEngine**: Keyword and regex matching with highlight ranges
//! - **DragDropEngine**: Drop classification, cycle prevention and placement
//! - **VirtualScroller**: Render window over the visible rows
//! - **TreeEngine**: Facade emitting [`TreeEvent`]s for every committed change
//!
//! # Example
//!
//! ```
//! use tree_engine::prelude::*;
//!
//! let mut engine = TreeEngine::new(
//!     TreeConfig::default().selection_mode(SelectionMode::Cascade),
//!     vec![TreeNodeData::new("docs", "Docs")
//!         .child(TreeNodeData::new("readme", "README"))
//!         .child(TreeNodeData::new("guide", "Guide"))],
//! );
//!
//! engine.select_node(&"readme".into(), true);
//! assert_eq!(engine.get_half_checked_keys(), vec![NodeKey::from("docs")]);
//! ```

pub mod config;
pub mod drag_drop;
pub mod engine;
pub mod events;
pub mod search;
pub mod selection;
pub mod state;
pub mod virtual_scroll;

pub use config::{DragConfig, DragMode, MatchMode, NodeFilter, SearchConfig, SelectionMode, TreeConfig, VirtualScrollConfig};
pub use drag_drop::{DragDropEngine, DragPhase, DragState, DropPlan, DropPosition, DropRejection, DropVerdict};
pub use engine::TreeEngine;
pub use events::{DropDetails, EventEmitter, ListenerId, TreeEvent, TreeEventKind};
pub use search::{Matcher, SearchEngine, SearchOutcome};
pub use selection::{CheckState, SelectionEngine};
pub use state::{IdSet, NodePatch, StateManager, SubscriptionId, TreeAction, TreeState};
pub use virtual_scroll::{ScrollAlign, VirtualScroller, VirtualWindow};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        DragMode, DropPosition, MatchMode, NodePatch, ScrollAlign, SearchConfig, SelectionMode,
        TreeAction, TreeConfig, TreeEngine, TreeEvent, TreeEventKind, TreeState,
    };
    pub use tree_model::{NodeKey, TreeNode, TreeNodeData};
}
