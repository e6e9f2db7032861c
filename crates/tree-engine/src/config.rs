//! Configuration options for the tree engine.
//!
//! `TreeConfig` is built once, fully populated, and handed to the engine at
//! construction. Every section has sensible defaults and builder setters.

use anyhow::{Context, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tree_model::{NodeField, NodeKey, TreeNode};

/// How node selection behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionMode {
    /// Selection is ignored entirely
    #[display(fmt = "none")]
    None,
    /// At most one node is selected
    #[default]
    #[display(fmt = "single")]
    Single,
    /// Independent toggles
    #[display(fmt = "multiple")]
    Multiple,
    /// Checkbox-style propagation with indeterminate parents
    #[display(fmt = "cascade")]
    Cascade,
}

/// How a search keyword is compared against node fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchMode {
    #[default]
    #[display(fmt = "contains")]
    Contains,
    #[display(fmt = "startsWith")]
    StartsWith,
    #[display(fmt = "endsWith")]
    EndsWith,
    #[display(fmt = "exact")]
    Exact,
    #[display(fmt = "regex")]
    Regex,
}

/// A caller-supplied predicate a node must satisfy to count as matched.
#[derive(Clone)]
pub struct NodeFilter(Arc<dyn Fn(&TreeNode) -> bool + Send + Sync>);

impl NodeFilter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&TreeNode) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    pub fn matches(&self, node: &TreeNode) -> bool {
        (self.0)(node)
    }
}

impl fmt::Debug for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NodeFilter(..)")
    }
}

/// Search behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchConfig {
    /// Comparison mode for the keyword.
    pub mode: MatchMode,

    /// Whether matching distinguishes upper and lower case.
    pub case_sensitive: bool,

    /// Node fields tested against the keyword; a node matches if any does.
    pub fields: Vec<NodeField>,

    /// Force every ancestor of a match into the expanded set.
    pub expand_matched: bool,

    /// Drop unmatched nodes from the visible list while a search is active.
    /// Off by default: matching is a highlight signal, not a filter.
    pub hide_unmatched: bool,

    /// Extra predicates every matched node must pass.
    #[serde(skip)]
    pub filters: Vec<NodeFilter>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: MatchMode::default(),
            case_sensitive: false,
            fields: vec![NodeField::Label],
            expand_matched: true,
            hide_unmatched: false,
            filters: Vec::new(),
        }
    }
}

impl SearchConfig {
    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn fields(mut self, fields: Vec<NodeField>) -> Self {
        self.fields = fields;
        self
    }

    pub fn expand_matched(mut self, expand: bool) -> Self {
        self.expand_matched = expand;
        self
    }

    pub fn hide_unmatched(mut self, hide: bool) -> Self {
        self.hide_unmatched = hide;
        self
    }

    /// Add a custom filter predicate.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TreeNode) -> bool + Send + Sync + 'static,
    {
        self.filters.push(NodeFilter::new(predicate));
        self
    }
}

/// Which drag-and-drop moves are permitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DragMode {
    /// Reorder among siblings of the same parent only
    #[display(fmt = "sort")]
    Sort,
    /// Any non-cyclic move
    #[default]
    #[display(fmt = "full")]
    Full,
    #[display(fmt = "disabled")]
    Disabled,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DragConfig {
    /// Global switch; nothing is draggable while false.
    pub enabled: bool,
    pub mode: DragMode,
}

/// Row geometry for the virtual scroll window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VirtualScrollConfig {
    /// When false the window always spans every visible row.
    pub enabled: bool,

    /// Default row height in pixels.
    pub item_height: f64,

    /// Extra rows rendered above and below the viewport.
    pub overscan: usize,

    /// Viewport height in pixels.
    pub container_height: f64,
}

impl Default for VirtualScrollConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            item_height: 32.0,
            overscan: 5,
            container_height: 400.0,
        }
    }
}

/// Configuration for a tree engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeConfig {
    pub selection_mode: SelectionMode,
    pub search: SearchConfig,
    pub drag: DragConfig,
    pub virtual_scroll: VirtualScrollConfig,

    /// Expand every node with children whenever data is loaded.
    pub default_expand_all: bool,

    /// Keys expanded whenever data is loaded.
    pub default_expanded_keys: Vec<NodeKey>,

    /// Keys selected whenever data is loaded.
    pub default_selected_keys: Vec<NodeKey>,
}

impl TreeConfig {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON; omitted fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse tree configuration")
    }

    pub fn selection_mode(mut self, mode: SelectionMode) -> Self {
        self.selection_mode = mode;
        self
    }

    pub fn search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Enable dragging with the given mode.
    pub fn drag(mut self, mode: DragMode) -> Self {
        self.drag = DragConfig {
            enabled: true,
            mode,
        };
        self
    }

    pub fn virtual_scroll(mut self, virtual_scroll: VirtualScrollConfig) -> Self {
        self.virtual_scroll = virtual_scroll;
        self
    }

    pub fn default_expand_all(mut self, expand_all: bool) -> Self {
        self.default_expand_all = expand_all;
        self
    }

    pub fn default_expanded_keys(mut self, keys: Vec<NodeKey>) -> Self {
        self.default_expanded_keys = keys;
        self
    }

    pub fn default_selected_keys(mut self, keys: Vec<NodeKey>) -> Self {
        self.default_selected_keys = keys;
        self
    }
}
