//! Input contract for building a forest
//!
//! `TreeNodeData` is the recursive, serializable description adapters hand
//! to the engine. Field names are camelCase on the wire.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::node::NodeKey;

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNodeData {
    pub id: NodeKey,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub selectable: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub draggable: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub droppable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNodeData>,
    /// Marks a node whose children are not loaded yet
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_children: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<serde_json::Value>,
}

impl TreeNodeData {
    pub fn new(id: impl Into<NodeKey>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            icon: None,
            disabled: false,
            selectable: true,
            draggable: true,
            droppable: true,
            data: None,
            children: Vec::new(),
            has_children: false,
            loading: false,
            error: None,
            class_name: None,
            style: None,
        }
    }

    /// Add a child node.
    pub fn child(mut self, child: TreeNodeData) -> Self {
        self.children.push(child);
        self
    }

    /// Set children from a vec.
    pub fn with_children(mut self, children: Vec<TreeNodeData>) -> Self {
        self.children = children;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn selectable(mut self, selectable: bool) -> Self {
        self.selectable = selectable;
        self
    }

    pub fn draggable(mut self, draggable: bool) -> Self {
        self.draggable = draggable;
        self
    }

    pub fn droppable(mut self, droppable: bool) -> Self {
        self.droppable = droppable;
        self
    }

    /// Declare children that will be loaded later.
    pub fn has_children(mut self, has_children: bool) -> Self {
        self.has_children = has_children;
        self
    }

    /// Parse a JSON array of root nodes.
    pub fn list_from_json(json: &str) -> Result<Vec<TreeNodeData>> {
        serde_json::from_str(json).context("Failed to parse tree node list")
    }

    /// Render a list of root nodes as pretty JSON.
    pub fn list_to_json(nodes: &[TreeNodeData]) -> Result<String> {
        serde_json::to_string_pretty(nodes).context("Failed to serialize tree node list")
    }

    /// Number of nodes in this subtree, self included
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNodeData::count).sum::<usize>()
    }
}
