//! Core node types for the tree model

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a node within a forest
///
/// Internally represented as an index into an arena-based storage. Slots of
/// removed nodes are recycled, so a `NodeId` must not be held across a
/// removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Create a new NodeId from a usize
    pub const fn new(id: usize) -> Self {
        NodeId(id)
    }

    /// Get the inner usize value
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(id: usize) -> Self {
        NodeId(id)
    }
}

impl From<NodeId> for usize {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// The external identity of a node: a string or an integer, unique across
/// the whole tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeKey {
    #[display(fmt = "{}", _0)]
    Num(i64),
    #[display(fmt = "{}", _0)]
    Str(String),
}

impl From<&str> for NodeKey {
    fn from(key: &str) -> Self {
        NodeKey::Str(key.to_string())
    }
}

impl From<i32> for NodeKey {
    fn from(key: i32) -> Self {
        NodeKey::Num(i64::from(key))
    }
}

/// Keys from the root down to a node, inclusive.
pub type NodePath = SmallVec<[NodeKey; 4]>;

/// A textual field of a node that can be searched and highlighted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeField {
    /// The display label
    Label,
    /// The node key rendered as text
    Id,
    /// A top-level key inside the free-form `data` payload
    Data(String),
}

impl fmt::Display for NodeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeField::Label => write!(f, "label"),
            NodeField::Id => write!(f, "id"),
            NodeField::Data(key) => write!(f, "data.{}", key),
        }
    }
}

impl FromStr for NodeField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "label" => Ok(NodeField::Label),
            "id" => Ok(NodeField::Id),
            other => match other.strip_prefix("data.") {
                Some(key) if !key.is_empty() => Ok(NodeField::Data(key.to_string())),
                _ => Err(anyhow::anyhow!("unknown node field `{}`", other)),
            },
        }
    }
}

impl TryFrom<String> for NodeField {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeField> for String {
    fn from(field: NodeField) -> Self {
        field.to_string()
    }
}

/// A `[start, end)` byte range inside the text of a matched field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightRange {
    pub field: NodeField,
    pub start: usize,
    pub end: usize,
}

impl HighlightRange {
    pub fn new(field: NodeField, start: usize, end: usize) -> Self {
        Self { field, start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Per-node state and capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    pub selected: bool,
    /// Only ever set under cascade selection
    pub indeterminate: bool,
    pub expanded: bool,
    pub visible: bool,
    pub matched: bool,
    pub highlighted: bool,
    pub dragging: bool,
    pub drop_target: bool,
    pub disabled: bool,
    pub selectable: bool,
    pub draggable: bool,
    pub droppable: bool,
    pub has_children: bool,
    pub loading: bool,
    pub loaded: bool,
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self {
            selected: false,
            indeterminate: false,
            expanded: false,
            visible: false,
            matched: false,
            highlighted: false,
            dragging: false,
            drop_target: false,
            disabled: false,
            selectable: true,
            draggable: true,
            droppable: true,
            has_children: false,
            loading: false,
            loaded: false,
        }
    }
}

/// A single node in the forest
///
/// Structure is expressed through arena indices: `children` is owned by
/// this node, `parent` is a non-owning back index.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub key: NodeKey,
    pub label: String,
    pub icon: Option<String>,
    pub data: Option<serde_json::Value>,
    pub class_name: Option<String>,
    pub style: Option<serde_json::Value>,
    pub error: Option<String>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub level: usize,
    pub index: usize,
    pub path: NodePath,
    pub flags: NodeFlags,
    pub highlights: Vec<HighlightRange>,
}

impl TreeNode {
    /// Create a detached root-level node
    pub fn new(key: impl Into<NodeKey>, label: impl Into<String>) -> Self {
        let key = key.into();
        let mut path = NodePath::new();
        path.push(key.clone());
        Self {
            key,
            label: label.into(),
            icon: None,
            data: None,
            class_name: None,
            style: None,
            error: None,
            children: Vec::new(),
            parent: None,
            level: 0,
            index: 0,
            path,
            flags: NodeFlags::default(),
            highlights: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && !self.flags.has_children
    }

    /// Whether selection may touch this node at all
    pub fn is_selectable(&self) -> bool {
        self.flags.selectable && !self.flags.disabled
    }

    pub fn is_draggable(&self) -> bool {
        self.flags.draggable && !self.flags.disabled
    }

    pub fn is_droppable(&self) -> bool {
        self.flags.droppable && !self.flags.disabled
    }

    /// Text of a searchable field.
    ///
    /// `data.<key>` resolves strings verbatim and numbers/booleans through
    /// their JSON rendering; other JSON values are not searchable.
    pub fn field_text(&self, field: &NodeField) -> Option<Cow<'_, str>> {
        match field {
            NodeField::Label => Some(Cow::Borrowed(self.label.as_str())),
            NodeField::Id => Some(Cow::Owned(self.key.to_string())),
            NodeField::Data(name) => match self.data.as_ref()?.get(name)? {
                serde_json::Value::String(s) => Some(Cow::Borrowed(s.as_str())),
                serde_json::Value::Number(n) => Some(Cow::Owned(n.to_string())),
                serde_json::Value::Bool(b) => Some(Cow::Owned(b.to_string())),
                _ => None,
            },
        }
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_id() {
        assert_eq!(NodeId::new(5).get(), 5);
        assert_eq!(NodeId::from(10), NodeId(10));
        assert_eq!(usize::from(NodeId(7)), 7);
    }

    #[test]
    fn test_node_key_display_and_wire_format() {
        assert_eq!(NodeKey::from("a").to_string(), "a");
        assert_eq!(NodeKey::from(42).to_string(), "42");

        let keys: Vec<NodeKey> = serde_json::from_value(json!(["x", 3])).unwrap();
        assert_eq!(keys, vec![NodeKey::from("x"), NodeKey::Num(3)]);
        assert_eq!(serde_json::to_value(&keys).unwrap(), json!(["x", 3]));
    }

    #[test]
    fn test_node_field_parsing() {
        assert_eq!("label".parse::<NodeField>().unwrap(), NodeField::Label);
        assert_eq!("id".parse::<NodeField>().unwrap(), NodeField::Id);
        assert_eq!(
            "data.owner".parse::<NodeField>().unwrap(),
            NodeField::Data("owner".into())
        );
        assert!("data.".parse::<NodeField>().is_err());
        assert!("color".parse::<NodeField>().is_err());
        assert_eq!(NodeField::Data("owner".into()).to_string(), "data.owner");
    }

    #[test]
    fn test_field_text() {
        let mut node = TreeNode::new(7, "Reports");
        node.data = Some(json!({ "owner": "ana", "size": 12, "tags": ["x"] }));

        assert_eq!(node.field_text(&NodeField::Label).as_deref(), Some("Reports"));
        assert_eq!(node.field_text(&NodeField::Id).as_deref(), Some("7"));
        assert_eq!(
            node.field_text(&NodeField::Data("owner".into())).as_deref(),
            Some("ana")
        );
        assert_eq!(
            node.field_text(&NodeField::Data("size".into())).as_deref(),
            Some("12")
        );
        assert_eq!(node.field_text(&NodeField::Data("tags".into())), None);
        assert_eq!(node.field_text(&NodeField::Data("missing".into())), None);
    }

    #[test]
    fn test_capability_flags() {
        let mut node = TreeNode::new("n", "n");
        assert!(node.is_selectable());
        assert!(node.is_draggable());
        node.flags.disabled = true;
        assert!(!node.is_selectable());
        assert!(!node.is_draggable());
        assert!(!node.is_droppable());
    }
}
