//! Arena-backed forest of tree nodes
//!
//! Every node lives in one slot table indexed by [`NodeId`]. A parent owns
//! the ordered list of its children's ids; a child only stores the
//! non-owning index of its parent. Keys are unique across the forest.

use anyhow::{bail, Result};
use log::{trace, warn};
use std::collections::HashMap;

use crate::data::TreeNodeData;
use crate::node::{NodeId, NodeKey, NodePath, TreeNode};
use crate::traits::{TraversalOrder, Tree, TreeTraversal};

#[derive(Debug, Clone, Default)]
pub struct Forest {
    /// Arena storage for nodes; `None` marks a recycled slot
    slots: Vec<Option<TreeNode>>,
    free: Vec<NodeId>,
    roots: Vec<NodeId>,
    /// Cache of key -> NodeId for quick lookups
    keys: HashMap<NodeKey, NodeId>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a forest from a list of root nodes.
    ///
    /// Nodes whose key is already present are skipped together with their
    /// subtree.
    pub fn from_data(data: &[TreeNodeData]) -> Self {
        let mut forest = Self::new();
        for node in data {
            forest.insert(None, node, None);
        }
        forest
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Top-level nodes in order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.slots.get(id.get())?.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.slots.get_mut(id.get())?.as_mut()
    }

    pub fn id_of(&self, key: &NodeKey) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    pub fn contains_key(&self, key: &NodeKey) -> bool {
        self.keys.contains_key(key)
    }

    pub fn get_by_key(&self, key: &NodeKey) -> Option<&TreeNode> {
        self.get(self.id_of(key)?)
    }

    pub fn get_by_key_mut(&mut self, key: &NodeKey) -> Option<&mut TreeNode> {
        let id = self.id_of(key)?;
        self.get_mut(id)
    }

    /// Live nodes in slot order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|node| (NodeId::new(i), node)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TreeNode> + '_ {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Children of `parent`, or the root list for `None`
    pub fn siblings(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(id) => self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[]),
            None => &self.roots,
        }
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> Option<&mut Vec<NodeId>> {
        match parent {
            Some(id) => self.get_mut(id).map(|n| &mut n.children),
            None => Some(&mut self.roots),
        }
    }

    fn alloc(&mut self, node: TreeNode) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id.get()] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                NodeId::new(self.slots.len() - 1)
            }
        }
    }

    fn reindex(&mut self, parent: Option<NodeId>) {
        let siblings = self.siblings(parent).to_vec();
        for (index, id) in siblings.into_iter().enumerate() {
            if let Some(node) = self.get_mut(id) {
                node.index = index;
            }
        }
    }

    /// Insert `data` (and its whole subtree) under `parent`, or as a root.
    ///
    /// `index` is clamped to the sibling count; `None` appends. Returns
    /// `None` if the parent is unknown or the key already exists.
    pub fn insert(
        &mut self,
        parent: Option<NodeId>,
        data: &TreeNodeData,
        index: Option<usize>,
    ) -> Option<NodeId> {
        if self.keys.contains_key(&data.id) {
            warn!("Skipping node with duplicate key {}", data.id);
            return None;
        }

        let (level, mut path) = match parent {
            Some(parent_id) => {
                let parent_node = self.get(parent_id)?;
                (parent_node.level + 1, parent_node.path.clone())
            }
            None => (0, NodePath::new()),
        };
        path.push(data.id.clone());

        let mut node = TreeNode::new(data.id.clone(), data.label.clone());
        node.icon = data.icon.clone();
        node.data = data.data.clone();
        node.class_name = data.class_name.clone();
        node.style = data.style.clone();
        node.error = data.error.clone();
        node.parent = parent;
        node.level = level;
        node.path = path;
        node.flags.disabled = data.disabled;
        node.flags.selectable = data.selectable;
        node.flags.draggable = data.draggable;
        node.flags.droppable = data.droppable;
        node.flags.has_children = data.has_children || !data.children.is_empty();
        node.flags.loading = data.loading;
        node.flags.loaded = !data.children.is_empty();

        let id = self.alloc(node);
        self.keys.insert(data.id.clone(), id);

        if let Some(siblings) = self.siblings_mut(parent) {
            let at = index.unwrap_or(siblings.len()).min(siblings.len());
            siblings.insert(at, id);
        }
        self.reindex(parent);
        if let Some(parent_node) = parent.and_then(|p| self.get_mut(p)) {
            parent_node.flags.has_children = true;
        }

        for child in &data.children {
            self.insert(Some(id), child, None);
        }

        trace!("Inserted {} at level {}", data.id, level);
        Some(id)
    }

    /// Insert a child under `parent`, reindexing the following siblings.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        data: &TreeNodeData,
        index: Option<usize>,
    ) -> Option<NodeId> {
        self.get(parent)?;
        self.insert(Some(parent), data, index)
    }

    /// Unlink a node from its sibling list. Returns the old parent.
    fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.get(id)?.parent;
        if let Some(siblings) = self.siblings_mut(parent) {
            siblings.retain(|&sibling| sibling != id);
        }
        self.reindex(parent);
        if let Some(parent_node) = parent.and_then(|p| self.get_mut(p)) {
            parent_node.flags.has_children = !parent_node.children.is_empty();
        }
        parent
    }

    /// Remove a node and all of its descendants.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if self.get(id).is_none() {
            return false;
        }

        let mut doomed = vec![id];
        doomed.extend(self.descendants(id));
        self.detach(id);

        for node_id in doomed {
            if let Some(node) = self.slots.get_mut(node_id.get()).and_then(Option::take) {
                self.keys.remove(&node.key);
                self.free.push(node_id);
            }
        }
        true
    }

    /// Remove the child of `parent` identified by `key`.
    ///
    /// Returns false if `key` is unknown or not a direct child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, key: &NodeKey) -> bool {
        match self.id_of(key) {
            Some(child) if self.get(child).and_then(|n| n.parent) == Some(parent) => {
                self.remove(child)
            }
            _ => false,
        }
    }

    /// Drop every child of `id` and insert `children` in their place.
    pub fn replace_children(&mut self, id: NodeId, children: &[TreeNodeData]) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        for child in node.children.clone() {
            self.remove(child);
        }
        for child in children {
            self.insert(Some(id), child, None);
        }
        if let Some(node) = self.get_mut(id) {
            node.flags.has_children = !node.children.is_empty();
        }
        true
    }

    /// Move a node under `new_parent` (or to the root list) at `index`.
    ///
    /// `index` addresses the destination list after the node has been
    /// detached; `None` appends. Refuses to move a node into itself or into
    /// one of its descendants.
    pub fn move_to(&mut self, id: NodeId, new_parent: Option<NodeId>, index: Option<usize>) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        if let Some(target) = new_parent {
            if target == id || self.get(target).is_none() || self.is_ancestor_of(id, target) {
                return false;
            }
        }

        let old_parent = self.detach(id);
        if let Some(siblings) = self.siblings_mut(new_parent) {
            let at = index.unwrap_or(siblings.len()).min(siblings.len());
            siblings.insert(at, id);
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = new_parent;
        }
        self.reindex(new_parent);
        if let Some(parent_node) = new_parent.and_then(|p| self.get_mut(p)) {
            parent_node.flags.has_children = true;
        }
        self.refresh_subtree(id);

        trace!("Moved {} from {:?} to {:?}", id, old_parent, new_parent);
        true
    }

    /// Recompute `level` and `path` for `id` and every descendant.
    fn refresh_subtree(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else {
            return;
        };
        let (level, path) = match node.parent.and_then(|p| self.get(p)) {
            Some(parent) => (parent.level + 1, parent.path.clone()),
            None => (0, NodePath::new()),
        };

        let mut stack = vec![(id, level, path)];
        while let Some((node_id, level, mut path)) = stack.pop() {
            let Some(node) = self.get_mut(node_id) else {
                continue;
            };
            path.push(node.key.clone());
            node.level = level;
            node.path = path.clone();
            for &child in &node.children {
                stack.push((child, level + 1, path.clone()));
            }
        }
    }

    /// Descendants of `id` in depth-first order, `id` excluded
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.walk_from(id, TraversalOrder::PreOrder).skip(1).collect()
    }

    /// Every node in depth-first order
    pub fn flatten(&self) -> Vec<NodeId> {
        self.walk(TraversalOrder::PreOrder).collect()
    }

    /// Structurally independent copy of a node with the same keys.
    ///
    /// A shallow clone keeps `has_children` but carries no children.
    pub fn clone_subtree(&self, id: NodeId, deep: bool) -> Option<TreeNodeData> {
        let node = self.get(id)?;
        let children = if deep {
            node.children
                .iter()
                .filter_map(|&child| self.clone_subtree(child, true))
                .collect()
        } else {
            Vec::new()
        };

        Some(TreeNodeData {
            id: node.key.clone(),
            label: node.label.clone(),
            icon: node.icon.clone(),
            disabled: node.flags.disabled,
            selectable: node.flags.selectable,
            draggable: node.flags.draggable,
            droppable: node.flags.droppable,
            data: node.data.clone(),
            children,
            has_children: node.flags.has_children,
            loading: node.flags.loading,
            error: node.error.clone(),
            class_name: node.class_name.clone(),
            style: node.style.clone(),
        })
    }

    /// Export the whole forest back into its input form
    pub fn to_data(&self) -> Vec<TreeNodeData> {
        self.roots
            .iter()
            .filter_map(|&root| self.clone_subtree(root, true))
            .collect()
    }

    /// Check the structural invariants of the forest.
    pub fn validate(&self) -> Result<()> {
        let mut seen = 0;
        for (id, node) in self.iter() {
            seen += 1;
            if self.keys.get(&node.key) != Some(&id) {
                bail!("key index out of sync for {}", node.key);
            }
            let siblings = self.siblings(node.parent);
            if siblings.iter().filter(|&&s| s == id).count() != 1 {
                bail!("{} does not appear exactly once among its siblings", node.key);
            }
            if siblings.get(node.index) != Some(&id) {
                bail!("{} has stale index {}", node.key, node.index);
            }
            match node.parent.and_then(|p| self.get(p)) {
                Some(parent) => {
                    if node.level != parent.level + 1 {
                        bail!("{} has level {} under level {}", node.key, node.level, parent.level);
                    }
                    if node.path.len() != parent.path.len() + 1
                        || !node.path.starts_with(&parent.path)
                    {
                        bail!("{} has a path inconsistent with its parent", node.key);
                    }
                }
                None if node.parent.is_some() => bail!("{} has a dangling parent", node.key),
                None => {
                    if node.level != 0 || node.path.len() != 1 {
                        bail!("root {} has level {}", node.key, node.level);
                    }
                }
            }
            if node.path.last() != Some(&node.key) {
                bail!("{} path does not end with itself", node.key);
            }
            if node.path[..node.path.len() - 1].contains(&node.key) {
                bail!("{} is its own ancestor", node.key);
            }
        }
        if seen != self.keys.len() {
            bail!("{} live nodes but {} indexed keys", seen, self.keys.len());
        }
        Ok(())
    }
}

impl Tree for Forest {
    fn roots(&self) -> Box<dyn Iterator<Item = NodeId> + '_> {
        Box::new(self.roots.iter().copied())
    }

    fn get(&self, id: NodeId) -> Option<&TreeNode> {
        Forest::get(self, id)
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        Forest::get(self, id)?.parent
    }

    fn children(&self, id: NodeId) -> Box<dyn Iterator<Item = NodeId> + '_> {
        Box::new(self.siblings(Some(id)).iter().copied())
    }

    fn node_count(&self) -> usize {
        self.len()
    }

    fn depth(&self, id: NodeId) -> usize {
        Forest::get(self, id).map(|n| n.level).unwrap_or(0)
    }

    /// O(depth) containment check on the stored paths
    fn is_ancestor_of(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        match (Forest::get(self, ancestor), Forest::get(self, descendant)) {
            (Some(a), Some(d)) => d.path.len() > a.path.len() && d.path.starts_with(&a.path),
            _ => false,
        }
    }
}
