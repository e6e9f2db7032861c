//! Core tree traits for hierarchical data structures

use crate::node::{NodeId, NodeKey, TreeNode};
use std::collections::{HashSet, VecDeque};

/// A hierarchical structure with any number of roots
///
/// Implementations provide the basic navigation primitives; derived methods
/// provide convenient higher-level operations.
///
/// # Example
///
/// ```ignore
/// fn print_tree<T: Tree>(tree: &T) {
///     for id in tree.walk(TraversalOrder::PreOrder) {
///         let depth = tree.depth(id);
///         println!("{:indent$}{}", "", tree.label(id).unwrap(), indent = depth * 2);
///     }
/// }
/// ```
pub trait Tree {
    /// Iterate over the top-level nodes in order
    fn roots(&self) -> Box<dyn Iterator<Item = NodeId> + '_>;

    /// Get a node by its ID
    ///
    /// Returns `None` if the ID is invalid.
    fn get(&self, id: NodeId) -> Option<&TreeNode>;

    /// Get the parent of a node
    ///
    /// Returns `None` for roots.
    fn parent(&self, id: NodeId) -> Option<NodeId>;

    /// Iterate over children of a node
    ///
    /// Returns an empty iterator for leaf nodes or invalid IDs.
    fn children(&self, id: NodeId) -> Box<dyn Iterator<Item = NodeId> + '_>;

    /// Count total nodes in the tree
    fn node_count(&self) -> usize;

    /// Check if a node has no children (loaded or pending)
    ///
    /// Returns false for invalid IDs.
    fn is_leaf(&self, id: NodeId) -> bool {
        self.get(id).map(|n| n.is_leaf()).unwrap_or(false)
    }

    /// Get the label of a node
    fn label(&self, id: NodeId) -> Option<&str> {
        self.get(id).map(|n| n.label.as_str())
    }

    /// Get the external key of a node
    fn key(&self, id: NodeId) -> Option<&NodeKey> {
        self.get(id).map(|n| &n.key)
    }

    /// Get the depth of a node (roots = 0)
    ///
    /// Returns 0 for invalid IDs.
    fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(parent_id) = current {
            depth += 1;
            current = self.parent(parent_id);
        }
        depth
    }

    /// Count children of a node
    fn child_count(&self, id: NodeId) -> usize {
        self.children(id).count()
    }

    /// Get all ancestors of a node, from parent to root
    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent_id) = current {
            ancestors.push(parent_id);
            current = self.parent(parent_id);
        }
        ancestors
    }

    /// Check if a node is a strict ancestor of another
    fn is_ancestor_of(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        let mut current = self.parent(descendant);
        while let Some(parent_id) = current {
            if parent_id == ancestor {
                return true;
            }
            current = self.parent(parent_id);
        }
        false
    }

    /// Check if a node is a strict descendant of another
    fn is_descendant_of(&self, descendant: NodeId, ancestor: NodeId) -> bool {
        self.is_ancestor_of(ancestor, descendant)
    }
}

/// Traversal order for walking the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraversalOrder {
    /// Visit parent before children (top-down)
    PreOrder,
    /// Visit children before parent (bottom-up)
    PostOrder,
    /// Visit level by level (breadth-first)
    BreadthFirst,
}

/// Extension trait providing tree traversal and search utilities
///
/// This trait is automatically implemented for all types that implement `Tree`.
pub trait TreeTraversal: Tree {
    /// Walk every root in the specified order
    fn walk(&self, order: TraversalOrder) -> TreeWalker<'_, Self>
    where
        Self: Sized,
    {
        TreeWalker::new(self, self.roots().collect(), order)
    }

    /// Walk the subtree starting at a specific node
    fn walk_from(&self, start: NodeId, order: TraversalOrder) -> TreeWalker<'_, Self>
    where
        Self: Sized,
    {
        TreeWalker::new(self, vec![start], order)
    }

    /// Get all leaf nodes
    fn leaves(&self) -> Vec<NodeId>
    where
        Self: Sized,
    {
        self.walk(TraversalOrder::PreOrder)
            .filter(|&id| self.is_leaf(id))
            .collect()
    }

    /// Find nodes matching a predicate
    fn find<F>(&self, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&TreeNode) -> bool,
        Self: Sized,
    {
        self.walk(TraversalOrder::PreOrder)
            .filter(|&id| self.get(id).map(&predicate).unwrap_or(false))
            .collect()
    }

    /// Find a node by label (first match only)
    fn find_by_label(&self, label: &str) -> Option<NodeId>
    where
        Self: Sized,
    {
        self.walk(TraversalOrder::PreOrder)
            .find(|&id| self.label(id) == Some(label))
    }
}

// Blanket implementation for all Tree types
impl<T: Tree> TreeTraversal for T {}

/// Iterator for traversing a tree in different orders
pub struct TreeWalker<'a, T: Tree + ?Sized> {
    tree: &'a T,
    order: TraversalOrder,
    stack: Vec<NodeId>,
    queue: VecDeque<NodeId>,
    visited: HashSet<NodeId>,
}

impl<'a, T: Tree + ?Sized> TreeWalker<'a, T> {
    /// Create a new tree walker over the given starting nodes
    pub fn new(tree: &'a T, starts: Vec<NodeId>, order: TraversalOrder) -> Self {
        let (stack, queue) = match order {
            TraversalOrder::BreadthFirst => (Vec::new(), starts.into_iter().collect()),
            _ => (starts.into_iter().rev().collect(), VecDeque::new()),
        };

        Self {
            tree,
            order,
            stack,
            queue,
            visited: HashSet::new(),
        }
    }

    fn next_preorder(&mut self) -> Option<NodeId> {
        let current = self.stack.pop()?;

        // Add children in reverse order so they're popped in correct order
        let children: Vec<_> = self.tree.children(current).collect();
        for child in children.into_iter().rev() {
            self.stack.push(child);
        }

        Some(current)
    }

    fn next_postorder(&mut self) -> Option<NodeId> {
        while let Some(&current) = self.stack.last() {
            if self.visited.contains(&current) {
                self.stack.pop();
                return Some(current);
            }

            self.visited.insert(current);

            let children: Vec<_> = self.tree.children(current).collect();
            for child in children.into_iter().rev() {
                self.stack.push(child);
            }
        }
        None
    }

    fn next_breadthfirst(&mut self) -> Option<NodeId> {
        let current = self.queue.pop_front()?;
        self.queue.extend(self.tree.children(current));
        Some(current)
    }
}

impl<'a, T: Tree + ?Sized> Iterator for TreeWalker<'a, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        match self.order {
            TraversalOrder::PreOrder => self.next_preorder(),
            TraversalOrder::PostOrder => self.next_postorder(),
            TraversalOrder::BreadthFirst => self.next_breadthfirst(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Forest, TreeNodeData};

    // root1 -> (dir1 -> file2), file1 ; root2
    fn sample() -> Forest {
        Forest::from_data(&[
            TreeNodeData::new("root1", "root1")
                .child(TreeNodeData::new("dir1", "dir1").child(TreeNodeData::new("file2", "file2")))
                .child(TreeNodeData::new("file1", "file1")),
            TreeNodeData::new("root2", "root2"),
        ])
    }

    fn labels(forest: &Forest, ids: impl Iterator<Item = NodeId>) -> Vec<String> {
        ids.map(|id| forest.label(id).unwrap().to_string()).collect()
    }

    #[test]
    fn test_basic_tree_operations() {
        let forest = sample();
        let root1 = forest.find_by_label("root1").unwrap();
        let dir1 = forest.find_by_label("dir1").unwrap();
        let file2 = forest.find_by_label("file2").unwrap();

        assert_eq!(forest.node_count(), 5);
        assert_eq!(forest.child_count(root1), 2);
        assert_eq!(forest.depth(file2), 2);
        assert_eq!(forest.ancestors(file2), vec![dir1, root1]);
        assert!(Tree::is_ancestor_of(&forest, root1, file2));
        assert!(forest.is_descendant_of(file2, root1));
        assert!(forest.is_leaf(file2));
        assert!(!forest.is_leaf(dir1));
    }

    #[test]
    fn test_tree_traversal_orders() {
        let forest = sample();

        assert_eq!(
            labels(&forest, forest.walk(TraversalOrder::PreOrder)),
            vec!["root1", "dir1", "file2", "file1", "root2"]
        );
        assert_eq!(
            labels(&forest, forest.walk(TraversalOrder::PostOrder)),
            vec!["file2", "dir1", "file1", "root1", "root2"]
        );
        assert_eq!(
            labels(&forest, forest.walk(TraversalOrder::BreadthFirst)),
            vec!["root1", "root2", "dir1", "file1", "file2"]
        );
    }

    #[test]
    fn test_find_helpers() {
        let forest = sample();
        let files = forest.find(|n| n.label.starts_with("file"));
        assert_eq!(labels(&forest, files.into_iter()), vec!["file2", "file1"]);
        assert_eq!(labels(&forest, forest.leaves().into_iter()), vec!["file2", "file1", "root2"]);
        assert_eq!(forest.find_by_label("nope"), None);
    }
}
