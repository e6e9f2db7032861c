//! Selection algorithms over the node graph
//!
//! The engine keeps node flags and the selected-key set in lockstep. Nodes
//! that are disabled or not selectable are never touched and never counted
//! when deriving a cascade parent's state, though a cascade still reaches
//! the selectable nodes below them.

use log::trace;
use tree_model::{Forest, NodeId, TraversalOrder, TreeTraversal};

use crate::config::SelectionMode;
use crate::state::IdSet;

/// Selection state a cascade parent derives from its selectable children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Checked,
    Unchecked,
    Indeterminate,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectionEngine {
    mode: SelectionMode,
}

impl SelectionEngine {
    pub fn new(mode: SelectionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Whether `id` can take part in selection at all
    pub fn accepts(&self, forest: &Forest, id: NodeId) -> bool {
        self.mode != SelectionMode::None
            && forest.get(id).map(|n| n.is_selectable()).unwrap_or(false)
    }

    /// Set the selection of one node, applying the mode's side effects.
    ///
    /// Returns whether anything changed.
    pub fn select(&self, forest: &mut Forest, selected: &mut IdSet, id: NodeId, value: bool) -> bool {
        if !self.accepts(forest, id) {
            return false;
        }

        match self.mode {
            SelectionMode::None => false,
            SelectionMode::Single => {
                let mut changed = false;
                if value {
                    let others: Vec<NodeId> = selected
                        .iter()
                        .filter_map(|key| forest.id_of(key))
                        .filter(|&other| other != id)
                        .collect();
                    for other in others {
                        changed |= set_selected(forest, selected, other, false);
                    }
                }
                changed | set_selected(forest, selected, id, value)
            }
            SelectionMode::Multiple => set_selected(forest, selected, id, value),
            SelectionMode::Cascade => {
                let mut changed = self.push_down(forest, selected, id, value);
                changed |= self.propagate_up(forest, selected, id);
                changed
            }
        }
    }

    /// `id` and every selectable descendant. Nodes that are not selectable
    /// are passed through untouched.
    fn push_down_targets(forest: &Forest, id: NodeId) -> Vec<NodeId> {
        let mut targets = vec![id];
        targets.extend(
            forest
                .descendants(id)
                .into_iter()
                .filter(|&d| forest.get(d).map(|n| n.is_selectable()).unwrap_or(false)),
        );
        targets
    }

    /// Whether [`Self::select`] would change anything. Reads only, so
    /// callers can skip copying shared state for a no-op.
    pub fn would_select(&self, forest: &Forest, selected: &IdSet, id: NodeId, value: bool) -> bool {
        if !self.accepts(forest, id) {
            return false;
        }
        let differs = |node_id: NodeId| differs_from(forest, node_id, value);
        match self.mode {
            SelectionMode::None => false,
            SelectionMode::Single => {
                differs(id)
                    || (value
                        && selected
                            .iter()
                            .filter_map(|key| forest.id_of(key))
                            .any(|other| other != id))
            }
            SelectionMode::Multiple => differs(id),
            SelectionMode::Cascade => Self::push_down_targets(forest, id).into_iter().any(differs),
        }
    }

    /// Whether [`Self::select_all`] would change anything.
    pub fn would_select_all(&self, forest: &Forest) -> bool {
        !matches!(self.mode, SelectionMode::None | SelectionMode::Single)
            && selectable_ids(forest)
                .into_iter()
                .any(|id| differs_from(forest, id, true))
    }

    /// Whether [`Self::invert`] would change anything.
    pub fn would_invert(&self, forest: &Forest) -> bool {
        !matches!(self.mode, SelectionMode::None | SelectionMode::Single)
            && !selectable_ids(forest).is_empty()
    }

    /// Force `value` onto `id` and every selectable descendant.
    fn push_down(&self, forest: &mut Forest, selected: &mut IdSet, id: NodeId, value: bool) -> bool {
        let mut changed = false;
        for target in Self::push_down_targets(forest, id) {
            changed |= set_selected(forest, selected, target, value);
            changed |= set_indeterminate(forest, target, false);
        }
        changed
    }

    /// Re-derive the ancestors of `id`, stopping at the first one that is
    /// not selectable.
    fn propagate_up(&self, forest: &mut Forest, selected: &mut IdSet, id: NodeId) -> bool {
        let mut changed = false;
        let mut current = forest.get(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            if !forest.get(parent).map(|n| n.is_selectable()).unwrap_or(false) {
                trace!("Cascade stopped at non-selectable {}", parent);
                break;
            }
            changed |= derive(forest, selected, parent);
            current = forest.get(parent).and_then(|n| n.parent);
        }
        changed
    }

    /// Re-derive every cascade parent bottom-up.
    ///
    /// Used after structural changes so parents reflect their current
    /// children. Does nothing outside cascade mode.
    pub fn sync_cascade(&self, forest: &mut Forest, selected: &mut IdSet) -> bool {
        if self.mode != SelectionMode::Cascade {
            return false;
        }
        let order: Vec<NodeId> = forest.walk(TraversalOrder::PostOrder).collect();
        let mut changed = false;
        for id in order {
            if forest.get(id).map(|n| n.is_selectable()).unwrap_or(false) {
                changed |= derive(forest, selected, id);
            }
        }
        changed
    }

    /// Select every selectable node. Rejected in single and none modes.
    pub fn select_all(&self, forest: &mut Forest, selected: &mut IdSet) -> bool {
        if matches!(self.mode, SelectionMode::None | SelectionMode::Single) {
            return false;
        }
        let mut changed = false;
        for id in selectable_ids(forest) {
            changed |= set_selected(forest, selected, id, true);
            changed |= set_indeterminate(forest, id, false);
        }
        changed | self.sync_cascade(forest, selected)
    }

    /// Deselect every selectable node.
    pub fn deselect_all(&self, forest: &mut Forest, selected: &mut IdSet) -> bool {
        if self.mode == SelectionMode::None {
            return false;
        }
        let mut changed = false;
        for id in selectable_ids(forest) {
            changed |= set_selected(forest, selected, id, false);
            changed |= set_indeterminate(forest, id, false);
        }
        changed | self.sync_cascade(forest, selected)
    }

    /// Flip the selection of every selectable node. Rejected in single and
    /// none modes.
    ///
    /// In cascade mode only the selectable leaves are flipped and parents
    /// are re-derived from them.
    pub fn invert(&self, forest: &mut Forest, selected: &mut IdSet) -> bool {
        match self.mode {
            SelectionMode::None | SelectionMode::Single => false,
            SelectionMode::Multiple => {
                let mut changed = false;
                for id in selectable_ids(forest) {
                    let value = !forest.get(id).map(|n| n.flags.selected).unwrap_or(false);
                    changed |= set_selected(forest, selected, id, value);
                }
                changed
            }
            SelectionMode::Cascade => {
                let leaves: Vec<NodeId> = selectable_ids(forest)
                    .into_iter()
                    .filter(|&id| selectable_children(forest, id).is_empty())
                    .collect();
                let mut changed = false;
                for id in leaves {
                    let value = !forest.get(id).map(|n| n.flags.selected).unwrap_or(false);
                    changed |= set_selected(forest, selected, id, value);
                }
                changed | self.sync_cascade(forest, selected)
            }
        }
    }

    /// What a cascade parent should show given its selectable children.
    ///
    /// `None` when the node has no selectable children.
    pub fn check_state(forest: &Forest, id: NodeId) -> Option<CheckState> {
        let children = selectable_children(forest, id);
        if children.is_empty() {
            return None;
        }
        let mut all = true;
        let mut some = false;
        for child in children.iter().filter_map(|&c| forest.get(c)) {
            all &= child.flags.selected;
            some |= child.flags.selected || child.flags.indeterminate;
        }
        Some(if all {
            CheckState::Checked
        } else if some {
            CheckState::Indeterminate
        } else {
            CheckState::Unchecked
        })
    }
}

fn selectable_ids(forest: &Forest) -> Vec<NodeId> {
    forest
        .walk(TraversalOrder::PreOrder)
        .filter(|&id| forest.get(id).map(|n| n.is_selectable()).unwrap_or(false))
        .collect()
}

/// Selection of `id` is not already exactly `value`
fn differs_from(forest: &Forest, id: NodeId, value: bool) -> bool {
    forest
        .get(id)
        .map(|n| n.flags.selected != value || n.flags.indeterminate)
        .unwrap_or(false)
}

fn selectable_children(forest: &Forest, id: NodeId) -> Vec<NodeId> {
    forest
        .siblings(Some(id))
        .iter()
        .copied()
        .filter(|&c| forest.get(c).map(|n| n.is_selectable()).unwrap_or(false))
        .collect()
}

/// Apply the derived state of `id`. Leaves keep their own state.
fn derive(forest: &mut Forest, selected: &mut IdSet, id: NodeId) -> bool {
    match SelectionEngine::check_state(forest, id) {
        Some(CheckState::Checked) => {
            set_selected(forest, selected, id, true) | set_indeterminate(forest, id, false)
        }
        Some(CheckState::Indeterminate) => {
            set_selected(forest, selected, id, false) | set_indeterminate(forest, id, true)
        }
        Some(CheckState::Unchecked) => {
            set_selected(forest, selected, id, false) | set_indeterminate(forest, id, false)
        }
        None => false,
    }
}

fn set_selected(forest: &mut Forest, selected: &mut IdSet, id: NodeId, value: bool) -> bool {
    let Some(node) = forest.get_mut(id) else {
        return false;
    };
    if value {
        selected.insert(node.key.clone());
    } else {
        selected.remove(&node.key);
    }
    if node.flags.selected == value {
        return false;
    }
    node.flags.selected = value;
    true
}

fn set_indeterminate(forest: &mut Forest, id: NodeId, value: bool) -> bool {
    match forest.get_mut(id) {
        Some(node) if node.flags.indeterminate != value => {
            node.flags.indeterminate = value;
            true
        }
        _ => false,
    }
}
