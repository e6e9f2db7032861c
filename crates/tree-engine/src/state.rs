//! Reducer-style state manager
//!
//! [`StateManager`] owns the single [`TreeState`] snapshot and applies
//! [`TreeAction`]s to it synchronously. Snapshot parts live behind `Arc`s and
//! are copied on write, so a subscriber that kept an older snapshot can tell
//! which parts changed with `Arc::ptr_eq`.

use anyhow::Result;
use derive_more::Display;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tree_model::{Forest, NodeField, NodeId, NodeKey, Tree, TreeNode, TreeNodeData};

use crate::config::{SelectionMode, TreeConfig};
use crate::drag_drop::{DragDropEngine, DragPhase, DragState, DropPosition};
use crate::events::call_isolated;
use crate::search::SearchEngine;
use crate::selection::SelectionEngine;
use crate::virtual_scroll::{VirtualScroller, VirtualWindow};

pub type IdSet = HashSet<NodeKey>;

/// Immutable view of the whole tree at one version
#[derive(Debug, Clone, Default)]
pub struct TreeState {
    /// Node map and ordered roots
    pub forest: Arc<Forest>,
    /// Every node, depth-first
    pub flat_nodes: Arc<Vec<NodeId>>,
    /// Depth-first list filtered by expansion and search
    pub visible_nodes: Arc<Vec<NodeId>>,
    pub selected_ids: Arc<IdSet>,
    pub expanded_ids: Arc<IdSet>,
    pub matched_ids: Arc<IdSet>,
    pub loading_ids: Arc<IdSet>,
    pub drag_state: Arc<DragState>,
    pub virtual_state: Arc<VirtualWindow>,
    pub search_keyword: String,
    /// A search pass is in effect (keyword or filters)
    pub searching: bool,
    pub initialized: bool,
    pub destroyed: bool,
    /// Incremented by every dispatch that changed something
    pub version: u64,
}

impl TreeState {
    pub fn node(&self, key: &NodeKey) -> Option<&TreeNode> {
        self.forest.get_by_key(key)
    }

    pub fn visible(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.visible_nodes.iter().filter_map(|&id| self.forest.get(id))
    }

    /// Selected nodes in depth-first order
    pub fn selected_nodes(&self) -> Vec<&TreeNode> {
        self.flat_nodes
            .iter()
            .filter_map(|&id| self.forest.get(id))
            .filter(|node| node.flags.selected)
            .collect()
    }

    pub fn indeterminate_keys(&self) -> Vec<NodeKey> {
        self.flat_nodes
            .iter()
            .filter_map(|&id| self.forest.get(id))
            .filter(|node| node.flags.indeterminate)
            .map(|node| node.key.clone())
            .collect()
    }

    /// Plain-text rendering of the visible rows.
    ///
    /// Each row reads `<check> <indent><expander><label><markers>` where the
    /// check is `[x]`, `[-]` (indeterminate) or `[ ]`, the expander is `+ `
    /// (collapsed), `- ` (expanded) or blank for leaves, highlighted label
    /// text is wrapped in `<>` and `*` marks matched rows.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for node in self.visible() {
            let check = if node.flags.selected {
                "[x]"
            } else if node.flags.indeterminate {
                "[-]"
            } else {
                "[ ]"
            };
            let expander = if node.flags.expanded {
                "- "
            } else if node.flags.has_children {
                "+ "
            } else {
                "  "
            };
            let label: String = SearchEngine::segments(node, &NodeField::Label)
                .into_iter()
                .map(|(text, hit)| if hit { format!("<{}>", text) } else { text })
                .collect();

            let _ = write!(out, "{} {:indent$}{}{}", check, "", expander, label, indent = node.level * 2);
            if self.matched_ids.contains(&node.key) {
                out.push_str(" *");
            }
            for (on, marker) in [
                (node.flags.disabled, "disabled"),
                (node.flags.loading, "loading"),
                (node.flags.dragging, "dragging"),
                (node.flags.drop_target, "drop target"),
            ] {
                if on {
                    let _ = write!(out, " ({})", marker);
                }
            }
            if let Some(error) = &node.error {
                let _ = write!(out, " (error: {})", error);
            }
            out.push('\n');
        }
        out
    }
}

/// Partial update applied by [`TreeAction::UpdateNode`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodePatch {
    pub label: Option<String>,
    pub icon: Option<String>,
    pub data: Option<serde_json::Value>,
    pub disabled: Option<bool>,
    pub selectable: Option<bool>,
    pub draggable: Option<bool>,
    pub droppable: Option<bool>,
    pub class_name: Option<String>,
    pub style: Option<serde_json::Value>,
}

impl NodePatch {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to `node`, returning whether any field changed.
    pub fn apply(&self, node: &mut TreeNode) -> bool {
        fn set<T: PartialEq + Clone>(slot: &mut T, value: &Option<T>) -> bool {
            match value {
                Some(v) if slot != v => {
                    *slot = v.clone();
                    true
                }
                _ => false,
            }
        }
        fn set_opt<T: PartialEq + Clone>(slot: &mut Option<T>, value: &Option<T>) -> bool {
            match value {
                Some(v) if slot.as_ref() != Some(v) => {
                    *slot = Some(v.clone());
                    true
                }
                _ => false,
            }
        }

        let mut changed = set(&mut node.label, &self.label);
        changed |= set_opt(&mut node.icon, &self.icon);
        changed |= set_opt(&mut node.data, &self.data);
        changed |= set(&mut node.flags.disabled, &self.disabled);
        changed |= set(&mut node.flags.selectable, &self.selectable);
        changed |= set(&mut node.flags.draggable, &self.draggable);
        changed |= set(&mut node.flags.droppable, &self.droppable);
        changed |= set_opt(&mut node.class_name, &self.class_name);
        changed |= set_opt(&mut node.style, &self.style);
        changed
    }
}

/// Everything that can change a [`TreeState`]
#[derive(Debug, Clone, PartialEq, Display)]
pub enum TreeAction {
    /// Load the first data set and mark the state initialized
    #[display(fmt = "INIT")]
    Init(Vec<TreeNodeData>),
    #[display(fmt = "SET_DATA")]
    SetData(Vec<TreeNodeData>),
    #[display(fmt = "ADD_NODE")]
    AddNode {
        parent: Option<NodeKey>,
        data: TreeNodeData,
        index: Option<usize>,
    },
    #[display(fmt = "REMOVE_NODE")]
    RemoveNode(NodeKey),
    #[display(fmt = "UPDATE_NODE")]
    UpdateNode { key: NodeKey, patch: NodePatch },
    #[display(fmt = "MOVE_NODE")]
    MoveNode {
        key: NodeKey,
        parent: Option<NodeKey>,
        index: Option<usize>,
    },
    /// `selected: None` toggles
    #[display(fmt = "SELECT_NODE")]
    SelectNode { key: NodeKey, selected: Option<bool> },
    #[display(fmt = "SELECT_ALL")]
    SelectAll,
    #[display(fmt = "DESELECT_ALL")]
    DeselectAll,
    #[display(fmt = "INVERT_SELECTION")]
    InvertSelection,
    /// `expanded: None` toggles
    #[display(fmt = "EXPAND_NODE")]
    ExpandNode { key: NodeKey, expanded: Option<bool> },
    #[display(fmt = "EXPAND_ALL")]
    ExpandAll,
    #[display(fmt = "COLLAPSE_ALL")]
    CollapseAll,
    #[display(fmt = "SEARCH")]
    Search(String),
    #[display(fmt = "CLEAR_SEARCH")]
    ClearSearch,
    #[display(fmt = "START_LOADING")]
    StartLoading(NodeKey),
    /// Children on success, an error message on failure
    #[display(fmt = "FINISH_LOADING")]
    FinishLoading {
        key: NodeKey,
        result: std::result::Result<Vec<TreeNodeData>, String>,
    },
    #[display(fmt = "CANCEL_LOADING")]
    CancelLoading(NodeKey),
    #[display(fmt = "START_DRAG")]
    StartDrag(NodeKey),
    #[display(fmt = "UPDATE_DRAG")]
    UpdateDrag { target: NodeKey, position: DropPosition },
    #[display(fmt = "END_DRAG")]
    EndDrag,
    #[display(fmt = "UPDATE_VIRTUAL_SCROLL")]
    UpdateVirtualScroll {
        scroll_top: f64,
        container_height: Option<f64>,
    },
    #[display(fmt = "SET_ITEM_HEIGHT")]
    SetItemHeight { key: NodeKey, height: Option<f64> },
    #[display(fmt = "DESTROY")]
    Destroy,
}

/// Handle returned by [`StateManager::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display(fmt = "subscriber#{}", _0)]
pub struct SubscriptionId(u64);

pub type Subscriber = Box<dyn FnMut(&TreeState, &TreeAction) -> Result<()>>;

pub struct StateManager {
    config: TreeConfig,
    state: TreeState,
    selection: SelectionEngine,
    search: SearchEngine,
    drag: DragDropEngine,
    scroller: VirtualScroller,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("version", &self.state.version)
            .field("nodes", &self.state.forest.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl StateManager {
    pub fn new(config: TreeConfig) -> Self {
        let scroller = VirtualScroller::new(&config.virtual_scroll);
        let mut manager = Self {
            selection: SelectionEngine::new(config.selection_mode),
            search: SearchEngine::new(config.search.clone()),
            drag: DragDropEngine::new(config.drag.clone()),
            scroller,
            config,
            state: TreeState::default(),
            subscribers: Vec::new(),
            next_subscription: 0,
        };
        manager.state.virtual_state = Arc::new(manager.current_window());
        manager
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn state(&self) -> &TreeState {
        &self.state
    }

    pub fn scroller(&self) -> &VirtualScroller {
        &self.scroller
    }

    pub fn drag_engine(&self) -> &DragDropEngine {
        &self.drag
    }

    pub fn selection_mode(&self) -> SelectionMode {
        self.selection.mode()
    }

    /// Register a callback run after every effective dispatch.
    pub fn subscribe<F>(&mut self, subscriber: F) -> SubscriptionId
    where
        F: FnMut(&TreeState, &TreeAction) -> Result<()> + 'static,
    {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Apply `action`. Returns whether the state changed; the new snapshot
    /// is available through [`Self::state`].
    pub fn dispatch(&mut self, action: TreeAction) -> bool {
        if self.state.destroyed {
            warn!("Ignoring {} dispatched after destroy", action);
            return false;
        }
        trace!("Dispatching {}", action);

        let changed = match &action {
            TreeAction::Init(data) => {
                self.set_data(data);
                self.state.initialized = true;
                true
            }
            TreeAction::SetData(data) => {
                self.set_data(data);
                true
            }
            TreeAction::AddNode { parent, data, index } => self.add_node(parent.as_ref(), data, *index),
            TreeAction::RemoveNode(key) => self.remove_node(key),
            TreeAction::UpdateNode { key, patch } => self.update_node(key, patch),
            TreeAction::MoveNode { key, parent, index } => self.move_node(key, parent.as_ref(), *index),
            TreeAction::SelectNode { key, selected } => self.select_node(key, *selected),
            TreeAction::SelectAll => self.select_all(),
            TreeAction::DeselectAll => self.deselect_all(),
            TreeAction::InvertSelection => self.invert_selection(),
            TreeAction::ExpandNode { key, expanded } => self.expand_node(key, *expanded),
            TreeAction::ExpandAll => self.expand_all(true),
            TreeAction::CollapseAll => self.expand_all(false),
            TreeAction::Search(keyword) => {
                self.apply_search(keyword);
                true
            }
            TreeAction::ClearSearch => self.clear_search(),
            TreeAction::StartLoading(key) => self.start_loading(key),
            TreeAction::FinishLoading { key, result } => self.finish_loading(key, result),
            TreeAction::CancelLoading(key) => self.cancel_loading(key),
            TreeAction::StartDrag(key) => self.start_drag(key),
            TreeAction::UpdateDrag { target, position } => self.update_drag(target, *position),
            TreeAction::EndDrag => self.end_drag(),
            TreeAction::UpdateVirtualScroll {
                scroll_top,
                container_height,
            } => self.update_virtual_scroll(*scroll_top, *container_height),
            TreeAction::SetItemHeight { key, height } => self.set_item_height(key, *height),
            TreeAction::Destroy => {
                self.state = TreeState {
                    destroyed: true,
                    version: self.state.version,
                    ..TreeState::default()
                };
                true
            }
        };

        if changed {
            self.state.version += 1;
            self.notify(&action);
        } else {
            trace!("{} left the state unchanged", action);
        }
        if matches!(action, TreeAction::Destroy) {
            self.subscribers.clear();
        }
        changed
    }

    fn notify(&mut self, action: &TreeAction) {
        let state = &self.state;
        for (id, subscriber) in self.subscribers.iter_mut() {
            let context = format!("{} on {}", id, action);
            call_isolated(&context, || subscriber(state, action));
        }
    }

    // Derived sequences

    fn current_window(&self) -> VirtualWindow {
        if self.config.virtual_scroll.enabled {
            self.scroller.window()
        } else {
            self.scroller.full_window()
        }
    }

    fn publish_window(&mut self) -> bool {
        let window = self.current_window();
        if *self.state.virtual_state == window {
            return false;
        }
        self.state.virtual_state = Arc::new(window);
        true
    }

    fn refresh_flat(&mut self) {
        let flat = self.state.forest.flatten();
        if *self.state.flat_nodes != flat {
            self.state.flat_nodes = Arc::new(flat);
        }
    }

    /// Recompute the visible list, the `visible` flags and the scroller rows.
    fn refresh_visible(&mut self) {
        let hide_unmatched = self.state.searching && self.config.search.hide_unmatched;
        let only = hide_unmatched.then(|| &*self.state.matched_ids);
        let visible = visible_ids(&self.state.forest, self.state.searching, only);

        let shown: HashSet<NodeId> = visible.iter().copied().collect();
        let flips: Vec<(NodeId, bool)> = self
            .state
            .forest
            .iter()
            .filter(|(id, node)| node.flags.visible != shown.contains(id))
            .map(|(id, node)| (id, !node.flags.visible))
            .collect();
        if !flips.is_empty() {
            let forest = Arc::make_mut(&mut self.state.forest);
            for (id, value) in flips {
                if let Some(node) = forest.get_mut(id) {
                    node.flags.visible = value;
                }
            }
        }

        self.scroller.set_items(
            visible
                .iter()
                .filter_map(|&id| self.state.forest.get(id))
                .map(|node| node.key.clone()),
        );
        if *self.state.visible_nodes != visible {
            self.state.visible_nodes = Arc::new(visible);
        }
        self.publish_window();
    }

    /// Full refresh after the node graph itself changed.
    fn refresh_structure(&mut self) {
        if self.selection.mode() == SelectionMode::Cascade {
            let forest = Arc::make_mut(&mut self.state.forest);
            let selected = Arc::make_mut(&mut self.state.selected_ids);
            self.selection.sync_cascade(forest, selected);
        }
        self.refresh_flat();
        if self.state.searching {
            let keyword = self.state.search_keyword.clone();
            self.apply_search(&keyword);
        } else {
            self.refresh_visible();
        }
    }

    /// Drop keys that no longer exist from every id set.
    fn purge_keys(&mut self, keys: &[NodeKey]) {
        if keys.is_empty() {
            return;
        }
        for set in [
            &mut self.state.selected_ids,
            &mut self.state.expanded_ids,
            &mut self.state.matched_ids,
            &mut self.state.loading_ids,
        ] {
            if keys.iter().any(|key| set.contains(key)) {
                let set = Arc::make_mut(set);
                for key in keys {
                    set.remove(key);
                }
            }
        }

        let drag = &self.state.drag_state;
        let involved = [&drag.drag_node, &drag.drop_target]
            .into_iter()
            .flatten()
            .any(|key| keys.contains(key));
        self.scroller.forget_item_heights(keys);
        if involved {
            debug!("Drag cancelled because its nodes were removed");
            self.end_drag();
        }
    }

    // Data

    fn set_data(&mut self, data: &[TreeNodeData]) {
        let mut forest = Forest::from_data(data);
        let mut selected = IdSet::new();
        let mut expanded = IdSet::new();
        let mut loading = IdSet::new();

        let all: Vec<NodeId> = forest.flatten();
        for &id in &all {
            let Some(node) = forest.get_mut(id) else {
                continue;
            };
            if node.flags.loading {
                loading.insert(node.key.clone());
            }
            let expand = (self.config.default_expand_all && node.flags.has_children)
                || self.config.default_expanded_keys.contains(&node.key);
            if expand {
                node.flags.expanded = true;
                expanded.insert(node.key.clone());
            }
        }
        for key in &self.config.default_selected_keys {
            match forest.id_of(key) {
                Some(id) => {
                    self.selection.select(&mut forest, &mut selected, id, true);
                }
                None => debug!("Default selected key {} is not in the data", key),
            }
        }
        self.selection.sync_cascade(&mut forest, &mut selected);

        debug!("Loaded {} nodes in {} roots", forest.len(), forest.roots().len());
        self.state.forest = Arc::new(forest);
        self.state.flat_nodes = Arc::new(all);
        self.state.visible_nodes = Arc::default();
        self.state.selected_ids = Arc::new(selected);
        self.state.expanded_ids = Arc::new(expanded);
        self.state.matched_ids = Arc::default();
        self.state.loading_ids = Arc::new(loading);
        self.state.drag_state = Arc::default();
        self.state.search_keyword.clear();
        self.state.searching = false;
        self.scroller.clear_item_heights();
        self.refresh_visible();
    }

    fn add_node(&mut self, parent: Option<&NodeKey>, data: &TreeNodeData, index: Option<usize>) -> bool {
        let parent_id = match parent {
            Some(key) => match self.state.forest.id_of(key) {
                Some(id) => Some(id),
                None => return false,
            },
            None => None,
        };
        if self.state.forest.contains_key(&data.id) {
            warn!("Cannot add {}: key already exists", data.id);
            return false;
        }

        let forest = Arc::make_mut(&mut self.state.forest);
        if forest.insert(parent_id, data, index).is_none() {
            return false;
        }
        self.refresh_structure();
        true
    }

    fn remove_node(&mut self, key: &NodeKey) -> bool {
        let Some(id) = self.state.forest.id_of(key) else {
            return false;
        };
        let mut doomed = vec![key.clone()];
        doomed.extend(
            self.state
                .forest
                .descendants(id)
                .into_iter()
                .filter_map(|d| self.state.forest.key(d).cloned()),
        );

        self.purge_keys(&doomed);
        Arc::make_mut(&mut self.state.forest).remove(id);
        self.refresh_structure();
        true
    }

    fn update_node(&mut self, key: &NodeKey, patch: &NodePatch) -> bool {
        let Some(id) = self.state.forest.id_of(key) else {
            return false;
        };
        if patch.is_empty() {
            return false;
        }

        let forest = Arc::make_mut(&mut self.state.forest);
        let Some(node) = forest.get_mut(id) else {
            return false;
        };
        if !patch.apply(node) {
            return false;
        }

        // A node that can no longer be selected drops its selection
        if !node.is_selectable() && (node.flags.selected || node.flags.indeterminate) {
            node.flags.selected = false;
            node.flags.indeterminate = false;
            Arc::make_mut(&mut self.state.selected_ids).remove(key);
        }
        self.refresh_structure();
        true
    }

    fn move_node(&mut self, key: &NodeKey, parent: Option<&NodeKey>, index: Option<usize>) -> bool {
        let Some(id) = self.state.forest.id_of(key) else {
            return false;
        };
        let parent_id = match parent {
            Some(parent_key) => match self.state.forest.id_of(parent_key) {
                Some(pid) => Some(pid),
                None => return false,
            },
            None => None,
        };
        if let Some(pid) = parent_id {
            if pid == id || self.state.forest.is_ancestor_of(id, pid) {
                debug!("Refusing to move {} into its own subtree", key);
                return false;
            }
        }

        if !Arc::make_mut(&mut self.state.forest).move_to(id, parent_id, index) {
            return false;
        }
        self.refresh_structure();
        true
    }

    // Selection

    fn select_node(&mut self, key: &NodeKey, value: Option<bool>) -> bool {
        let Some(id) = self.state.forest.id_of(key) else {
            return false;
        };
        if !self.selection.accepts(&self.state.forest, id) {
            return false;
        }
        let value = value.unwrap_or_else(|| {
            !self.state.forest.get(id).map(|n| n.flags.selected).unwrap_or(false)
        });
        if !self
            .selection
            .would_select(&self.state.forest, &self.state.selected_ids, id, value)
        {
            return false;
        }

        let forest = Arc::make_mut(&mut self.state.forest);
        let selected = Arc::make_mut(&mut self.state.selected_ids);
        self.selection.select(forest, selected, id, value)
    }

    fn select_all(&mut self) -> bool {
        if !self.selection.would_select_all(&self.state.forest) {
            return false;
        }
        let forest = Arc::make_mut(&mut self.state.forest);
        let selected = Arc::make_mut(&mut self.state.selected_ids);
        self.selection.select_all(forest, selected)
    }

    fn deselect_all(&mut self) -> bool {
        let any = self
            .state
            .forest
            .iter()
            .any(|(_, n)| n.flags.selected || n.flags.indeterminate);
        if self.selection.mode() == SelectionMode::None || !any {
            return false;
        }
        let forest = Arc::make_mut(&mut self.state.forest);
        let selected = Arc::make_mut(&mut self.state.selected_ids);
        self.selection.deselect_all(forest, selected)
    }

    fn invert_selection(&mut self) -> bool {
        if !self.selection.would_invert(&self.state.forest) {
            return false;
        }
        let forest = Arc::make_mut(&mut self.state.forest);
        let selected = Arc::make_mut(&mut self.state.selected_ids);
        self.selection.invert(forest, selected)
    }

    // Expansion

    fn expand_node(&mut self, key: &NodeKey, value: Option<bool>) -> bool {
        let Some(node) = self.state.node(key) else {
            return false;
        };
        let value = value.unwrap_or(!node.flags.expanded);
        if node.flags.expanded == value {
            return false;
        }
        if value && !node.flags.has_children {
            return false;
        }

        let forest = Arc::make_mut(&mut self.state.forest);
        let expanded = Arc::make_mut(&mut self.state.expanded_ids);
        set_expanded(forest, expanded, key, value);
        self.refresh_visible();
        true
    }

    fn expand_all(&mut self, value: bool) -> bool {
        let targets: Vec<NodeKey> = self
            .state
            .forest
            .iter()
            .filter(|(_, n)| n.flags.expanded != value && (!value || n.flags.has_children))
            .map(|(_, n)| n.key.clone())
            .collect();
        if targets.is_empty() {
            return false;
        }

        let forest = Arc::make_mut(&mut self.state.forest);
        let expanded = Arc::make_mut(&mut self.state.expanded_ids);
        for key in &targets {
            set_expanded(forest, expanded, key, value);
        }
        self.refresh_visible();
        true
    }

    // Search

    fn apply_search(&mut self, keyword: &str) {
        let outcome = self.search.search(&self.state.forest, keyword);
        self.state.search_keyword = keyword.to_string();
        self.state.searching = self.search.is_active(keyword);

        let forest = Arc::make_mut(&mut self.state.forest);
        let ids: Vec<NodeId> = forest.iter().map(|(id, _)| id).collect();
        let mut matched = IdSet::new();
        for id in ids {
            let Some(node) = forest.get_mut(id) else {
                continue;
            };
            node.flags.matched = outcome.matched.contains(&id);
            if node.flags.matched {
                matched.insert(node.key.clone());
            }
            match outcome.direct.get(&id) {
                Some(ranges) => {
                    node.flags.highlighted = true;
                    node.highlights = ranges.clone();
                }
                None => {
                    node.flags.highlighted = false;
                    node.highlights.clear();
                }
            }
        }

        if !outcome.expand.is_empty() {
            let expanded = Arc::make_mut(&mut self.state.expanded_ids);
            for &id in &outcome.expand {
                if let Some(node) = forest.get_mut(id) {
                    node.flags.expanded = true;
                    expanded.insert(node.key.clone());
                }
            }
        }

        if *self.state.matched_ids != matched {
            self.state.matched_ids = Arc::new(matched);
        }
        self.refresh_visible();
    }

    /// Drop match state. Expansions made by the search are kept.
    fn clear_search(&mut self) -> bool {
        let dirty = self
            .state
            .forest
            .iter()
            .any(|(_, n)| n.flags.matched || n.flags.highlighted);
        if !self.state.searching && self.state.search_keyword.is_empty() && !dirty {
            return false;
        }

        self.state.search_keyword.clear();
        self.state.searching = false;
        if dirty {
            for node in Arc::make_mut(&mut self.state.forest).iter_mut() {
                node.flags.matched = false;
                node.flags.highlighted = false;
                node.highlights.clear();
            }
        }
        if !self.state.matched_ids.is_empty() {
            self.state.matched_ids = Arc::default();
        }
        self.refresh_visible();
        true
    }

    // Loading

    fn start_loading(&mut self, key: &NodeKey) -> bool {
        if self.state.forest.id_of(key).is_none() || self.state.loading_ids.contains(key) {
            return false;
        }
        if let Some(node) = Arc::make_mut(&mut self.state.forest).get_by_key_mut(key) {
            node.flags.loading = true;
            node.error = None;
        }
        Arc::make_mut(&mut self.state.loading_ids).insert(key.clone());
        true
    }

    fn finish_loading(
        &mut self,
        key: &NodeKey,
        result: &std::result::Result<Vec<TreeNodeData>, String>,
    ) -> bool {
        let Some(id) = self.state.forest.id_of(key) else {
            return false;
        };
        if !self.state.loading_ids.contains(key) {
            debug!("Ignoring load result for {} which is not loading", key);
            return false;
        }
        Arc::make_mut(&mut self.state.loading_ids).remove(key);

        match result {
            Ok(children) => {
                let stale: Vec<NodeKey> = self
                    .state
                    .forest
                    .descendants(id)
                    .into_iter()
                    .filter_map(|d| self.state.forest.key(d).cloned())
                    .collect();
                self.purge_keys(&stale);

                let forest = Arc::make_mut(&mut self.state.forest);
                forest.replace_children(id, children);
                let parent_selected = match forest.get_mut(id) {
                    Some(node) => {
                        node.flags.loading = false;
                        node.flags.loaded = true;
                        node.error = None;
                        node.flags.selected
                    }
                    None => false,
                };
                // New children inherit a checked parent
                if parent_selected && self.selection.mode() == SelectionMode::Cascade {
                    let selected = Arc::make_mut(&mut self.state.selected_ids);
                    self.selection.select(forest, selected, id, true);
                }
                debug!("Loaded {} children under {}", children.len(), key);
            }
            Err(message) => {
                if let Some(node) = Arc::make_mut(&mut self.state.forest).get_mut(id) {
                    node.flags.loading = false;
                    node.flags.loaded = false;
                    node.error = Some(message.clone());
                }
                debug!("Loading {} failed: {}", key, message);
            }
        }
        self.refresh_structure();
        true
    }

    fn cancel_loading(&mut self, key: &NodeKey) -> bool {
        if !self.state.loading_ids.contains(key) {
            return false;
        }
        Arc::make_mut(&mut self.state.loading_ids).remove(key);
        if let Some(node) = Arc::make_mut(&mut self.state.forest).get_by_key_mut(key) {
            node.flags.loading = false;
        }
        true
    }

    // Drag and drop

    fn start_drag(&mut self, key: &NodeKey) -> bool {
        let Some(node) = self.state.node(key) else {
            return false;
        };
        if !self.drag.can_drag(node) {
            debug!("{} cannot be dragged", key);
            return false;
        }
        if self.state.drag_state.is_dragging() {
            self.end_drag();
        }

        if let Some(node) = Arc::make_mut(&mut self.state.forest).get_by_key_mut(key) {
            node.flags.dragging = true;
        }
        self.state.drag_state = Arc::new(DragState {
            phase: DragPhase::Dragging,
            drag_node: Some(key.clone()),
            ..DragState::default()
        });
        true
    }

    fn update_drag(&mut self, target: &NodeKey, position: DropPosition) -> bool {
        let Some(drag_key) = self.state.drag_state.drag_node.clone() else {
            return false;
        };
        let forest = &self.state.forest;
        let (Some(drag_id), Some(target_id)) = (forest.id_of(&drag_key), forest.id_of(target)) else {
            return false;
        };
        let verdict = self.drag.evaluate(forest, drag_id, target_id, position);

        let next = DragState {
            phase: DragPhase::Evaluating,
            drag_node: Some(drag_key),
            drop_target: Some(target.clone()),
            position: Some(position),
            allow_drop: verdict.allow_drop(),
        };
        if *self.state.drag_state == next {
            return false;
        }
        if let Some(reason) = verdict.rejection {
            trace!("Drop on {} ({}) rejected: {}", target, position, reason);
        }

        let previous = self.state.drag_state.drop_target.clone();
        let forest = Arc::make_mut(&mut self.state.forest);
        if let Some(node) = previous.and_then(|key| forest.get_by_key_mut(&key)) {
            node.flags.drop_target = false;
        }
        if let Some(node) = forest.get_mut(target_id) {
            node.flags.drop_target = next.allow_drop;
        }
        self.state.drag_state = Arc::new(next);
        true
    }

    /// Clear every drag flag, whether or not a drop happened.
    fn end_drag(&mut self) -> bool {
        let stuck = self
            .state
            .forest
            .iter()
            .any(|(_, n)| n.flags.dragging || n.flags.drop_target);
        if !self.state.drag_state.is_dragging() && !stuck {
            return false;
        }
        if stuck {
            for node in Arc::make_mut(&mut self.state.forest).iter_mut() {
                node.flags.dragging = false;
                node.flags.drop_target = false;
            }
        }
        self.state.drag_state = Arc::default();
        true
    }

    // Virtual scroll

    fn update_virtual_scroll(&mut self, scroll_top: f64, container_height: Option<f64>) -> bool {
        if let Some(height) = container_height {
            self.scroller.set_container_height(height);
        }
        self.scroller.update(scroll_top);
        self.publish_window()
    }

    fn set_item_height(&mut self, key: &NodeKey, height: Option<f64>) -> bool {
        if !self.scroller.set_item_height(key, height) {
            return false;
        }
        self.publish_window()
    }
}

fn set_expanded(forest: &mut Forest, expanded: &mut IdSet, key: &NodeKey, value: bool) {
    if let Some(node) = forest.get_by_key_mut(key) {
        node.flags.expanded = value;
    }
    if value {
        expanded.insert(key.clone());
    } else {
        expanded.remove(key);
    }
}

/// Depth-first visible sequence.
///
/// Children are walked when their parent is expanded or `reveal_all` is set.
/// With `only`, nodes outside the set are skipped together with their
/// subtrees.
fn visible_ids(forest: &Forest, reveal_all: bool, only: Option<&IdSet>) -> Vec<NodeId> {
    let mut visible = Vec::new();
    let mut stack: Vec<NodeId> = forest.roots().iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        let Some(node) = forest.get(id) else {
            continue;
        };
        if only.map(|set| !set.contains(&node.key)).unwrap_or(false) {
            continue;
        }
        visible.push(id);
        if node.flags.expanded || reveal_all {
            stack.extend(node.children.iter().rev().copied());
        }
    }
    visible
}
