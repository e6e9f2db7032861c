//! Facade tying the state manager to the event emitter
//!
//! [`TreeEngine`] is the surface rendering adapters talk to. Each operation
//! dispatches one or more actions and emits the matching event once the
//! change is committed. Cancelable events (`drop`, `load-start`,
//! `load-success`) are emitted before the commit instead, and a listener
//! calling `prevent_default()` stops it.

use anyhow::Result;
use log::{debug, info};
use tree_model::{NodeKey, TreeNode, TreeNodeData};

use crate::config::TreeConfig;
use crate::drag_drop::{DragDropEngine, DragPhase, DropPosition};
use crate::events::{EventEmitter, ListenerId, TreeEvent, TreeEventKind};
use crate::state::{NodePatch, StateManager, SubscriptionId, TreeAction, TreeState};
use crate::virtual_scroll::{ScrollAlign, VirtualWindow};

#[derive(Debug)]
pub struct TreeEngine {
    manager: StateManager,
    events: EventEmitter,
}

impl TreeEngine {
    /// Create an engine and load the initial data.
    pub fn new(config: TreeConfig, data: Vec<TreeNodeData>) -> Self {
        let mut manager = StateManager::new(config);
        manager.dispatch(TreeAction::Init(data));
        info!(
            "Tree engine ready with {} nodes ({} selection)",
            manager.state().forest.len(),
            manager.selection_mode()
        );
        Self {
            manager,
            events: EventEmitter::new(),
        }
    }

    /// Create an engine from a JSON list of root nodes.
    pub fn from_json(config: TreeConfig, json: &str) -> Result<Self> {
        let data = TreeNodeData::list_from_json(json)?;
        Ok(Self::new(config, data))
    }

    pub fn config(&self) -> &TreeConfig {
        self.manager.config()
    }

    fn emit(&mut self, kind: TreeEventKind, nodes: Vec<NodeKey>) -> bool {
        let event = TreeEvent::new(kind, nodes, self.manager.state());
        self.emit_event(event)
    }

    fn emit_event(&mut self, mut event: TreeEvent) -> bool {
        self.events.emit(&mut event)
    }

    fn dispatch(&mut self, action: TreeAction) -> bool {
        self.manager.dispatch(action)
    }

    // Data

    pub fn set_data(&mut self, data: Vec<TreeNodeData>) {
        let roots: Vec<NodeKey> = data.iter().map(|d| d.id.clone()).collect();
        if self.dispatch(TreeAction::SetData(data)) {
            self.emit(TreeEventKind::Change, roots);
        }
    }

    pub fn add_node(&mut self, parent: Option<NodeKey>, data: TreeNodeData, index: Option<usize>) -> bool {
        let key = data.id.clone();
        let added = self.dispatch(TreeAction::AddNode { parent, data, index });
        if added {
            self.emit(TreeEventKind::Change, vec![key]);
        }
        added
    }

    pub fn remove_node(&mut self, key: &NodeKey) -> bool {
        let removed = self.dispatch(TreeAction::RemoveNode(key.clone()));
        if removed {
            self.emit(TreeEventKind::Change, vec![key.clone()]);
        }
        removed
    }

    pub fn update_node(&mut self, key: &NodeKey, patch: NodePatch) -> bool {
        let updated = self.dispatch(TreeAction::UpdateNode {
            key: key.clone(),
            patch,
        });
        if updated {
            self.emit(TreeEventKind::Change, vec![key.clone()]);
        }
        updated
    }

    /// Move `key` under `parent` (or to the root list) at `index`.
    pub fn move_node(&mut self, key: &NodeKey, parent: Option<NodeKey>, index: Option<usize>) -> bool {
        let moved = self.dispatch(TreeAction::MoveNode {
            key: key.clone(),
            parent,
            index,
        });
        if moved {
            self.emit(TreeEventKind::Change, vec![key.clone()]);
        }
        moved
    }

    /// Structurally independent copy of a node, for clipboard-style reuse.
    pub fn clone_node(&self, key: &NodeKey, deep: bool) -> Option<TreeNodeData> {
        let forest = &self.manager.state().forest;
        forest.clone_subtree(forest.id_of(key)?, deep)
    }

    /// Export the current tree back into its input form.
    pub fn to_data(&self) -> Vec<TreeNodeData> {
        self.manager.state().forest.to_data()
    }

    // Selection

    pub fn select_node(&mut self, key: &NodeKey, selected: bool) -> bool {
        self.select(key, Some(selected))
    }

    pub fn toggle_select(&mut self, key: &NodeKey) -> bool {
        self.select(key, None)
    }

    fn select(&mut self, key: &NodeKey, selected: Option<bool>) -> bool {
        let changed = self.dispatch(TreeAction::SelectNode {
            key: key.clone(),
            selected,
        });
        if changed {
            self.emit(TreeEventKind::Select, vec![key.clone()]);
        }
        changed
    }

    fn bulk_select(&mut self, action: TreeAction) -> bool {
        let changed = self.dispatch(action);
        if changed {
            let keys = self.get_checked_keys();
            self.emit(TreeEventKind::Select, keys);
        }
        changed
    }

    pub fn select_all(&mut self) -> bool {
        self.bulk_select(TreeAction::SelectAll)
    }

    pub fn deselect_all(&mut self) -> bool {
        self.bulk_select(TreeAction::DeselectAll)
    }

    pub fn invert_selection(&mut self) -> bool {
        self.bulk_select(TreeAction::InvertSelection)
    }

    // Expansion

    pub fn expand_node(&mut self, key: &NodeKey, expanded: bool) -> bool {
        self.expand(key, Some(expanded))
    }

    pub fn toggle_expand(&mut self, key: &NodeKey) -> bool {
        self.expand(key, None)
    }

    fn expand(&mut self, key: &NodeKey, expanded: Option<bool>) -> bool {
        let changed = self.dispatch(TreeAction::ExpandNode {
            key: key.clone(),
            expanded,
        });
        if changed {
            let now = self
                .manager
                .state()
                .node(key)
                .map(|n| n.flags.expanded)
                .unwrap_or(false);
            let kind = if now {
                TreeEventKind::Expand
            } else {
                TreeEventKind::Collapse
            };
            self.emit(kind, vec![key.clone()]);
        }
        changed
    }

    pub fn expand_all(&mut self) -> bool {
        let opened = self.keys_where(|n| !n.flags.expanded && n.flags.has_children);
        let changed = self.dispatch(TreeAction::ExpandAll);
        if changed {
            self.emit(TreeEventKind::Expand, opened);
        }
        changed
    }

    pub fn collapse_all(&mut self) -> bool {
        let closed = self.keys_where(|n| n.flags.expanded);
        let changed = self.dispatch(TreeAction::CollapseAll);
        if changed {
            self.emit(TreeEventKind::Collapse, closed);
        }
        changed
    }

    /// Expand every ancestor of `key` so that it becomes visible.
    pub fn expand_to(&mut self, key: &NodeKey) -> bool {
        let Some(node) = self.manager.state().node(key) else {
            return false;
        };
        let ancestors: Vec<NodeKey> = node.path[..node.path.len() - 1].to_vec();

        let mut opened = Vec::new();
        for ancestor in ancestors {
            let changed = self.dispatch(TreeAction::ExpandNode {
                key: ancestor.clone(),
                expanded: Some(true),
            });
            if changed {
                opened.push(ancestor);
            }
        }
        if opened.is_empty() {
            return false;
        }
        self.emit(TreeEventKind::Expand, opened);
        true
    }

    // Search

    /// Search the configured fields for `keyword` and emit the matches.
    pub fn search(&mut self, keyword: &str) {
        self.dispatch(TreeAction::Search(keyword.to_string()));
        let matches = self.keys_where(|n| n.flags.highlighted);
        let event = TreeEvent::new(TreeEventKind::Search, matches, self.manager.state()).with_keyword(keyword);
        self.emit_event(event);
    }

    pub fn clear_search(&mut self) -> bool {
        let changed = self.dispatch(TreeAction::ClearSearch);
        if changed {
            let event = TreeEvent::new(TreeEventKind::Search, Vec::new(), self.manager.state()).with_keyword("");
            self.emit_event(event);
        }
        changed
    }

    // Drag and drop

    pub fn on_drag_start(&mut self, key: &NodeKey) -> bool {
        let started = self.dispatch(TreeAction::StartDrag(key.clone()));
        if started {
            self.emit(TreeEventKind::DragStart, vec![key.clone()]);
        }
        started
    }

    /// Hover `target` with the pointer `offset_y` pixels below the top of a
    /// row `height` pixels tall. Returns whether a drop there is allowed.
    pub fn on_drag_over(&mut self, target: &NodeKey, offset_y: f64, height: f64) -> bool {
        let position = DragDropEngine::classify(offset_y, height);
        self.drag_over(target, position)
    }

    /// Hover `target` at an explicit position.
    pub fn drag_over(&mut self, target: &NodeKey, position: DropPosition) -> bool {
        self.dispatch(TreeAction::UpdateDrag {
            target: target.clone(),
            position,
        });
        let drag = &self.manager.state().drag_state;
        drag.allow_drop && drag.drop_target.as_ref() == Some(target)
    }

    /// Commit the drop on the currently hovered target.
    ///
    /// Returns whether the node moved. The drag ends either way.
    pub fn on_drop(&mut self) -> bool {
        let moved = self.commit_drop();
        self.on_drag_end();
        moved
    }

    fn commit_drop(&mut self) -> bool {
        let drag = self.manager.state().drag_state.as_ref().clone();
        let (DragPhase::Evaluating, Some(drag_key), Some(target), Some(position), true) =
            (drag.phase, drag.drag_node, drag.drop_target, drag.position, drag.allow_drop)
        else {
            debug!("Drop ignored: no allowed target");
            return false;
        };

        let forest = &self.manager.state().forest;
        let (Some(drag_id), Some(target_id)) = (forest.id_of(&drag_key), forest.id_of(&target)) else {
            return false;
        };
        if !self
            .manager
            .drag_engine()
            .evaluate(forest, drag_id, target_id, position)
            .allow_drop()
        {
            return false;
        }
        let Some(plan) = DragDropEngine::plan(forest, drag_id, target_id, position) else {
            return false;
        };
        let parent = plan.parent.and_then(|p| forest.get(p)).map(|n| n.key.clone());

        let event = TreeEvent::new(TreeEventKind::Drop, vec![drag_key.clone()], self.manager.state())
            .with_drop(target, position);
        if !self.emit_event(event) {
            debug!("Drop of {} vetoed by a listener", drag_key);
            return false;
        }

        self.move_node(&drag_key, parent, plan.index)
    }

    /// End the drag, clearing every drag flag.
    pub fn on_drag_end(&mut self) -> bool {
        let key = self.manager.state().drag_state.drag_node.clone();
        let ended = self.dispatch(TreeAction::EndDrag);
        if ended {
            self.emit(TreeEventKind::DragEnd, key.into_iter().collect());
        }
        ended
    }

    pub fn cancel_drag(&mut self) -> bool {
        self.on_drag_end()
    }

    // Loading

    /// Mark `key` as loading. Listeners may veto through `load-start`.
    pub fn start_load(&mut self, key: &NodeKey) -> bool {
        let state = self.manager.state();
        if state.node(key).is_none() || state.loading_ids.contains(key) {
            return false;
        }
        if !self.emit(TreeEventKind::LoadStart, vec![key.clone()]) {
            debug!("Loading {} vetoed by a listener", key);
            return false;
        }
        self.dispatch(TreeAction::StartLoading(key.clone()))
    }

    /// Install loaded `children` under `key`. A listener vetoing
    /// `load-success` cancels the load instead.
    pub fn finish_load(&mut self, key: &NodeKey, children: Vec<TreeNodeData>) -> bool {
        if !self.manager.state().loading_ids.contains(key) {
            return false;
        }
        if !self.emit(TreeEventKind::LoadSuccess, vec![key.clone()]) {
            self.cancel_load(key);
            return false;
        }
        let loaded = self.dispatch(TreeAction::FinishLoading {
            key: key.clone(),
            result: Ok(children),
        });
        if loaded {
            self.emit(TreeEventKind::Change, vec![key.clone()]);
        }
        loaded
    }

    pub fn fail_load(&mut self, key: &NodeKey, error: impl Into<String>) -> bool {
        let error = error.into();
        let failed = self.dispatch(TreeAction::FinishLoading {
            key: key.clone(),
            result: Err(error.clone()),
        });
        if failed {
            let event =
                TreeEvent::new(TreeEventKind::LoadError, vec![key.clone()], self.manager.state()).with_error(error);
            self.emit_event(event);
        }
        failed
    }

    pub fn cancel_load(&mut self, key: &NodeKey) -> bool {
        let cancelled = self.dispatch(TreeAction::CancelLoading(key.clone()));
        if cancelled {
            self.emit(TreeEventKind::LoadCancel, vec![key.clone()]);
        }
        cancelled
    }

    // Virtual scroll

    pub fn scroll_to(&mut self, scroll_top: f64) -> &VirtualWindow {
        self.dispatch(TreeAction::UpdateVirtualScroll {
            scroll_top,
            container_height: None,
        });
        self.virtual_window()
    }

    /// Reveal `key` (expanding its ancestors) and scroll it into view.
    pub fn scroll_to_node(&mut self, key: &NodeKey, align: ScrollAlign) -> bool {
        if self.manager.state().node(key).is_none() {
            return false;
        }
        self.expand_to(key);
        let Some(scroll_top) = self.manager.scroller().scroll_target(key, align) else {
            debug!("{} is not in the visible sequence", key);
            return false;
        };
        self.dispatch(TreeAction::UpdateVirtualScroll {
            scroll_top,
            container_height: None,
        });
        true
    }

    pub fn set_container_height(&mut self, height: f64) -> bool {
        let scroll_top = self.manager.scroller().scroll_top();
        self.dispatch(TreeAction::UpdateVirtualScroll {
            scroll_top,
            container_height: Some(height),
        })
    }

    /// Override a row height; `None` restores the default.
    pub fn set_item_height(&mut self, key: &NodeKey, height: Option<f64>) -> bool {
        self.dispatch(TreeAction::SetItemHeight {
            key: key.clone(),
            height,
        })
    }

    pub fn virtual_window(&self) -> &VirtualWindow {
        &self.manager.state().virtual_state
    }

    // Queries

    pub fn get_state(&self) -> &TreeState {
        self.manager.state()
    }

    pub fn get_node(&self, key: &NodeKey) -> Option<&TreeNode> {
        self.manager.state().node(key)
    }

    pub fn get_selected_nodes(&self) -> Vec<&TreeNode> {
        self.manager.state().selected_nodes()
    }

    pub fn get_visible_nodes(&self) -> Vec<&TreeNode> {
        self.manager.state().visible().collect()
    }

    /// Selected keys in depth-first order
    pub fn get_checked_keys(&self) -> Vec<NodeKey> {
        self.keys_where(|n| n.flags.selected)
    }

    pub fn get_half_checked_keys(&self) -> Vec<NodeKey> {
        self.manager.state().indeterminate_keys()
    }

    fn keys_where(&self, predicate: impl Fn(&TreeNode) -> bool) -> Vec<NodeKey> {
        let state = self.manager.state();
        state
            .flat_nodes
            .iter()
            .filter_map(|&id| state.forest.get(id))
            .filter(|n| predicate(n))
            .map(|n| n.key.clone())
            .collect()
    }

    // Listeners

    pub fn on<F>(&mut self, kind: TreeEventKind, handler: F) -> ListenerId
    where
        F: FnMut(&mut TreeEvent) -> Result<()> + 'static,
    {
        self.events.on(kind, handler)
    }

    pub fn once<F>(&mut self, kind: TreeEventKind, handler: F) -> ListenerId
    where
        F: FnMut(&mut TreeEvent) -> Result<()> + 'static,
    {
        self.events.once(kind, handler)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    pub fn subscribe<F>(&mut self, subscriber: F) -> SubscriptionId
    where
        F: FnMut(&TreeState, &TreeAction) -> Result<()> + 'static,
    {
        self.manager.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.manager.unsubscribe(id)
    }

    /// Tear the engine down. Later operations are ignored.
    pub fn destroy(&mut self) {
        if self.dispatch(TreeAction::Destroy) {
            info!("Tree engine destroyed");
        }
        self.events.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.manager.state().destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DragMode, SelectionMode};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn engine(config: TreeConfig) -> TreeEngine {
        TreeEngine::new(
            config,
            vec![
                TreeNodeData::new("A", "A"),
                TreeNodeData::new("B", "B")
                    .child(TreeNodeData::new("B1", "B1"))
                    .child(TreeNodeData::new("B2", "B2")),
                TreeNodeData::new("C", "C"),
            ],
        )
    }

    fn record(engine: &mut TreeEngine, kind: TreeEventKind) -> Rc<RefCell<Vec<Vec<NodeKey>>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        engine.on(kind, move |e| {
            sink.borrow_mut().push(e.nodes.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn test_expand_and_collapse_all_report_what_flipped() {
        let mut engine = TreeEngine::new(
            TreeConfig::default(),
            vec![
                TreeNodeData::new("B", "B")
                    .child(TreeNodeData::new("B1", "B1").child(TreeNodeData::new("B11", "B11"))),
                TreeNodeData::new("D", "D").child(TreeNodeData::new("D1", "D1")),
                TreeNodeData::new("E", "E"),
            ],
        );
        let opened = record(&mut engine, TreeEventKind::Expand);
        let closed = record(&mut engine, TreeEventKind::Collapse);

        engine.expand_node(&"B".into(), true);
        assert!(engine.expand_all());
        assert!(!engine.expand_all());
        assert_eq!(opened.borrow()[1], vec![NodeKey::from("B1"), NodeKey::from("D")]);
        assert_eq!(opened.borrow().len(), 2);

        assert!(engine.collapse_all());
        assert!(!engine.collapse_all());
        assert_eq!(
            *closed.borrow(),
            vec![vec![NodeKey::from("B"), NodeKey::from("B1"), NodeKey::from("D")]]
        );
    }

    #[test]
    fn test_select_emits_after_commit() {
        let mut engine = engine(TreeConfig::default().selection_mode(SelectionMode::Cascade));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        engine.on(TreeEventKind::Select, move |e| {
            sink.borrow_mut().push(e.selected_ids.len());
            Ok(())
        });

        assert!(engine.select_node(&"B".into(), true));
        assert!(!engine.select_node(&"B".into(), true));
        assert_eq!(*seen.borrow(), vec![3]);
        assert_eq!(
            engine.get_checked_keys(),
            vec![NodeKey::from("B"), "B1".into(), "B2".into()]
        );
    }

    #[test]
    fn test_expand_and_collapse_events() {
        let mut engine = engine(TreeConfig::default());
        let expanded = record(&mut engine, TreeEventKind::Expand);
        let collapsed = record(&mut engine, TreeEventKind::Collapse);

        assert!(engine.toggle_expand(&"B".into()));
        assert!(engine.toggle_expand(&"B".into()));
        assert!(!engine.expand_node(&"A".into(), true));
        assert_eq!(*expanded.borrow(), vec![vec![NodeKey::from("B")]]);
        assert_eq!(collapsed.borrow().len(), 1);

        assert!(engine.expand_to(&"B2".into()));
        assert!(!engine.expand_to(&"B2".into()));
        assert_eq!(engine.get_visible_nodes().len(), 5);
    }

    #[test]
    fn test_vetoed_drop_keeps_structure() {
        let mut engine = engine(TreeConfig::default().drag(DragMode::Full));
        engine.on(TreeEventKind::Drop, |e| {
            e.prevent_default();
            Ok(())
        });
        let ended = record(&mut engine, TreeEventKind::DragEnd);

        assert!(engine.on_drag_start(&"A".into()));
        assert!(engine.on_drag_over(&"C".into(), 16.0, 32.0));
        assert!(!engine.on_drop());

        let state = engine.get_state();
        assert!(state.node(&"A".into()).unwrap().is_root());
        assert!(!state.drag_state.is_dragging());
        assert!(state.forest.iter().all(|(_, n)| !n.flags.dragging && !n.flags.drop_target));
        assert_eq!(ended.borrow().len(), 1);
    }

    #[test]
    fn test_load_lifecycle() {
        let mut engine = TreeEngine::new(
            TreeConfig::default(),
            vec![TreeNodeData::new("lazy", "Lazy").has_children(true)],
        );
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        engine.on(TreeEventKind::LoadError, move |e| {
            sink.borrow_mut().push(e.error.clone());
            Ok(())
        });
        let key = NodeKey::from("lazy");

        assert!(engine.start_load(&key));
        assert!(!engine.start_load(&key));
        assert!(engine.fail_load(&key, "timeout"));
        assert_eq!(*errors.borrow(), vec![Some("timeout".to_string())]);
        assert_eq!(engine.get_node(&key).unwrap().error.as_deref(), Some("timeout"));

        assert!(engine.start_load(&key));
        assert!(engine.get_node(&key).unwrap().error.is_none());
        assert!(engine.finish_load(&key, vec![TreeNodeData::new("child", "Child")]));
        let node = engine.get_node(&key).unwrap();
        assert!(node.flags.loaded && !node.flags.loading);
        assert!(engine.get_state().loading_ids.is_empty());
        assert!(!engine.finish_load(&key, Vec::new()));
    }

    #[test]
    fn test_vetoed_load_success_cancels() {
        let mut engine = TreeEngine::new(
            TreeConfig::default(),
            vec![TreeNodeData::new("lazy", "Lazy").has_children(true)],
        );
        engine.on(TreeEventKind::LoadSuccess, |e| {
            e.prevent_default();
            Ok(())
        });
        let cancelled = record(&mut engine, TreeEventKind::LoadCancel);
        let key = NodeKey::from("lazy");

        engine.start_load(&key);
        assert!(!engine.finish_load(&key, vec![TreeNodeData::new("child", "Child")]));
        assert_eq!(cancelled.borrow().len(), 1);
        assert!(engine.get_node(&"child".into()).is_none());
        assert!(!engine.get_node(&key).unwrap().flags.loading);
    }

    #[test]
    fn test_destroy_silences_engine() {
        let mut engine = engine(TreeConfig::default());
        let seen = record(&mut engine, TreeEventKind::Select);
        engine.destroy();
        assert!(engine.is_destroyed());
        assert!(!engine.select_node(&"A".into(), true));
        assert!(seen.borrow().is_empty());
        assert!(engine.get_visible_nodes().is_empty());
    }
}
