use proptest::prelude::*;
use proptest::sample::Index;
use std::collections::HashSet;
use tree_engine::prelude::*;
use tree_engine::{MatchMode, SelectionEngine, VirtualScrollConfig, VirtualScroller};
use tree_model::{Forest, NodeId};

/// Random forest shape: entry `i` either starts a new root or hangs below
/// one of the nodes created before it.
fn shapes() -> impl Strategy<Value = Vec<(bool, Index)>> {
    prop::collection::vec(any::<(bool, Index)>(), 1..40)
}

fn build(shape: &[(bool, Index)]) -> Vec<TreeNodeData> {
    let mut forest = Forest::new();
    let mut ids = Vec::new();
    for (i, (is_root, parent)) in shape.iter().enumerate() {
        let parent = if *is_root || i == 0 {
            None
        } else {
            Some(ids[parent.index(i)])
        };
        let data = TreeNodeData::new(format!("n{}", i), format!("node {}", i));
        ids.push(forest.insert(parent, &data, None).unwrap());
    }
    forest.to_data()
}

fn selectable_children(forest: &Forest, id: NodeId) -> Vec<NodeId> {
    forest
        .siblings(Some(id))
        .iter()
        .copied()
        .filter(|&c| forest.get(c).unwrap().is_selectable())
        .collect()
}

fn assert_cascade_invariant(state: &TreeState) -> Result<(), TestCaseError> {
    let forest = &state.forest;
    for (id, node) in forest.iter() {
        prop_assert_eq!(node.flags.selected, state.selected_ids.contains(&node.key));
        let children = selectable_children(forest, id);
        if children.is_empty() || !node.is_selectable() {
            continue;
        }
        let all = children.iter().all(|&c| forest.get(c).unwrap().flags.selected);
        let some = children.iter().any(|&c| {
            let flags = forest.get(c).unwrap().flags;
            flags.selected || flags.indeterminate
        });
        prop_assert_eq!(node.flags.selected, all, "selected mismatch at {}", node.key);
        prop_assert_eq!(node.flags.indeterminate, !all && some, "indeterminate mismatch at {}", node.key);
    }
    Ok(())
}

fn expected_visible(forest: &Forest) -> Vec<NodeId> {
    fn walk(forest: &Forest, ids: &[NodeId], out: &mut Vec<NodeId>) {
        for &id in ids {
            out.push(id);
            let node = forest.get(id).unwrap();
            if node.flags.expanded {
                walk(forest, &node.children, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(forest, forest.roots(), &mut out);
    out
}

proptest! {
    #[test]
    fn cascade_invariant_holds_after_any_selection(
        shape in shapes(),
        ops in prop::collection::vec((any::<Index>(), any::<bool>()), 1..30),
        disabled in prop::collection::vec(any::<Index>(), 0..4),
    ) {
        let len = shape.len();
        let mut engine = TreeEngine::new(
            TreeConfig::default().selection_mode(SelectionMode::Cascade),
            build(&shape),
        );
        for index in disabled {
            let key = NodeKey::from(format!("n{}", index.index(len)));
            engine.update_node(&key, NodePatch::default().disabled(true));
        }

        for (index, value) in ops {
            let key = NodeKey::from(format!("n{}", index.index(len)));
            engine.select_node(&key, value);
            assert_cascade_invariant(engine.get_state())?;
        }
        engine.invert_selection();
        assert_cascade_invariant(engine.get_state())?;
    }

    #[test]
    fn moves_never_create_cycles(
        shape in shapes(),
        moves in prop::collection::vec((any::<Index>(), any::<Index>(), any::<bool>(), 0usize..4), 1..30),
    ) {
        let len = shape.len();
        let mut engine = TreeEngine::new(TreeConfig::default(), build(&shape));
        for (node, target, to_root, index) in moves {
            let key = NodeKey::from(format!("n{}", node.index(len)));
            let parent = (!to_root).then(|| NodeKey::from(format!("n{}", target.index(len))));
            let was_descendant = parent.as_ref().map(|p| {
                let state = engine.get_state();
                state.node(p).unwrap().path.contains(&key)
            }).unwrap_or(false);

            let moved = engine.move_node(&key, parent, Some(index));
            if was_descendant {
                prop_assert!(!moved);
            }
            let state = engine.get_state();
            prop_assert!(state.forest.validate().is_ok(), "{:?}", state.forest.validate());
            prop_assert_eq!(state.forest.len(), len);
            prop_assert_eq!(state.flat_nodes.len(), len);
        }
    }

    #[test]
    fn visible_nodes_follow_expansion(
        shape in shapes(),
        toggles in prop::collection::vec(any::<Index>(), 0..30),
    ) {
        let len = shape.len();
        let mut engine = TreeEngine::new(TreeConfig::default(), build(&shape));
        for index in toggles {
            engine.toggle_expand(&NodeKey::from(format!("n{}", index.index(len))));
            let state = engine.get_state();
            prop_assert_eq!(&*state.visible_nodes, &expected_visible(&state.forest));
            for (id, node) in state.forest.iter() {
                prop_assert_eq!(node.flags.visible, state.visible_nodes.contains(&id));
                prop_assert_eq!(node.flags.expanded, state.expanded_ids.contains(&node.key));
            }
        }
    }

    #[test]
    fn search_marks_matches_with_ancestors_and_clears(
        shape in shapes(),
        target in any::<Index>(),
    ) {
        let len = shape.len();
        let mut engine = TreeEngine::new(
            TreeConfig::default().search(SearchConfig::default().mode(MatchMode::Exact)),
            build(&shape),
        );
        let key = NodeKey::from(format!("n{}", target.index(len)));
        let label = engine.get_node(&key).unwrap().label.clone();

        engine.search(&label);
        let state = engine.get_state();
        let node = state.node(&key).unwrap();
        prop_assert!(node.flags.highlighted);
        for ancestor in node.path.iter() {
            prop_assert!(state.matched_ids.contains(ancestor));
            prop_assert!(state.visible_nodes.contains(&state.forest.id_of(ancestor).unwrap()));
        }
        let highlighted: HashSet<&NodeKey> = state
            .forest
            .iter()
            .filter(|(_, n)| n.flags.highlighted)
            .map(|(_, n)| &n.key)
            .collect();
        prop_assert_eq!(highlighted, HashSet::from([&key]));

        engine.clear_search();
        let state = engine.get_state();
        prop_assert!(state.matched_ids.is_empty());
        prop_assert!(state.forest.iter().all(|(_, n)| !n.flags.matched && n.highlights.is_empty()));
    }

    #[test]
    fn virtual_window_stays_in_bounds(
        rows in 1usize..300,
        tall in prop::collection::vec((any::<Index>(), 1.0f64..120.0), 0..10),
        scroll_top in -500.0f64..20_000.0,
        container in 1.0f64..800.0,
        overscan in 0usize..8,
    ) {
        let mut scroller = VirtualScroller::new(&VirtualScrollConfig {
            enabled: true,
            item_height: 24.0,
            overscan,
            container_height: container,
        });
        let keys: Vec<NodeKey> = (0..rows as i64).map(NodeKey::Num).collect();
        scroller.set_items(keys.clone());
        for (index, height) in tall {
            scroller.set_item_height(&keys[index.index(rows)], Some(height));
        }

        let window = scroller.update(scroll_top);
        prop_assert!(window.start_index <= window.end_index);
        prop_assert!(window.end_index < rows);
        prop_assert!(window.scroll_top >= 0.0 && window.scroll_top <= scroller.max_scroll());

        // the row under the viewport centre is always rendered
        let centre = window.scroll_top + container / 2.0;
        let centre_row = keys
            .iter()
            .rposition(|k| scroller.offset_of(k).unwrap() <= centre)
            .unwrap_or(0);
        prop_assert!(window.start_index <= centre_row && centre_row <= window.end_index);
    }
}

#[test]
fn sync_cascade_is_a_noop_outside_cascade_mode() {
    let mut forest = Forest::from_data(&[
        TreeNodeData::new("n0", "node 0").child(TreeNodeData::new("n1", "node 1"))
    ]);
    let mut selected = tree_engine::IdSet::new();
    let engine = SelectionEngine::new(SelectionMode::Multiple);
    let child = forest.id_of(&NodeKey::from("n1")).unwrap();
    engine.select(&mut forest, &mut selected, child, true);
    assert!(!engine.sync_cascade(&mut forest, &mut selected));
    assert!(!forest.get_by_key(&NodeKey::from("n0")).unwrap().flags.selected);
}
