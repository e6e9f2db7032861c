use pretty_assertions::assert_eq;
use tree_engine::prelude::*;
use tree_engine::DragPhase;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sample() -> Vec<TreeNodeData> {
    vec![
        TreeNodeData::new("A", "A"),
        TreeNodeData::new("B", "B")
            .child(TreeNodeData::new("B1", "B1"))
            .child(TreeNodeData::new("B2", "B2")),
        TreeNodeData::new("C", "C"),
    ]
}

fn key(k: &str) -> NodeKey {
    NodeKey::from(k)
}

#[test]
fn test_cascade_search_and_drag_walkthrough() {
    init_logging();
    let mut engine = TreeEngine::new(
        TreeConfig::default()
            .selection_mode(SelectionMode::Cascade)
            .drag(DragMode::Full),
        sample(),
    );

    let outline = engine.get_state().outline();
    insta::assert_snapshot!(outline.trim_end(), @r###"
    [ ]   A
    [ ] + B
    [ ]   C
    "###);

    // Selecting one child leaves the parent half checked
    engine.expand_node(&key("B"), true);
    engine.select_node(&key("B1"), true);
    assert_eq!(engine.get_half_checked_keys(), vec![key("B")]);
    let outline = engine.get_state().outline();
    insta::assert_snapshot!(outline.trim_end(), @r###"
    [ ]   A
    [-] - B
    [x]     B1
    [ ]     B2
    [ ]   C
    "###);

    // Selecting the sibling completes the parent
    engine.select_node(&key("B2"), true);
    assert!(engine.get_half_checked_keys().is_empty());
    assert_eq!(engine.get_checked_keys(), vec![key("B"), key("B1"), key("B2")]);

    // Search marks the match and its ancestor chain
    engine.search("B2");
    let state = engine.get_state();
    let mut matched: Vec<String> = state.matched_ids.iter().map(|k| k.to_string()).collect();
    matched.sort();
    assert_eq!(matched, vec!["B", "B2"]);
    let outline = state.outline();
    insta::assert_snapshot!(outline.trim_end(), @r###"
    [ ]   A
    [x] - B *
    [x]     B1
    [x]     <B2> *
    [ ]   C
    "###);
    engine.clear_search();

    // Drag B1 into C
    assert!(engine.on_drag_start(&key("B1")));
    assert_eq!(engine.get_state().drag_state.phase, DragPhase::Dragging);
    assert!(engine.on_drag_over(&key("C"), 16.0, 32.0));
    assert_eq!(engine.get_state().drag_state.position, Some(DropPosition::Inside));
    assert!(engine.on_drop());

    let state = engine.get_state();
    let b1 = state.node(&key("B1")).unwrap();
    assert_eq!(b1.level, 1);
    assert_eq!(b1.path.to_vec(), vec![key("C"), key("B1")]);
    assert_eq!(state.drag_state.phase, DragPhase::Idle);
    assert!(state.forest.iter().all(|(_, n)| !n.flags.dragging && !n.flags.drop_target));
    state.forest.validate().unwrap();

    // B keeps its remaining selected child and C now holds a selected one
    let outline = state.outline();
    insta::assert_snapshot!(outline.trim_end(), @r###"
    [ ]   A
    [x] - B
    [x]     B2
    [x] + C
    "###);
}

#[test]
fn test_search_reveals_matches_and_clear_keeps_expansion() {
    init_logging();
    let mut engine = TreeEngine::new(TreeConfig::default(), sample());
    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = std::rc::Rc::clone(&seen);
    engine.on(TreeEventKind::Search, move |e| {
        sink.borrow_mut().push((e.keyword.clone(), e.nodes.clone()));
        Ok(())
    });

    engine.search("b1");
    assert_eq!(engine.get_state().search_keyword, "b1");
    let visible: Vec<String> = engine
        .get_visible_nodes()
        .iter()
        .map(|n| n.key.to_string())
        .collect();
    assert_eq!(visible, vec!["A", "B", "B1", "B2", "C"]);

    engine.clear_search();
    // expansion forced by the search remains
    assert!(engine.get_node(&key("B")).unwrap().flags.expanded);
    assert!(engine.get_node(&key("B1")).unwrap().highlights.is_empty());

    assert_eq!(
        *seen.borrow(),
        vec![
            (Some("b1".to_string()), vec![key("B1")]),
            (Some(String::new()), Vec::new()),
        ]
    );
}

#[test]
fn test_structural_edits_keep_cascade_consistent() {
    init_logging();
    let mut engine = TreeEngine::new(
        TreeConfig::default()
            .selection_mode(SelectionMode::Cascade)
            .default_expand_all(true),
        sample(),
    );
    engine.select_node(&key("B"), true);

    // A new unselected child makes the parent half checked
    assert!(engine.add_node(Some(key("B")), TreeNodeData::new("B3", "B3"), None));
    assert_eq!(engine.get_half_checked_keys(), vec![key("B")]);

    // Removing it restores the full check
    assert!(engine.remove_node(&key("B3")));
    assert!(engine.get_node(&key("B")).unwrap().flags.selected);

    // Duplicate keys and unknown parents are rejected
    assert!(!engine.add_node(None, TreeNodeData::new("A", "again"), None));
    assert!(!engine.add_node(Some(key("missing")), TreeNodeData::new("X", "X"), None));

    // Removing a subtree drops every key it held
    assert!(engine.remove_node(&key("B")));
    let state = engine.get_state();
    assert!(state.selected_ids.is_empty());
    assert!(!state.expanded_ids.contains(&key("B")));
    assert_eq!(state.flat_nodes.len(), 2);
    assert!(!engine.remove_node(&key("B1")));
}

#[test]
fn test_update_reruns_active_search() {
    init_logging();
    let mut engine = TreeEngine::new(TreeConfig::default(), sample());
    engine.search("apple");
    assert!(engine.get_state().matched_ids.is_empty());

    engine.update_node(&key("C"), NodePatch::default().label("Apple pie"));
    assert!(engine.get_state().matched_ids.contains(&key("C")));
    let c = engine.get_node(&key("C")).unwrap();
    assert_eq!(c.highlights.len(), 1);
    assert_eq!((c.highlights[0].start, c.highlights[0].end), (0, 5));
}

#[test]
fn test_selection_modes_through_the_facade() {
    init_logging();
    let mut single = TreeEngine::new(TreeConfig::default(), sample());
    single.select_node(&key("A"), true);
    single.select_node(&key("C"), true);
    assert_eq!(single.get_checked_keys(), vec![key("C")]);
    assert!(!single.select_all());
    assert!(!single.invert_selection());
    assert!(single.toggle_select(&key("C")));
    assert!(single.get_checked_keys().is_empty());

    let mut multiple = TreeEngine::new(
        TreeConfig::default().selection_mode(SelectionMode::Multiple),
        sample(),
    );
    assert!(multiple.select_all());
    assert_eq!(multiple.get_selected_nodes().len(), 5);
    multiple.toggle_select(&key("B1"));
    assert!(multiple.invert_selection());
    assert_eq!(multiple.get_checked_keys(), vec![key("B1")]);
    assert!(multiple.deselect_all());
    assert!(!multiple.deselect_all());

    let mut none = TreeEngine::new(
        TreeConfig::default().selection_mode(SelectionMode::None),
        sample(),
    );
    assert!(!none.select_node(&key("A"), true));
    assert!(!none.select_all());
}

fn sorted(set: &std::collections::HashSet<NodeKey>) -> Vec<String> {
    let mut keys: Vec<String> = set.iter().map(|k| k.to_string()).collect();
    keys.sort();
    keys
}

#[test]
fn test_set_data_resets_a_busy_tree() {
    init_logging();
    let mut engine = TreeEngine::new(
        TreeConfig::default()
            .selection_mode(SelectionMode::Cascade)
            .drag(DragMode::Full)
            .default_expanded_keys(vec![key("X")])
            .default_selected_keys(vec![key("X1")]),
        sample(),
    );

    engine.select_node(&key("B1"), true);
    engine.search("B2");
    assert!(engine.on_drag_start(&key("A")));
    engine.on_drag_over(&key("C"), 16.0, 32.0);
    assert!(engine.start_load(&key("B")));
    assert!(engine.get_state().drag_state.is_dragging());
    assert!(engine.get_state().searching);

    let changes = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = std::rc::Rc::clone(&changes);
    engine.on(TreeEventKind::Change, move |e| {
        sink.borrow_mut().push((e.nodes.clone(), sorted(&e.selected_ids), sorted(&e.loading_ids)));
        Ok(())
    });

    let data = TreeNodeData::list_from_json(
        r#"[
            { "id": "X", "label": "X", "children": [{ "id": "X1", "label": "X1" }] },
            { "id": "Y", "label": "Y", "loading": true }
        ]"#,
    )
    .unwrap();
    engine.set_data(data);

    let state = engine.get_state();
    assert_eq!(sorted(&state.selected_ids), vec!["X", "X1"]);
    assert_eq!(sorted(&state.expanded_ids), vec!["X"]);
    assert!(state.matched_ids.is_empty());
    assert_eq!(sorted(&state.loading_ids), vec!["Y"]);
    assert_eq!(state.search_keyword, "");
    assert!(!state.searching);
    assert_eq!(state.drag_state.phase, DragPhase::Idle);
    assert_eq!(state.drag_state.drag_node, None);
    assert_eq!(state.drag_state.drop_target, None);
    assert!(state
        .forest
        .iter()
        .all(|(_, n)| !n.flags.dragging && !n.flags.drop_target && !n.flags.highlighted));

    let visible: Vec<String> = engine.get_visible_nodes().iter().map(|n| n.key.to_string()).collect();
    assert_eq!(visible, vec!["X", "X1", "Y"]);
    assert_eq!(engine.get_checked_keys().len(), 2);

    assert_eq!(
        *changes.borrow(),
        vec![(vec![key("X"), key("Y")], vec!["X".to_string(), "X1".to_string()], vec!["Y".to_string()])]
    );
}
