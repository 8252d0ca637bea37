use datastate::Attributes;
use serde_json::json;

use super::*;
use crate::layout::ContentGrid;
use crate::source::{DataSource, EventPoint};
use crate::table::Table;

fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().unwrap_or_default()
}

fn years() -> Table {
    Table::from_columns(vec![
        ("year", vec![json!(2000), json!(2010), json!(2020)]),
        ("cat", vec![json!("A"), json!("B"), json!("A")]),
    ])
    .expect("table")
}

fn panel(id: &str) -> DynamicPanel {
    DynamicPanel::builder(id, DataSource::Literal(years())).build().expect("panel")
}

fn derived(id: &str, source: &str) -> DynamicPanel {
    DynamicPanel::builder(id, DataSource::DerivedSelection { source: source.into(), event: EventKind::Click })
        .build()
        .expect("panel")
}

fn cat_checklist(id: &str) -> ControlPlugin {
    ControlPlugin::new("filter:checklist", attrs(json!({"data_col": "cat", "data_values": ["A", "B"]}))).with_id(id)
}

fn year_range(id: &str) -> ControlPlugin {
    ControlPlugin::new(
        "filter:range_slider",
        attrs(json!({"data_col": "year", "slider_min": 2000, "slider_max": 2020, "edges_infinite": true})),
    )
    .with_id(id)
}

fn rows(board: &Board, panel: &str) -> Vec<u64> {
    board.panel(panel).expect("panel").materialized().ids().to_vec()
}

fn set(control: &str, value: Value) -> BoardEvent {
    BoardEvent::SetControlValue { control: control.into(), value }
}

fn click(panel: &str, ids: &[u64]) -> BoardEvent {
    BoardEvent::Interact { panel: panel.into(), kind: EventKind::Click, event: Some(InteractionEvent::from_ids(ids)) }
}

fn two_tabs() -> Board {
    Board::new(vec![
        Tab::new("first", vec![panel("a").into(), panel("b").into()]).with_sidebar(vec![cat_checklist("cats")]),
        Tab::new("second", vec![panel("c").into()]).with_sidebar(vec![year_range("years")]),
    ])
    .expect("board")
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

#[test]
fn initial_render_covers_first_context() {
    let board = two_tabs();
    assert_eq!(board.active_context(), "first");
    assert_eq!(board.active_panels(), &["a".to_owned(), "b".to_owned()]);
    assert!(board.artifact("a").is_some());
    assert!(board.artifact("c").is_none());
    assert_eq!(board.render_active().len(), 2);
}

#[test]
fn initial_state_carries_default_values() {
    let board = two_tabs();
    let state = board.state();
    assert_eq!(state.active_context, "first");
    assert_eq!(state.global_controls.len(), 1);
    assert_eq!(state.global_controls[0].kind_tag, "filter:checklist");
    assert_eq!(state.global_controls[0].value, json!(["A", "B"]));
}

#[test]
fn empty_board_is_rejected() {
    assert!(matches!(Board::new(Vec::new()), Err(BoardError::Configuration(_))));
}

#[test]
fn duplicate_panel_ids_are_rejected() {
    let err = Board::single(Vec::new(), vec![panel("a").into(), panel("a").into()]).expect_err("dup");
    assert!(matches!(err, BoardError::Configuration(msg) if msg.contains("`a`")));
}

#[test]
fn duplicate_control_ids_are_rejected() {
    let err = Board::single(vec![cat_checklist("x"), year_range("x")], vec![panel("a").into()]).expect_err("dup");
    assert!(matches!(err, BoardError::Configuration(msg) if msg.contains("`x`")));
}

#[test]
fn global_control_on_missing_column_fails_at_construction() {
    let control = ControlPlugin::new("filter:radio", attrs(json!({"data_col": "country", "data_values": ["CA"]})));
    let err = Board::single(vec![control], vec![panel("a").into()]).expect_err("missing");
    assert!(matches!(err, BoardError::MissingColumn { panel, column } if panel == "a" && column == "country"));
}

#[test]
fn unknown_kind_fails_at_construction() {
    let control = ControlPlugin::new("filter:mystery", Attributes::new());
    let err = Board::single(vec![control], vec![panel("a").into()]).expect_err("unknown");
    assert!(matches!(err, BoardError::UnknownControlKind(_)));
}

#[test]
fn slider_default_outside_range_fails_at_construction() {
    let control = year_range("y").with_value(json!([1990, 2010]));
    let err = Board::single(vec![control], vec![panel("a").into()]).expect_err("range");
    assert!(matches!(err, BoardError::Configuration(_)));
}

#[test]
fn derived_from_unknown_panel_fails() {
    let err = Board::single(Vec::new(), vec![derived("d", "ghost").into()]).expect_err("ghost");
    assert!(matches!(err, BoardError::UnknownPanel(id) if id == "ghost"));
}

#[test]
fn derived_panel_takes_upstream_schema_before_first_event() {
    let board = Board::single(Vec::new(), vec![panel("up").into(), derived("down", "up").into()]).expect("board");
    let table = board.panel("down").expect("panel").materialized();
    assert!(table.is_empty());
    assert_eq!(table.column_names(), vec!["year", "cat"]);
}

#[test]
fn derived_panel_takes_upstream_output_columns() {
    let up = DynamicPanel::builder("up", DataSource::Literal(years()))
        .data_transform(|table: Table| {
            let n = table.len();
            table.with_column("decade", vec![json!(0); n]).expect("column")
        })
        .build()
        .expect("panel");
    let board = Board::single(Vec::new(), vec![up.into(), derived("down", "up").into()]).expect("board");
    let table = board.panel("down").expect("panel").materialized();
    assert!(table.has_column("decade"));
}

#[test]
fn derived_chain_seeds_upstream_before_downstream() {
    let local = ControlPlugin::new("filter:radio", attrs(json!({"data_col": "cat", "data_values": ["A", "B"]})))
        .with_id("radio");
    let mid = DynamicPanel::builder(
        "mid",
        DataSource::DerivedSelection { source: "up".into(), event: EventKind::Click },
    )
    .control(local)
    .build()
    .expect("panel");
    let board = Board::single(
        Vec::new(),
        vec![derived("leaf", "mid").into(), mid.into(), panel("up").into()],
    )
    .expect("board");
    let table = board.panel("leaf").expect("panel").materialized();
    assert_eq!(table.column_names(), vec!["year", "cat"]);
}

#[test]
fn caption_on_unknown_control_fails() {
    let caption = Caption { start: String::new(), source: CaptionSource::ControlValue { control: "nope".into() }, end: String::new() };
    let err = Board::single(Vec::new(), vec![panel("a").into(), caption.into()]).expect_err("caption");
    assert!(matches!(err, BoardError::UnknownControl(_)));
}

// =============================================================================
// GLOBAL CONTROLS AND NAVIGATION
// =============================================================================

#[test]
fn global_change_republishes_state_and_recomputes_context() {
    let mut board = two_tabs();
    let updates = board.handle(set("cats", json!(["B"]))).expect("set");
    let ids: Vec<&str> = updates.iter().map(|u| u.panel_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(updates[0].rows, 1);
    assert_eq!(rows(&board, "b"), vec![1]);
    assert_eq!(board.state().global_controls[0].value, json!(["B"]));
}

#[test]
fn navigation_swaps_active_control_set() {
    let mut board = two_tabs();
    let updates = board.handle(BoardEvent::Navigate("second".into())).expect("navigate");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].panel_id, "c");
    let state = board.state();
    assert_eq!(state.active_context, "second");
    assert_eq!(state.global_controls[0].kind_tag, "filter:range_slider");
    assert_eq!(board.sidebar().1.len(), 1);
}

#[test]
fn inactive_global_value_is_stored_and_applied_on_navigation() {
    let mut board = two_tabs();
    let updates = board.handle(set("years", json!([2010, 2020]))).expect("set");
    assert!(updates.is_empty());
    assert_eq!(board.state().active_context, "first");

    board.handle(BoardEvent::Navigate("second".into())).expect("navigate");
    assert_eq!(rows(&board, "c"), vec![1, 2]);
}

#[test]
fn invalid_inactive_value_is_rejected_without_blocking_navigation() {
    let mut board = two_tabs();
    let err = board.handle(set("years", json!("wide"))).expect_err("invalid");
    assert!(matches!(err, BoardError::InvalidControlValue { .. }));
    assert_eq!(board.control_value("years"), Some(&json!([2000, 2020])));

    board.handle(BoardEvent::Navigate("second".into())).expect("navigate");
    assert_eq!(board.active_context(), "second");
    assert_eq!(rows(&board, "c"), vec![0, 1, 2]);
}

#[test]
fn range_slider_edges_apply_through_board() {
    let mut board = Board::single(vec![year_range("years")], vec![panel("a").into()]).expect("board");
    board.handle(set("years", json!([2000, 2010]))).expect("low edge");
    assert_eq!(rows(&board, "a"), vec![0, 1]);
    board.handle(set("years", json!([2010, 2020]))).expect("high edge");
    assert_eq!(rows(&board, "a"), vec![1, 2]);
}

#[test]
fn navigate_to_unknown_context_fails() {
    let mut board = two_tabs();
    let err = board.handle(BoardEvent::Navigate("third".into())).expect_err("unknown");
    assert!(matches!(err, BoardError::UnknownContext(key) if key == "third"));
    assert_eq!(board.active_context(), "first");
}

#[test]
fn replaying_same_value_is_idempotent() {
    let mut board = two_tabs();
    let first = board.handle(set("cats", json!(["A"]))).expect("first");
    let second = board.handle(set("cats", json!(["A"]))).expect("second");
    assert_eq!(first, second);
}

// =============================================================================
// LOCAL CONTROLS
// =============================================================================

#[test]
fn local_change_recomputes_only_its_panel() {
    let local = ControlPlugin::new("filter:radio", attrs(json!({"data_col": "cat", "data_values": ["A", "B"]})))
        .with_id("radio");
    let with_local = DynamicPanel::builder("a", DataSource::Literal(years())).control(local).build().expect("panel");
    let mut board =
        Board::single(vec![cat_checklist("cats")], vec![with_local.into(), panel("b").into()]).expect("board");
    assert_eq!(rows(&board, "a"), vec![0, 2]);

    let updates = board.handle(set("radio", json!("B"))).expect("set");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].panel_id, "a");
    assert_eq!(rows(&board, "a"), vec![1]);
    assert_eq!(board.control_value("radio"), Some(&json!("B")));
}

#[test]
fn local_change_outside_active_context_waits_for_navigation() {
    let local = ControlPlugin::new("filter:radio", attrs(json!({"data_col": "cat", "data_values": ["A", "B"]})))
        .with_id("radio");
    let with_local = DynamicPanel::builder("c", DataSource::Literal(years())).control(local).build().expect("panel");
    let mut board = Board::new(vec![
        Tab::new("first", vec![panel("a").into()]),
        Tab::new("second", vec![with_local.into()]),
    ])
    .expect("board");
    assert!(board.handle(set("radio", json!("B"))).expect("set").is_empty());
    board.handle(BoardEvent::Navigate("second".into())).expect("navigate");
    assert_eq!(rows(&board, "c"), vec![1]);
}

#[test]
fn invalid_local_value_outside_active_context_is_rejected() {
    let local = ControlPlugin::new("filter:radio", attrs(json!({"data_col": "cat", "data_values": ["A", "B"]})))
        .with_id("radio");
    let with_local = DynamicPanel::builder("c", DataSource::Literal(years())).control(local).build().expect("panel");
    let mut board = Board::new(vec![
        Tab::new("first", vec![panel("a").into()]),
        Tab::new("second", vec![with_local.into()]),
    ])
    .expect("board");
    let err = board.handle(set("radio", json!("Z"))).expect_err("invalid");
    assert!(matches!(err, BoardError::InvalidControlValue { .. }));
    board.handle(BoardEvent::Navigate("second".into())).expect("navigate");
    assert_eq!(rows(&board, "c"), vec![0, 2]);
}

// =============================================================================
// CHECKLIST TOGGLE
// =============================================================================

#[test]
fn toggle_selects_all_and_none() {
    let mut board = Board::single(vec![cat_checklist("cats")], vec![panel("a").into()]).expect("board");
    board
        .handle(BoardEvent::ToggleChecklist { control: "cats".into(), button: Some(ToggleButton::None) })
        .expect("none");
    assert!(rows(&board, "a").is_empty());
    board
        .handle(BoardEvent::ToggleChecklist { control: "cats".into(), button: Some(ToggleButton::All) })
        .expect("all");
    assert_eq!(rows(&board, "a"), vec![0, 1, 2]);
    assert_eq!(board.control_value("cats"), Some(&json!(["A", "B"])));
}

#[test]
fn toggle_on_initial_mount_is_a_no_op() {
    let mut board = Board::single(vec![cat_checklist("cats")], vec![panel("a").into()]).expect("board");
    let updates = board
        .handle(BoardEvent::ToggleChecklist { control: "cats".into(), button: None })
        .expect("mount");
    assert!(updates.is_empty());
}

#[test]
fn mount_toggle_without_checklist_is_a_no_op() {
    let radio = ControlPlugin::new("filter:radio", attrs(json!({"data_col": "cat", "data_values": ["A", "B"]})))
        .with_id("radio");
    let mut board = Board::single(vec![radio], vec![panel("a").into()]).expect("board");
    let updates = board
        .handle(BoardEvent::ToggleChecklist { control: "radio".into(), button: None })
        .expect("mount");
    assert!(updates.is_empty());
    let updates = board
        .handle(BoardEvent::ToggleChecklist { control: "ghost".into(), button: None })
        .expect("mount");
    assert!(updates.is_empty());
}

#[test]
fn toggle_on_non_checklist_fails() {
    let mut board = Board::single(vec![year_range("years")], vec![panel("a").into()]).expect("board");
    let err = board
        .handle(BoardEvent::ToggleChecklist { control: "years".into(), button: Some(ToggleButton::All) })
        .expect_err("no toggle");
    assert!(matches!(err, BoardError::Configuration(_)));
}

// =============================================================================
// DERIVED SELECTION
// =============================================================================

#[test]
fn selection_feeds_derived_panel_from_upstream_rows() {
    let mut board = Board::single(
        vec![year_range("years")],
        vec![panel("up").into(), derived("down", "up").into()],
    )
    .expect("board");
    let updates = board.handle(click("up", &[0, 2])).expect("click");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].panel_id, "down");
    let table = board.panel("down").expect("panel").materialized();
    assert_eq!(table.ids(), &[0, 2]);
    assert_eq!(table.column("year"), Some(&[json!(2000), json!(2020)][..]));
}

#[test]
fn selection_reads_upstream_filtered_table() {
    let mut board = Board::single(
        vec![year_range("years")],
        vec![panel("up").into(), derived("down", "up").into()],
    )
    .expect("board");
    board
        .handle_batch(vec![set("years", json!([2000, 2010])), click("up", &[0, 2])])
        .expect("batch");
    assert_eq!(rows(&board, "up"), vec![0, 1]);
    assert_eq!(rows(&board, "down"), vec![0]);
}

#[test]
fn empty_or_absent_event_yields_empty_table_with_schema() {
    let mut board = Board::single(Vec::new(), vec![panel("up").into(), derived("down", "up").into()]).expect("board");
    board.handle(click("up", &[1])).expect("click");
    assert_eq!(rows(&board, "down"), vec![1]);

    for event in [None, Some(InteractionEvent { points: Vec::new() })] {
        board
            .handle(BoardEvent::Interact { panel: "up".into(), kind: EventKind::Click, event })
            .expect("empty");
        let table = board.panel("down").expect("panel").materialized();
        assert!(table.is_empty());
        assert_eq!(table.column_names(), vec!["year", "cat"]);
    }
}

#[test]
fn other_event_kinds_are_ignored() {
    let mut board = Board::single(Vec::new(), vec![panel("up").into(), derived("down", "up").into()]).expect("board");
    let hover = BoardEvent::Interact {
        panel: "up".into(),
        kind: EventKind::Hover,
        event: Some(InteractionEvent { points: vec![EventPoint { row_ids: vec![0] }] }),
    };
    assert!(board.handle(hover).expect("hover").is_empty());
}

#[test]
fn interaction_on_unknown_panel_fails() {
    let mut board = two_tabs();
    assert!(matches!(board.handle(click("ghost", &[0])), Err(BoardError::UnknownPanel(_))));
}

// =============================================================================
// TRANSACTIONS AND CAPTIONS
// =============================================================================

#[test]
fn failed_batch_leaves_board_unchanged() {
    let mut board = two_tabs();
    let before_state = board.state();
    let before = board.artifact("a").cloned();
    let err = board
        .handle_batch(vec![set("cats", json!(["B"])), set("ghost", json!(1))])
        .expect_err("ghost");
    assert!(matches!(err, BoardError::UnknownControl(_)));
    assert_eq!(board.state(), before_state);
    assert_eq!(board.artifact("a").cloned(), before);
    assert_eq!(board.control_value("cats"), Some(&json!(["A", "B"])));
}

#[test]
fn malformed_value_fails_recompute_and_rolls_back() {
    let mut board = Board::single(vec![year_range("years")], vec![panel("a").into()]).expect("board");
    let err = board.handle(set("years", json!("wide"))).expect_err("malformed");
    assert!(matches!(err, BoardError::InvalidControlValue { .. }));
    assert_eq!(board.control_value("years"), Some(&json!([2000, 2020])));
    assert_eq!(rows(&board, "a"), vec![0, 1, 2]);
}

#[test]
fn captions_render_row_counts_and_values() {
    let content = vec![
        panel("a").into(),
        ContentGrid::new(vec![
            Caption { start: "Rows: ".into(), source: CaptionSource::RowCount { panel: "a".into() }, end: String::new() }.into(),
            Caption { start: "Cats: ".into(), source: CaptionSource::ControlValue { control: "cats".into() }, end: ".".into() }
                .into(),
        ])
        .into(),
    ];
    let mut board = Board::single(vec![cat_checklist("cats")], content).expect("board");
    assert_eq!(board.captions(), vec!["Rows: 3".to_owned(), "Cats: [\"A\",\"B\"].".to_owned()]);
    board.handle(set("cats", json!(["B"]))).expect("set");
    assert_eq!(board.captions()[0], "Rows: 1");
}

#[test]
fn board_events_parse_from_script_lines() {
    let event: BoardEvent = serde_json::from_value(json!({"navigate": "second"})).expect("navigate");
    assert_eq!(event, BoardEvent::Navigate("second".into()));
    let event: BoardEvent = serde_json::from_value(json!({"set": {"control": "c", "value": [1]}})).expect("set");
    assert_eq!(event, set("c", json!([1])));
    let event: BoardEvent = serde_json::from_value(json!({"toggle": {"control": "c", "button": "none"}})).expect("toggle");
    assert_eq!(event, BoardEvent::ToggleChecklist { control: "c".into(), button: Some(ToggleButton::None) });
    let event: BoardEvent =
        serde_json::from_value(json!({"interact": {"panel": "p", "event": "clickData", "data": {"points": [{"rowIds": [2]}]}}}))
            .expect("interact");
    assert_eq!(event, click("p", &[2]));
}
