use datastate::Attributes;
use serde_json::{Value, json};

use super::*;
use crate::control::{ControlPlugin, ToggleButton};
use crate::panel::DynamicPanel;
use crate::source::{DataSource, InteractionEvent};
use crate::table::Table;

fn set(control: &str, value: Value) -> BoardEvent {
    BoardEvent::SetControlValue { control: control.into(), value }
}

fn board() -> Board {
    let table = Table::from_columns(vec![
        ("year", vec![json!(2000), json!(2010), json!(2020)]),
        ("cat", vec![json!("A"), json!("B"), json!("A")]),
    ])
    .expect("table");
    let attributes: Attributes = json!({"data_col": "cat", "data_values": ["A", "B"]})
        .as_object()
        .cloned()
        .unwrap_or_default();
    let cats = ControlPlugin::new("filter:checklist", attributes).with_id("cats");
    let panel = DynamicPanel::builder("a", DataSource::Literal(table)).build().expect("panel");
    Board::single(vec![cats], vec![panel.into()]).expect("board")
}

// =============================================================================
// COALESCING
// =============================================================================

#[test]
fn coalesce_keeps_latest_value_per_control() {
    let events = vec![set("a", json!(1)), set("b", json!(1)), set("a", json!(2))];
    assert_eq!(coalesce(events), vec![set("b", json!(1)), set("a", json!(2))]);
}

#[test]
fn coalesce_treats_toggle_as_control_value() {
    let toggle = BoardEvent::ToggleChecklist { control: "a".into(), button: Some(ToggleButton::All) };
    let events = vec![set("a", json!([])), toggle.clone()];
    assert_eq!(coalesce(events), vec![toggle]);
}

#[test]
fn coalesce_drops_mount_toggles_without_hiding_values() {
    let mount = BoardEvent::ToggleChecklist { control: "a".into(), button: None };
    let events = vec![set("a", json!(["x"])), mount];
    assert_eq!(coalesce(events), vec![set("a", json!(["x"]))]);
}

#[test]
fn coalesce_keeps_latest_navigation_and_interaction_per_source() {
    let click = |panel: &str, id: u64| BoardEvent::Interact {
        panel: panel.into(),
        kind: EventKind::Click,
        event: Some(InteractionEvent::from_ids(&[id])),
    };
    let hover = BoardEvent::Interact { panel: "p".into(), kind: EventKind::Hover, event: None };
    let events = vec![
        BoardEvent::Navigate("one".into()),
        click("p", 0),
        hover.clone(),
        click("q", 1),
        click("p", 2),
        BoardEvent::Navigate("two".into()),
    ];
    assert_eq!(
        coalesce(events),
        vec![hover, click("q", 1), click("p", 2), BoardEvent::Navigate("two".into())]
    );
}

// =============================================================================
// CONFIG
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: usize = env_parse("__BOARD_TEST_MISSING_KEY__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__BOARD_TEST_INVALID__", "many") };
    let val: usize = env_parse("__BOARD_TEST_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__BOARD_TEST_INVALID__") };
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__BOARD_TEST_VALID__", "99") };
    let val: usize = env_parse("__BOARD_TEST_VALID__", 0);
    assert_eq!(val, 99);
    unsafe { std::env::remove_var("__BOARD_TEST_VALID__") };
}

#[test]
fn default_config_matches_constants() {
    let config = RuntimeConfig::default();
    assert_eq!(config.queue_capacity, 1024);
    assert_eq!(config.max_batch, 64);
}

// =============================================================================
// TASK
// =============================================================================

#[tokio::test]
async fn runtime_applies_events_and_publishes_state() {
    let (handle, task) = spawn_board_runtime(board(), RuntimeConfig::default());
    let mut reports = handle.subscribe();
    handle.send(set("cats", json!(["B"]))).await.expect("send");

    let report = reports.recv().await.expect("report");
    assert!(report.error.is_none());
    assert_eq!(report.updates.len(), 1);
    assert_eq!(report.updates[0].rows, 1);
    assert_eq!(handle.snapshot().global_controls[0].value, json!(["B"]));

    drop(handle);
    let board = task.await.expect("join");
    assert_eq!(board.control_value("cats"), Some(&json!(["B"])));
}

#[tokio::test]
async fn rejected_event_is_reported_and_state_kept() {
    let (handle, _task) = spawn_board_runtime(board(), RuntimeConfig::default());
    let mut reports = handle.subscribe();
    let before = handle.snapshot();
    handle.send(set("ghost", json!(1))).await.expect("send");

    let report = reports.recv().await.expect("report");
    assert_eq!(report.error_code, Some("E_UNKNOWN_CONTROL"));
    assert!(report.updates.is_empty());
    assert_eq!(handle.snapshot(), before);
}

#[tokio::test]
async fn queued_burst_is_coalesced_into_one_batch() {
    let (handle, _task) = spawn_board_runtime(board(), RuntimeConfig::default());
    let mut reports = handle.subscribe();
    handle.send(set("cats", json!([]))).await.expect("send");
    handle.send(set("cats", json!(["A"]))).await.expect("send");
    handle.send(set("cats", json!(["B"]))).await.expect("send");

    let report = reports.recv().await.expect("report");
    assert_eq!(report.received, 3);
    assert_eq!(report.applied, 1);
    assert_eq!(report.updates[0].rows, 1);
}

#[tokio::test]
async fn watch_state_sees_changes() {
    let (handle, _task) = spawn_board_runtime(board(), RuntimeConfig::default());
    let mut state = handle.watch_state();
    handle.send(set("cats", json!(["A"]))).await.expect("send");
    state.changed().await.expect("changed");
    assert_eq!(state.borrow().global_controls[0].value, json!(["A"]));
}

#[tokio::test]
async fn send_after_stop_fails() {
    let (handle, task) = spawn_board_runtime(board(), RuntimeConfig::default());
    task.abort();
    // The aborted task drops its receiver once the abort is observed.
    let _ = task.await;
    let err = handle.send(set("cats", json!([]))).await.expect_err("closed");
    assert!(matches!(err, RuntimeError::Closed));
}
