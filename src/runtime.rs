//! Async board runtime.
//!
//! DESIGN
//! ======
//! The board moves into a single tokio task fed by a bounded `mpsc` queue of
//! [`BoardEvent`]s. One batch is processed at a time: the task waits for an
//! event, drains whatever is already queued (up to `max_batch`), coalesces
//! the batch, and hands it to [`Board::handle_batch`]. Each batch's outcome is
//! published on a `broadcast` channel and the latest [`DataState`] on a
//! `watch` channel, so readers never block the task.
//!
//! Coalescing keeps only the latest value per control, the latest event per
//! interaction source and the latest navigation. Recompute runs once per
//! batch, so a burst of slider moves costs one recompute, not one per move.
//!
//! When every [`BoardHandle`] is dropped the queue closes, the task drains
//! what is left and returns the board.

#[cfg(test)]
#[path = "runtime_test.rs"]
mod runtime_test;

use std::collections::HashSet;
use std::sync::Arc;

use datastate::DataState;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::board::{Board, BoardEvent, PanelUpdate};
use crate::consts::{DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_MAX_BATCH, DEFAULT_UPDATE_CAPACITY};
use crate::error::ErrorCode;
use crate::source::EventKind;

/// Tuning knobs for the runtime, loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Bounded capacity of the event queue.
    pub queue_capacity: usize,
    /// Most events drained into one batch.
    pub max_batch: usize,
    /// Capacity of the batch-report broadcast channel.
    pub update_capacity: usize,
}

impl RuntimeConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            queue_capacity: env_parse("BOARD_EVENT_QUEUE_CAPACITY", DEFAULT_EVENT_QUEUE_CAPACITY).max(1),
            max_batch: env_parse("BOARD_MAX_BATCH", DEFAULT_MAX_BATCH).max(1),
            update_capacity: DEFAULT_UPDATE_CAPACITY,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            max_batch: DEFAULT_MAX_BATCH,
            update_capacity: DEFAULT_UPDATE_CAPACITY,
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("board runtime has stopped")]
    Closed,
}

impl ErrorCode for RuntimeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Closed => "E_RUNTIME_CLOSED",
        }
    }
}

/// Outcome of one processed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Events received before coalescing.
    pub received: usize,
    /// Events applied after coalescing.
    pub applied: usize,
    /// Updated panels; empty when the batch was rejected.
    pub updates: Vec<PanelUpdate>,
    /// Error code of a rejected batch.
    pub error_code: Option<&'static str>,
    pub error: Option<String>,
}

/// Cloneable handle to a running board.
#[derive(Debug, Clone)]
pub struct BoardHandle {
    events: mpsc::Sender<BoardEvent>,
    reports: broadcast::Sender<BatchReport>,
    state: watch::Receiver<Arc<DataState>>,
}

impl BoardHandle {
    /// Queue an event, waiting for room when the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Closed`] when the runtime task has ended.
    pub async fn send(&self, event: BoardEvent) -> Result<(), RuntimeError> {
        self.events.send(event).await.map_err(|_| RuntimeError::Closed)
    }

    /// Receive reports of batches processed from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BatchReport> {
        self.reports.subscribe()
    }

    /// The latest published shared state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<DataState> {
        Arc::clone(&*self.state.borrow())
    }

    /// A receiver notified on every shared-state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<Arc<DataState>> {
        self.state.clone()
    }
}

/// Move `board` into a background task and return a handle to it. The join
/// handle yields the board once every handle has been dropped.
#[must_use]
pub fn spawn_board_runtime(mut board: Board, config: RuntimeConfig) -> (BoardHandle, JoinHandle<Board>) {
    let (events_tx, mut events_rx) = mpsc::channel(config.queue_capacity.max(1));
    let (reports_tx, _) = broadcast::channel(config.update_capacity.max(1));
    let (state_tx, state_rx) = watch::channel(board.state());
    let handle = BoardHandle { events: events_tx, reports: reports_tx.clone(), state: state_rx };
    let max_batch = config.max_batch.max(1);

    info!(
        queue_capacity = config.queue_capacity,
        max_batch,
        context = %board.active_context(),
        "board runtime started"
    );
    let task = tokio::spawn(async move {
        while let Some(first) = events_rx.recv().await {
            let mut batch = vec![first];
            while batch.len() < max_batch {
                match events_rx.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(_) => break,
                }
            }
            let report = process_batch(&mut board, batch);
            state_tx.send_if_modified(|current| {
                let next = board.state();
                if Arc::ptr_eq(current, &next) {
                    false
                } else {
                    *current = next;
                    true
                }
            });
            if reports_tx.send(report).is_err() {
                debug!("batch processed with no report subscribers");
            }
        }
        info!("board runtime stopped");
        board
    });
    (handle, task)
}

fn process_batch(board: &mut Board, batch: Vec<BoardEvent>) -> BatchReport {
    let received = batch.len();
    let batch = coalesce(batch);
    let applied = batch.len();
    debug!(received, applied, "processing event batch");
    match board.handle_batch(batch) {
        Ok(updates) => BatchReport { received, applied, updates, error_code: None, error: None },
        Err(err) => BatchReport {
            received,
            applied,
            updates: Vec::new(),
            error_code: Some(err.error_code()),
            error: Some(err.to_string()),
        },
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum Slot {
    Navigation,
    Control(String),
    Interaction(String, EventKind),
}

/// Keep the latest event per control, per interaction source and for
/// navigation, each at the position of its latest occurrence. Toggles
/// without a button are dropped since they never change anything.
#[must_use]
pub fn coalesce(events: Vec<BoardEvent>) -> Vec<BoardEvent> {
    let mut seen = HashSet::new();
    let mut kept: Vec<BoardEvent> = events
        .into_iter()
        .rev()
        .filter(|event| {
            let slot = match event {
                BoardEvent::Navigate(_) => Slot::Navigation,
                BoardEvent::SetControlValue { control, .. } => Slot::Control(control.clone()),
                BoardEvent::ToggleChecklist { button: None, .. } => return false,
                BoardEvent::ToggleChecklist { control, .. } => Slot::Control(control.clone()),
                BoardEvent::Interact { panel, kind, .. } => Slot::Interaction(panel.clone(), *kind),
            };
            seen.insert(slot)
        })
        .collect();
    kept.reverse();
    kept
}
