//! Board orchestrator: navigation, global-control fan-out, interactions.
//!
//! DESIGN
//! ======
//! The board owns every panel (in an arena keyed by panel id), the frozen
//! layout of each navigation context, and the current [`DataState`]
//! snapshot. It never computes panel tables itself: on navigation or a
//! global-control change it republishes the snapshot and every panel of the
//! active context replays it (phase 1, then phase 2). Local control changes
//! rerun phase 2 of their panel only; interaction events rebuild the tables
//! of the derived panels listening to the emitting panel.
//!
//! Within one batch the order is fixed: control values and navigation are
//! applied first, then the snapshot is republished and phase 1 runs, then
//! local-only recomputes, then derived selections (so they read the
//! upstream panel's fresh table).
//!
//! ERROR HANDLING
//! ==============
//! Construction validates everything a recompute could trip over (unique
//! ids, known kinds, derived sources, target columns, default values) and
//! fails with [`BoardError`]. A batch is applied to a draft copy of the
//! board and committed only if every step succeeds, so a failed event leaves
//! every control value, snapshot and artifact exactly as it was.

#[cfg(test)]
#[path = "board_test.rs"]
mod board_test;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use datastate::DataState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_CONTEXT, DEFAULT_SIDEBAR_HEADER};
use crate::control::{ControlId, ControlPlugin, ToggleButton, TransformRegistry, resolve_toggle};
use crate::error::{BoardError, ErrorCode};
use crate::layout::{Caption, CaptionSource, Component, LayoutNode, Tab, freeze};
use crate::panel::DynamicPanel;
use crate::render::Artifact;
use crate::source::{EventKind, InteractionEvent, PanelId, extract_selected_ids};

// =============================================================================
// TYPES
// =============================================================================

/// External stimulus accepted by the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardEvent {
    /// Switch the active navigation context.
    Navigate(String),
    /// New value for a global or local control.
    #[serde(rename = "set")]
    SetControlValue { control: ControlId, value: Value },
    /// Select-all / select-none click on a checklist; `None` is the
    /// initial mount and does nothing.
    #[serde(rename = "toggle")]
    ToggleChecklist {
        control: ControlId,
        #[serde(default)]
        button: Option<ToggleButton>,
    },
    /// Hover, click or brush selection emitted by a panel.
    Interact {
        panel: PanelId,
        #[serde(rename = "event")]
        kind: EventKind,
        #[serde(default, rename = "data")]
        event: Option<InteractionEvent>,
    },
}

/// A panel's new output after a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelUpdate {
    pub panel_id: PanelId,
    pub rows: usize,
    pub inputs: Map<String, Value>,
    pub artifact: Artifact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlSlot {
    Global { context: usize, index: usize },
    Local { panel: usize, index: usize },
}

#[derive(Debug, Clone)]
struct Context {
    key: String,
    header: String,
    sidebar_header: String,
    sidebar_controls: Vec<ControlPlugin>,
    layout: Vec<LayoutNode>,
    /// `dps` of the layout, computed once.
    panels: Vec<PanelId>,
}

/// The board-level state machine.
#[derive(Debug, Clone)]
pub struct Board {
    contexts: Vec<Context>,
    active: usize,
    panels: Vec<DynamicPanel>,
    panel_index: HashMap<PanelId, usize>,
    controls: HashMap<ControlId, ControlSlot>,
    /// Derived panels keyed by the panel and event they listen to.
    listeners: HashMap<(PanelId, EventKind), Vec<usize>>,
    state: Arc<DataState>,
    registry: Arc<TransformRegistry>,
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

impl Board {
    /// Build a board with the built-in control kinds.
    ///
    /// # Errors
    ///
    /// See [`Board::with_registry`].
    pub fn new(tabs: Vec<Tab>) -> Result<Self, BoardError> {
        Self::with_registry(tabs, TransformRegistry::with_builtins())
    }

    /// A board without tabs: one anonymous context.
    ///
    /// # Errors
    ///
    /// See [`Board::with_registry`].
    pub fn single(sidebar: Vec<ControlPlugin>, content: Vec<Component>) -> Result<Self, BoardError> {
        Self::new(vec![Tab::new(DEFAULT_CONTEXT, content).with_sidebar(sidebar)])
    }

    /// Build, validate, navigate to the first context and render it.
    ///
    /// # Errors
    ///
    /// - [`BoardError::Configuration`] for an empty board, duplicate ids, or
    ///   invalid control attributes and defaults.
    /// - [`BoardError::UnknownControlKind`] for unregistered kind tags.
    /// - [`BoardError::UnknownPanel`] / [`BoardError::UnknownControl`] for
    ///   derived sources and captions referring to nothing.
    /// - [`BoardError::MissingColumn`] when a control targets a column a
    ///   reachable panel does not have.
    pub fn with_registry(tabs: Vec<Tab>, registry: TransformRegistry) -> Result<Self, BoardError> {
        if tabs.is_empty() {
            return Err(BoardError::config("board has no navigation contexts"));
        }

        let mut contexts = Vec::with_capacity(tabs.len());
        let mut panels: Vec<DynamicPanel> = Vec::new();
        let mut seen_keys = HashSet::new();
        for tab in tabs {
            if !seen_keys.insert(tab.label.clone()) {
                return Err(BoardError::config(format!("duplicate navigation context `{}`", tab.label)));
            }
            let layout: Vec<LayoutNode> = tab.content.into_iter().map(|c| freeze(c, &mut panels)).collect();
            let ids: Vec<PanelId> = layout.iter().flat_map(LayoutNode::dps).map(str::to_owned).collect();
            let mut sidebar_controls = tab.sidebar_controls;
            for control in &mut sidebar_controls {
                control.prepare(&registry)?;
            }
            contexts.push(Context {
                key: tab.label,
                header: tab.header,
                sidebar_header: tab.sidebar_header,
                sidebar_controls,
                layout,
                panels: ids,
            });
        }

        let mut panel_index = HashMap::new();
        for (i, panel) in panels.iter_mut().enumerate() {
            if panel_index.insert(panel.id().to_owned(), i).is_some() {
                return Err(BoardError::config(format!("duplicate panel id `{}`", panel.id())));
            }
            panel.prepare_controls(&registry)?;
        }

        let controls = index_controls(&contexts, &panels)?;
        let listeners = seed_derived(&mut panels, &panel_index, &registry)?;

        let mut board = Self {
            contexts,
            active: 0,
            panels,
            panel_index,
            controls,
            listeners,
            state: Arc::new(DataState::default()),
            registry: Arc::new(registry),
        };
        board.check_columns()?;
        board.check_captions()?;

        board.publish_state();
        board.recompute_active()?;
        info!(
            context = %board.active_context(),
            contexts = board.contexts.len(),
            panels = board.panels.len(),
            controls = board.controls.len(),
            "board built"
        );
        Ok(board)
    }

    fn check_columns(&self) -> Result<(), BoardError> {
        for context in &self.contexts {
            for control in &context.sidebar_controls {
                for id in &context.panels {
                    self.check_panel_columns(id, control)?;
                }
            }
        }
        for panel in &self.panels {
            for control in panel.local_controls() {
                self.check_panel_columns(panel.id(), control)?;
            }
        }
        Ok(())
    }

    fn check_panel_columns(&self, panel_id: &str, control: &ControlPlugin) -> Result<(), BoardError> {
        let panel = self.panel_at(panel_id)?;
        let schema = panel.data().materialize();
        let transform = self.registry.resolve(control.kind_tag())?;
        for column in transform.required_columns(control.attributes()) {
            if !schema.has_column(&column) {
                return Err(BoardError::MissingColumn { panel: panel_id.to_owned(), column });
            }
        }
        Ok(())
    }

    fn check_captions(&self) -> Result<(), BoardError> {
        for caption in self.contexts.iter().flat_map(|c| c.layout.iter().flat_map(LayoutNode::captions)) {
            match &caption.source {
                CaptionSource::RowCount { panel } => {
                    self.panel_at(panel)?;
                }
                CaptionSource::ControlValue { control } => {
                    if !self.controls.contains_key(control) {
                        return Err(BoardError::UnknownControl(control.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

fn index_controls(
    contexts: &[Context],
    panels: &[DynamicPanel],
) -> Result<HashMap<ControlId, ControlSlot>, BoardError> {
    let mut controls = HashMap::new();
    let global = contexts.iter().enumerate().flat_map(|(context, c)| {
        c.sidebar_controls
            .iter()
            .enumerate()
            .map(move |(index, control)| (control.id(), ControlSlot::Global { context, index }))
    });
    let local = panels.iter().enumerate().flat_map(|(panel, p)| {
        p.local_controls()
            .iter()
            .enumerate()
            .map(move |(index, control)| (control.id(), ControlSlot::Local { panel, index }))
    });
    for (id, slot) in global.chain(local) {
        if controls.insert(id.to_owned(), slot).is_some() {
            return Err(BoardError::config(format!("duplicate control id `{id}`")));
        }
    }
    Ok(controls)
}

/// Register derived panels with their upstream and give them the schema of
/// the upstream's output table.
fn seed_derived(
    panels: &mut [DynamicPanel],
    panel_index: &HashMap<PanelId, usize>,
    registry: &TransformRegistry,
) -> Result<HashMap<(PanelId, EventKind), Vec<usize>>, BoardError> {
    let mut listeners: HashMap<(PanelId, EventKind), Vec<usize>> = HashMap::new();
    let mut links = Vec::new();
    for (i, panel) in panels.iter().enumerate() {
        let Some((source, kind)) = panel.data().derived_from() else {
            continue;
        };
        let upstream = *panel_index
            .get(source)
            .ok_or_else(|| BoardError::UnknownPanel(source.to_owned()))?;
        if upstream == i {
            return Err(BoardError::config(format!("panel `{}` derives from itself", panel.id())));
        }
        listeners.entry((source.to_owned(), kind)).or_default().push(i);
        links.push((i, upstream));
    }
    // A link is seeded once its upstream has a schema of its own; chains
    // settle after one pass per link.
    let mut seeded: HashSet<usize> = HashSet::new();
    for _ in 0..links.len() {
        for &(i, upstream) in &links {
            let ready = panels[upstream].data().derived_from().is_none() || seeded.contains(&upstream);
            if ready && !seeded.contains(&i) {
                let schema = panels[upstream].output_schema(registry)?;
                panels[i].seed_schema(&schema);
                seeded.insert(i);
            }
        }
    }
    Ok(listeners)
}

// =============================================================================
// QUERIES
// =============================================================================

impl Board {
    /// Current shared snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<DataState> {
        Arc::clone(&self.state)
    }

    #[must_use]
    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    #[must_use]
    pub fn active_context(&self) -> &str {
        self.contexts.get(self.active).map_or("", |c| c.key.as_str())
    }

    /// Navigation keys in declaration order.
    #[must_use]
    pub fn contexts(&self) -> Vec<&str> {
        self.contexts.iter().map(|c| c.key.as_str()).collect()
    }

    /// Header of the active context.
    #[must_use]
    pub fn header(&self) -> &str {
        self.contexts.get(self.active).map_or("", |c| c.header.as_str())
    }

    /// Sidebar header and controls of the active context.
    #[must_use]
    pub fn sidebar(&self) -> (&str, &[ControlPlugin]) {
        self.contexts.get(self.active).map_or((DEFAULT_SIDEBAR_HEADER, &[][..]), |c| {
            (c.sidebar_header.as_str(), c.sidebar_controls.as_slice())
        })
    }

    /// Frozen layout of the active context.
    #[must_use]
    pub fn layout(&self) -> &[LayoutNode] {
        self.contexts.get(self.active).map_or(&[][..], |c| c.layout.as_slice())
    }

    /// Panel ids of the active context in layout order.
    #[must_use]
    pub fn active_panels(&self) -> &[PanelId] {
        self.contexts.get(self.active).map_or(&[][..], |c| c.panels.as_slice())
    }

    #[must_use]
    pub fn panel(&self, id: &str) -> Option<&DynamicPanel> {
        self.panel_index.get(id).map(|&i| &self.panels[i])
    }

    /// Last rendered artifact of a panel.
    #[must_use]
    pub fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.panel(id).and_then(DynamicPanel::artifact)
    }

    #[must_use]
    pub fn control(&self, id: &str) -> Option<&ControlPlugin> {
        match *self.controls.get(id)? {
            ControlSlot::Global { context, index } => self.contexts[context].sidebar_controls.get(index),
            ControlSlot::Local { panel, index } => self.panels[panel].local_controls().get(index),
        }
    }

    #[must_use]
    pub fn control_value(&self, id: &str) -> Option<&Value> {
        self.control(id).and_then(ControlPlugin::value)
    }

    /// Rendered captions of the active context in layout order.
    #[must_use]
    pub fn captions(&self) -> Vec<String> {
        self.layout()
            .iter()
            .flat_map(LayoutNode::captions)
            .map(|caption| self.render_caption(caption))
            .collect()
    }

    fn render_caption(&self, caption: &Caption) -> String {
        let dynamic = match &caption.source {
            CaptionSource::RowCount { panel } => self
                .panel(panel)
                .map_or_else(String::new, |p| p.materialized().len().to_string()),
            CaptionSource::ControlValue { control } => match self.control_value(control) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
        };
        caption.render(&dynamic)
    }

    /// Current output of every active panel, in layout order.
    #[must_use]
    pub fn render_active(&self) -> Vec<PanelUpdate> {
        self.active_panels().iter().filter_map(|id| self.update_for(id)).collect()
    }

    fn update_for(&self, id: &str) -> Option<PanelUpdate> {
        let output = self.panel(id)?.output()?;
        Some(PanelUpdate {
            panel_id: id.to_owned(),
            rows: output.table.len(),
            inputs: output.inputs.clone(),
            artifact: output.artifact.clone(),
        })
    }

    fn panel_at(&self, id: &str) -> Result<&DynamicPanel, BoardError> {
        self.panel(id).ok_or_else(|| BoardError::UnknownPanel(id.to_owned()))
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Work collected while applying a batch's events.
#[derive(Debug, Default)]
struct Pending {
    global: bool,
    local: Vec<usize>,
    interactions: Vec<(PanelId, EventKind, Option<InteractionEvent>)>,
}

impl Board {
    /// Apply one event.
    ///
    /// # Errors
    ///
    /// See [`Board::handle_batch`].
    pub fn handle(&mut self, event: BoardEvent) -> Result<Vec<PanelUpdate>, BoardError> {
        self.handle_batch(vec![event])
    }

    /// Apply a batch of events as one transaction and return the updated
    /// panels in recompute order.
    ///
    /// # Errors
    ///
    /// Unknown contexts, panels and controls, toggles on controls without an
    /// option list, and any transform failure. On error the board is left
    /// unchanged.
    pub fn handle_batch(&mut self, events: Vec<BoardEvent>) -> Result<Vec<PanelUpdate>, BoardError> {
        let mut draft = self.clone();
        match draft.apply_batch(events) {
            Ok(updates) => {
                *self = draft;
                Ok(updates)
            }
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "event batch rejected");
                Err(err)
            }
        }
    }

    fn apply_batch(&mut self, events: Vec<BoardEvent>) -> Result<Vec<PanelUpdate>, BoardError> {
        let mut pending = Pending::default();
        for event in events {
            self.apply_event(event, &mut pending)?;
        }

        let mut touched: Vec<usize> = Vec::new();
        if pending.global {
            self.publish_state();
            touched.extend(self.recompute_active()?);
        }
        for panel in pending.local {
            if !touched.contains(&panel) {
                self.panels[panel].recompute_local(&self.registry)?;
                touched.push(panel);
            }
        }
        for (source, kind, event) in pending.interactions {
            for panel in self.propagate(&source, kind, event.as_ref())? {
                if !touched.contains(&panel) {
                    touched.push(panel);
                }
            }
        }

        Ok(touched
            .into_iter()
            .filter_map(|i| self.update_for(self.panels[i].id()))
            .collect())
    }

    fn apply_event(&mut self, event: BoardEvent, pending: &mut Pending) -> Result<(), BoardError> {
        match event {
            BoardEvent::Navigate(key) => {
                let index = self
                    .contexts
                    .iter()
                    .position(|c| c.key == key)
                    .ok_or(BoardError::UnknownContext(key))?;
                self.active = index;
                pending.global = true;
                info!(context = %self.contexts[index].key, "navigated");
            }
            BoardEvent::SetControlValue { control, value } => {
                self.set_value(&control, value, pending)?;
            }
            BoardEvent::ToggleChecklist { control, button: None } => {
                debug!(control_id = %control, "checklist mount ignored");
            }
            BoardEvent::ToggleChecklist { control, button } => {
                let plugin = self.control(&control).ok_or_else(|| BoardError::UnknownControl(control.clone()))?;
                let options = self
                    .registry
                    .resolve(plugin.kind_tag())?
                    .toggle_options(plugin.attributes())
                    .ok_or_else(|| BoardError::config(format!("control `{control}` has no select-all toggle")))?;
                if let Some(value) = resolve_toggle(&options, button) {
                    self.set_value(&control, value, pending)?;
                }
            }
            BoardEvent::Interact { panel, kind, event } => {
                self.panel_at(&panel)?;
                pending.interactions.retain(|(p, k, _)| !(p == &panel && *k == kind));
                pending.interactions.push((panel, kind, event));
            }
        }
        Ok(())
    }

    fn set_value(&mut self, control: &str, value: Value, pending: &mut Pending) -> Result<(), BoardError> {
        let slot = *self
            .controls
            .get(control)
            .ok_or_else(|| BoardError::UnknownControl(control.to_owned()))?;
        debug!(control_id = control, value = %value, "control value set");
        match slot {
            ControlSlot::Global { context, index } => {
                if let Some(plugin) = self.contexts[context].sidebar_controls.get_mut(index) {
                    plugin.set_value(value, &self.registry)?;
                }
                if context == self.active {
                    pending.global = true;
                }
            }
            ControlSlot::Local { panel, index } => {
                if let Some(plugin) = self.panels[panel].local_control_at_mut(index) {
                    plugin.set_value(value, &self.registry)?;
                }
                let active = self.contexts[self.active].panels.iter().any(|id| self.panel_index.get(id) == Some(&panel));
                if active && !pending.local.contains(&panel) {
                    pending.local.push(panel);
                }
            }
        }
        Ok(())
    }

    /// Replace the shared snapshot with the active context's control list.
    fn publish_state(&mut self) {
        let context = &self.contexts[self.active];
        let entries = context.sidebar_controls.iter().map(ControlPlugin::entry).collect();
        self.state = Arc::new(DataState::new(context.key.clone(), entries));
        debug!(context = %context.key, controls = context.sidebar_controls.len(), "data state published");
    }

    /// Both phases for every panel of the active context.
    fn recompute_active(&mut self) -> Result<Vec<usize>, BoardError> {
        let state = Arc::clone(&self.state);
        let ids: Vec<usize> = self.contexts[self.active]
            .panels
            .iter()
            .filter_map(|id| self.panel_index.get(id).copied())
            .collect();
        for &i in &ids {
            self.panels[i].recompute(&state, &self.registry)?;
        }
        Ok(ids)
    }

    /// Rebuild every panel listening to `source` for `kind` from the
    /// source's current table.
    fn propagate(
        &mut self,
        source: &str,
        kind: EventKind,
        event: Option<&InteractionEvent>,
    ) -> Result<Vec<usize>, BoardError> {
        let Some(targets) = self.listeners.get(&(source.to_owned(), kind)).cloned() else {
            return Ok(Vec::new());
        };
        let upstream = self.panel_at(source)?.materialized();
        let ids = extract_selected_ids(event);
        debug!(panel_id = source, selected = ids.len(), "interaction propagated");
        for &i in &targets {
            let derived = self.panels[i].data().derive_from(&upstream, &ids);
            self.panels[i].apply_selection(derived, &self.registry)?;
        }
        Ok(targets)
    }
}
