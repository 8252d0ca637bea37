//! Dynamic panels and the two-phase recompute.
//!
//! DESIGN
//! ======
//! Phase 1 replays the shared [`DataState`] control list over the panel's
//! materialized base table. Phase 2 replays the panel's own controls over the
//! phase-1 output, or over a freshly derived selection when the upstream
//! panel emitted an interaction, then applies the fixed data transform.
//! The two patches are merged, `plot_inputs` overrides the base render
//! inputs, and the renderer runs once.
//!
//! Every phase is a fresh derivation from the panel's inputs: the base table
//! and control attributes are never touched, so replaying the same inputs
//! yields the same table, patch and artifact.
//!
//! The phase-1 output and patch are cached so a local control change reruns
//! phase 2 only.

#[cfg(test)]
#[path = "panel_test.rs"]
mod panel_test;

use std::fmt;
use std::sync::Arc;

use datastate::{Attributes, DataState};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::control::{ControlPlugin, PanelContext, TransformRegistry};
use crate::error::BoardError;
use crate::patch::{PanelPatch, merge};
use crate::render::{Artifact, RecordsRenderer, Render};
use crate::source::{DataManager, DataSource, DelimitedStorage, PanelId, Storage};
use crate::table::Table;

/// Fixed, parameter-free hook applied after the local controls.
pub type DataTransform = Arc<dyn Fn(Table) -> Table + Send + Sync>;

/// Result of the last successful recompute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelOutput {
    /// Final table handed to the renderer.
    pub table: Arc<Table>,
    /// `merge(patch1, patch2)`.
    pub patch: PanelPatch,
    /// Base render inputs with `plot_inputs` applied.
    pub inputs: Map<String, Value>,
    pub artifact: Artifact,
}

/// A data source, two control lists and a render step.
#[derive(Clone)]
pub struct DynamicPanel {
    id: PanelId,
    header: String,
    data: DataManager,
    local_controls: Vec<ControlPlugin>,
    renderer: Arc<dyn Render>,
    render_inputs: Map<String, Value>,
    data_transform: Option<DataTransform>,
    stage: Arc<Table>,
    global_patch: PanelPatch,
    output: Option<PanelOutput>,
}

impl DynamicPanel {
    #[must_use]
    pub fn builder(id: impl Into<PanelId>, source: DataSource) -> PanelBuilder {
        PanelBuilder {
            id: id.into(),
            header: String::new(),
            source,
            local_controls: Vec::new(),
            renderer: Arc::new(RecordsRenderer::default()),
            render_inputs: Map::new(),
            data_transform: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }

    #[must_use]
    pub fn data(&self) -> &DataManager {
        &self.data
    }

    #[must_use]
    pub fn local_controls(&self) -> &[ControlPlugin] {
        &self.local_controls
    }

    #[must_use]
    pub fn render_inputs(&self) -> &Map<String, Value> {
        &self.render_inputs
    }

    /// Last successful recompute, if any.
    #[must_use]
    pub fn output(&self) -> Option<&PanelOutput> {
        self.output.as_ref()
    }

    #[must_use]
    pub fn artifact(&self) -> Option<&Artifact> {
        self.output.as_ref().map(|o| &o.artifact)
    }

    /// The panel's current table: the last final table, or the materialized
    /// base table before the first recompute.
    #[must_use]
    pub fn materialized(&self) -> Arc<Table> {
        self.output
            .as_ref()
            .map_or_else(|| self.data.materialize(), |o| Arc::clone(&o.table))
    }

    /// Phase 1: thread the base table through the shared control list.
    ///
    /// # Errors
    ///
    /// Fails on unknown kind tags and on transform errors.
    pub fn run_global_phase(
        &self,
        state: &DataState,
        registry: &TransformRegistry,
    ) -> Result<(Table, PanelPatch), BoardError> {
        let base = self.data.materialize();
        let controls = state
            .global_controls
            .iter()
            .map(|entry| (entry.kind_tag.as_str(), &entry.attributes, &entry.value));
        self.apply(controls, (*base).clone(), registry)
    }

    /// Phase 2: thread `input` through the local controls, then the data
    /// transform.
    ///
    /// # Errors
    ///
    /// Fails on unknown kind tags, transform errors, and unprepared controls.
    pub fn run_local_phase(
        &self,
        input: Table,
        registry: &TransformRegistry,
    ) -> Result<(Table, PanelPatch), BoardError> {
        let controls = self
            .local_controls
            .iter()
            .map(|control| {
                let value = control
                    .value()
                    .ok_or_else(|| BoardError::config(format!("control `{}` has no value", control.id())))?;
                Ok((control.kind_tag(), control.attributes(), value))
            })
            .collect::<Result<Vec<_>, BoardError>>()?;
        let (table, patch) = self.apply(controls, input, registry)?;
        let table = match &self.data_transform {
            Some(transform) => transform(table),
            None => table,
        };
        Ok((table, patch))
    }

    fn apply<'a, I>(&self, controls: I, table: Table, registry: &TransformRegistry) -> Result<(Table, PanelPatch), BoardError>
    where
        I: IntoIterator<Item = (&'a str, &'a Attributes, &'a Value)>,
    {
        let panel = PanelContext { panel_id: &self.id, render_inputs: &self.render_inputs };
        controls
            .into_iter()
            .try_fold((table, PanelPatch::new()), |(table, acc), (kind_tag, attributes, value)| {
                let transform = registry.resolve(kind_tag)?;
                let (table, patch) = transform.configure(attributes, panel, table, value)?;
                Ok((table, merge(&acc, &patch)))
            })
    }

    /// Both phases from the shared state.
    pub(crate) fn recompute(&mut self, state: &DataState, registry: &TransformRegistry) -> Result<(), BoardError> {
        let (stage, patch1) = self.run_global_phase(state, registry)?;
        debug!(panel_id = %self.id, rows = stage.len(), "global phase complete");
        self.stage = Arc::new(stage);
        self.global_patch = patch1;
        self.finish(registry)
    }

    /// Phase 2 only, from the cached phase-1 output.
    pub(crate) fn recompute_local(&mut self, registry: &TransformRegistry) -> Result<(), BoardError> {
        self.finish(registry)
    }

    /// Replace a derived source's table and run phase 2 from it, bypassing
    /// the sidebar-filtered table.
    pub(crate) fn apply_selection(&mut self, derived: Table, registry: &TransformRegistry) -> Result<(), BoardError> {
        debug!(panel_id = %self.id, rows = derived.len(), "derived selection applied");
        self.data.replace(derived);
        self.stage = self.data.materialize();
        self.finish(registry)
    }

    fn finish(&mut self, registry: &TransformRegistry) -> Result<(), BoardError> {
        let (table, patch2) = self.run_local_phase((*self.stage).clone(), registry)?;
        let patch = merge(&self.global_patch, &patch2);
        let inputs = patch.resolve_inputs(&self.render_inputs);
        let artifact = self.renderer.render(&table, &inputs);
        debug!(panel_id = %self.id, rows = table.len(), "panel rendered");
        self.output = Some(PanelOutput { table: Arc::new(table), patch, inputs, artifact });
        Ok(())
    }

    pub(crate) fn local_control_at_mut(&mut self, index: usize) -> Option<&mut ControlPlugin> {
        self.local_controls.get_mut(index)
    }

    pub(crate) fn prepare_controls(&mut self, registry: &TransformRegistry) -> Result<(), BoardError> {
        for control in &mut self.local_controls {
            control.prepare(registry)?;
        }
        Ok(())
    }

    /// Columns of the tables this panel emits, found by running phase 2 over
    /// a row-free copy of the base table.
    pub(crate) fn output_schema(&self, registry: &TransformRegistry) -> Result<Table, BoardError> {
        let (table, _) = self.run_local_phase(self.data.materialize().empty_like(), registry)?;
        Ok(table.empty_like())
    }

    pub(crate) fn seed_schema(&mut self, upstream: &Table) {
        self.data.seed_schema(upstream);
        self.stage = self.data.materialize();
    }
}

impl fmt::Debug for DynamicPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicPanel")
            .field("id", &self.id)
            .field("header", &self.header)
            .field("local_controls", &self.local_controls.len())
            .field("rows", &self.stage.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`DynamicPanel`]; loads the data source eagerly on build.
pub struct PanelBuilder {
    id: PanelId,
    header: String,
    source: DataSource,
    local_controls: Vec<ControlPlugin>,
    renderer: Arc<dyn Render>,
    render_inputs: Map<String, Value>,
    data_transform: Option<DataTransform>,
}

impl PanelBuilder {
    #[must_use]
    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    #[must_use]
    pub fn control(mut self, control: ControlPlugin) -> Self {
        self.local_controls.push(control);
        self
    }

    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn Render>) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn render_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.render_inputs = inputs;
        self
    }

    #[must_use]
    pub fn data_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Table) -> Table + Send + Sync + 'static,
    {
        self.data_transform = Some(Arc::new(transform));
        self
    }

    /// Build, reading file sources from disk.
    ///
    /// # Errors
    ///
    /// Propagates load failures.
    pub fn build(self) -> Result<DynamicPanel, BoardError> {
        self.build_with(&DelimitedStorage)
    }

    /// Build against a custom storage collaborator.
    ///
    /// # Errors
    ///
    /// Propagates load failures.
    pub fn build_with(self, storage: &dyn Storage) -> Result<DynamicPanel, BoardError> {
        let data = DataManager::load(self.source, storage)?;
        let stage = data.materialize();
        debug!(panel_id = %self.id, rows = stage.len(), "panel data loaded");
        Ok(DynamicPanel {
            id: self.id,
            header: self.header,
            data,
            local_controls: self.local_controls,
            renderer: self.renderer,
            render_inputs: self.render_inputs,
            data_transform: self.data_transform,
            stage,
            global_patch: PanelPatch::new(),
            output: None,
        })
    }
}
