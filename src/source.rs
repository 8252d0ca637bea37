//! Data sources and the per-panel data manager.
//!
//! A panel's [`DataManager`] is built from exactly one [`DataSource`]. Literal
//! and delimited-file sources are materialized eagerly through a [`Storage`]
//! collaborator when the panel is constructed, so recompute never performs
//! I/O. A derived-selection source starts as an empty table with its
//! upstream panel's schema and is replaced on every interaction event.

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{BoardError, LoadError};
use crate::table::{RowId, Table};

/// Identifier of a dynamic panel.
pub type PanelId = String;

/// Interaction a derived panel listens to on its upstream panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[serde(alias = "hoverData")]
    Hover,
    #[serde(alias = "clickData")]
    Click,
    #[serde(alias = "selectedData")]
    BrushSelect,
}

/// Where a panel's base table comes from.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// An in-memory table.
    Literal(Table),
    /// A delimited text file parsed with the given delimiter byte.
    DelimitedFile { path: PathBuf, delimiter: u8 },
    /// Rows of another panel's materialized table picked by an interaction.
    DerivedSelection { source: PanelId, event: EventKind },
}

impl DataSource {
    /// A delimited file whose delimiter is inferred from its extension
    /// (`.csv` comma, `.tsv` tab).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Configuration`] for any other extension.
    pub fn delimited(path: impl Into<PathBuf>) -> Result<Self, BoardError> {
        let path = path.into();
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => b',',
            Some("tsv") => b'\t',
            _ => {
                return Err(BoardError::config(format!(
                    "cannot infer delimiter for data source {}",
                    path.display()
                )));
            }
        };
        Ok(Self::DelimitedFile { path, delimiter })
    }
}

/// One point of an interaction event, carrying the row ids it covers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPoint {
    #[serde(default, rename = "rowIds", alias = "customdata")]
    pub row_ids: Vec<RowId>,
}

/// Hover, click or brush-select payload emitted by a panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    #[serde(default)]
    pub points: Vec<EventPoint>,
}

impl InteractionEvent {
    #[must_use]
    pub fn from_ids(ids: &[RowId]) -> Self {
        Self { points: ids.iter().map(|id| EventPoint { row_ids: vec![*id] }).collect() }
    }
}

/// Concatenate the row ids of every point in event order. An absent event
/// yields no ids; duplicates are kept.
#[must_use]
pub fn extract_selected_ids(event: Option<&InteractionEvent>) -> Vec<RowId> {
    event.map_or_else(Vec::new, |event| {
        event
            .points
            .iter()
            .flat_map(|p| p.row_ids.iter().copied())
            .collect()
    })
}

/// Storage collaborator that turns a static source into a table.
pub trait Storage: Send + Sync {
    /// Materialize a literal or file source.
    ///
    /// # Errors
    ///
    /// Returns a load error for unreadable or malformed input, and
    /// [`BoardError::Configuration`] for derived sources, which storage cannot
    /// resolve.
    fn load_table(&self, source: &DataSource) -> Result<Table, BoardError>;
}

/// Default storage: in-memory literals plus comma/tab separated files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedStorage;

impl Storage for DelimitedStorage {
    fn load_table(&self, source: &DataSource) -> Result<Table, BoardError> {
        match source {
            DataSource::Literal(table) => Ok(table.clone()),
            DataSource::DelimitedFile { path, delimiter } => read_delimited(path, *delimiter),
            DataSource::DerivedSelection { source, .. } => Err(BoardError::config(format!(
                "derived selection from `{source}` cannot be loaded from storage"
            ))),
        }
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Table, BoardError> {
    let file = File::open(path).map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    let mut reader = csv::ReaderBuilder::new().delimiter(delimiter).from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(LoadError::from)?
        .iter()
        .map(str::to_owned)
        .collect();
    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(LoadError::from)?;
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            column.push(parse_cell(field));
        }
    }

    let rows = columns.first().map_or(0, Vec::len);
    debug!(path = %path.display(), rows, columns = headers.len(), "delimited source loaded");
    Table::from_columns(headers.into_iter().zip(columns).collect())
}

/// Per-cell type inference: empty is null, then integer, float, boolean,
/// and finally string.
fn parse_cell(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(v) = field.parse::<i64>() {
        return Value::from(v);
    }
    if let Ok(v) = field.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(v) {
            return Value::Number(n);
        }
    }
    match field {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::String(field.to_owned()),
    }
}

/// Resolves a panel's configured source into its materialized table.
#[derive(Debug, Clone)]
pub struct DataManager {
    source: Arc<DataSource>,
    table: Arc<Table>,
}

impl DataManager {
    /// Resolve the source once. Derived sources start empty; the board seeds
    /// their schema from the upstream panel with [`DataManager::seed_schema`].
    ///
    /// # Errors
    ///
    /// Propagates storage failures so panel construction fails instead of a
    /// later recompute.
    pub fn load(source: DataSource, storage: &dyn Storage) -> Result<Self, BoardError> {
        let table = match &source {
            DataSource::DerivedSelection { .. } => Table::default(),
            _ => storage.load_table(&source)?,
        };
        Ok(Self { source: Arc::new(source), table: Arc::new(table) })
    }

    /// The current table. Cheap to clone.
    #[must_use]
    pub fn materialize(&self) -> Arc<Table> {
        Arc::clone(&self.table)
    }

    #[must_use]
    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Upstream panel and event kind for a derived-selection source.
    #[must_use]
    pub fn derived_from(&self) -> Option<(&str, EventKind)> {
        match self.source.as_ref() {
            DataSource::DerivedSelection { source, event } => Some((source.as_str(), *event)),
            _ => None,
        }
    }

    /// Rows of `source_table` whose id is selected. No selection yields an
    /// empty table with the source's schema.
    #[must_use]
    pub fn derive_from(&self, source_table: &Table, selected: &[RowId]) -> Table {
        if selected.is_empty() {
            return source_table.empty_like();
        }
        source_table.select_ids(selected)
    }

    /// Give a derived source its upstream schema before the first event.
    pub(crate) fn seed_schema(&mut self, upstream: &Table) {
        if self.derived_from().is_some() && self.table.is_empty() {
            self.table = Arc::new(upstream.empty_like());
        }
    }

    /// Replace the materialized table of a derived source.
    pub(crate) fn replace(&mut self, table: Table) {
        self.table = Arc::new(table);
    }
}
