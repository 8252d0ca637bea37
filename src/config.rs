//! Declarative board definitions in YAML.
//!
//! ```yaml
//! tabs:
//!   - label: overview
//!     sidebar:
//!       - id: years
//!         kind: filter:range_slider
//!         attributes: {data_col: year, slider_min: 2000, slider_max: 2020}
//!     content:
//!       - type: panel
//!         id: table
//!         source: {type: file, path: gapminder.csv}
//!       - type: grid
//!         col_wrap: 2
//!         children:
//!           - type: caption
//!             start: "Rows: "
//!             source: {type: row_count, panel: table}
//! ```
//!
//! A definition without `tabs` is one anonymous context built from the
//! top-level `sidebar` and `content`. Relative file paths resolve against
//! the definition's directory.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use datastate::Attributes;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::board::Board;
use crate::consts::{DEFAULT_CONTEXT, DEFAULT_SIDEBAR_HEADER};
use crate::control::{ControlPlugin, TransformRegistry};
use crate::error::{BoardError, ErrorCode};
use crate::layout::{Caption, Component, ContentGrid, Tab};
use crate::panel::DynamicPanel;
use crate::render::{FigureRenderer, RecordsRenderer, Render};
use crate::source::{DataSource, DelimitedStorage, EventKind, PanelId, Storage};
use crate::table::{Record, Table};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read board definition {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid board definition: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("board definition rejected: {0}")]
    Build(#[from] BoardError),
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "E_CONFIG_READ",
            Self::Parse(_) => "E_CONFIG_PARSE",
            Self::Build(err) => err.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Read { .. } => true,
            Self::Parse(_) => false,
            Self::Build(err) => err.retryable(),
        }
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// Root of a board definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    #[serde(default)]
    pub tabs: Vec<TabConfig>,
    #[serde(default)]
    pub sidebar_header: Option<String>,
    #[serde(default)]
    pub sidebar: Vec<ControlConfig>,
    #[serde(default)]
    pub content: Vec<ComponentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TabConfig {
    pub label: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub sidebar_header: Option<String>,
    #[serde(default)]
    pub sidebar: Vec<ControlConfig>,
    #[serde(default)]
    pub content: Vec<ComponentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    /// Generated when omitted.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub header: String,
    /// Kind tag, e.g. `filter:checklist`.
    pub kind: String,
    #[serde(default)]
    pub attributes: Attributes,
    /// Starting value; the kind's default when omitted.
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentConfig {
    Panel(PanelConfig),
    Grid(GridConfig),
    Caption(Caption),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    #[serde(default)]
    pub header: String,
    #[serde(default = "default_col_wrap")]
    pub col_wrap: usize,
    #[serde(default)]
    pub children: Vec<ComponentConfig>,
}

fn default_col_wrap() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    pub id: PanelId,
    #[serde(default)]
    pub header: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    /// Base render inputs.
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub controls: Vec<ControlConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Inline rows.
    Records { rows: Vec<Record> },
    /// Delimited file; the delimiter is inferred from the extension when
    /// omitted.
    File {
        path: PathBuf,
        #[serde(default)]
        delimiter: Option<char>,
    },
    /// Rows of another panel picked by an interaction.
    Derived { panel: PanelId, event: EventKind },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RendererConfig {
    #[default]
    Records,
    RecordsWithIds,
    Figure { kind: String },
}

// =============================================================================
// BUILD
// =============================================================================

impl BoardConfig {
    /// Parse a definition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML or unknown fields.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Build a board with the built-in kinds, reading files from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Build`] for anything the board rejects.
    pub fn build(self, base_dir: &Path) -> Result<Board, ConfigError> {
        self.build_with(base_dir, TransformRegistry::with_builtins(), &DelimitedStorage)
    }

    /// Build against a custom registry and storage collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Build`] for anything the board rejects.
    pub fn build_with(
        self,
        base_dir: &Path,
        registry: TransformRegistry,
        storage: &dyn Storage,
    ) -> Result<Board, ConfigError> {
        let builder = Builder { base_dir, storage };
        let tabs = if self.tabs.is_empty() {
            let mut tab = Tab::new(DEFAULT_CONTEXT, builder.components(self.content)?)
                .with_sidebar(controls(self.sidebar));
            tab.sidebar_header = self.sidebar_header.unwrap_or_else(|| DEFAULT_SIDEBAR_HEADER.to_owned());
            vec![tab]
        } else {
            self.tabs
                .into_iter()
                .map(|tab| builder.tab(tab))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Board::with_registry(tabs, registry)?)
    }
}

/// Read, parse and build a board definition file.
///
/// # Errors
///
/// Returns [`ConfigError`] on read, parse or build failure.
pub fn load_board(path: &Path) -> Result<Board, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let config = BoardConfig::from_yaml(&text)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let board = config.build(base_dir)?;
    info!(path = %path.display(), contexts = board.contexts().len(), "board definition loaded");
    Ok(board)
}

struct Builder<'a> {
    base_dir: &'a Path,
    storage: &'a dyn Storage,
}

impl Builder<'_> {
    fn tab(&self, config: TabConfig) -> Result<Tab, BoardError> {
        let mut tab = Tab::new(config.label, self.components(config.content)?).with_sidebar(controls(config.sidebar));
        tab.header = config.header;
        if let Some(header) = config.sidebar_header {
            tab.sidebar_header = header;
        }
        Ok(tab)
    }

    fn components(&self, configs: Vec<ComponentConfig>) -> Result<Vec<Component>, BoardError> {
        configs.into_iter().map(|c| self.component(c)).collect()
    }

    fn component(&self, config: ComponentConfig) -> Result<Component, BoardError> {
        Ok(match config {
            ComponentConfig::Panel(panel) => self.panel(panel)?.into(),
            ComponentConfig::Grid(grid) => ContentGrid {
                header: grid.header,
                col_wrap: grid.col_wrap.max(1),
                children: self.components(grid.children)?,
            }
            .into(),
            ComponentConfig::Caption(caption) => caption.into(),
        })
    }

    fn panel(&self, config: PanelConfig) -> Result<DynamicPanel, BoardError> {
        let renderer: Arc<dyn Render> = match config.renderer {
            RendererConfig::Records => Arc::new(RecordsRenderer::default()),
            RendererConfig::RecordsWithIds => Arc::new(RecordsRenderer { include_ids: true }),
            RendererConfig::Figure { kind } => Arc::new(FigureRenderer::new(kind)),
        };
        let mut builder = DynamicPanel::builder(config.id, self.source(config.source)?)
            .header(config.header)
            .renderer(renderer)
            .render_inputs(config.inputs);
        for c in config.controls {
            builder = builder.control(control(c));
        }
        builder.build_with(self.storage)
    }

    fn source(&self, config: SourceConfig) -> Result<DataSource, BoardError> {
        match config {
            SourceConfig::Records { rows } => Ok(DataSource::Literal(Table::from_records(&rows)?)),
            SourceConfig::File { path, delimiter } => {
                let path = if path.is_relative() { self.base_dir.join(path) } else { path };
                match delimiter {
                    None => DataSource::delimited(path),
                    Some(c) => {
                        let delimiter = match u8::try_from(c) {
                            Ok(byte) if c.is_ascii() => byte,
                            _ => {
                                return Err(BoardError::config(format!(
                                    "delimiter `{c}` is not a single ASCII character"
                                )));
                            }
                        };
                        Ok(DataSource::DelimitedFile { path, delimiter })
                    }
                }
            }
            SourceConfig::Derived { panel, event } => Ok(DataSource::DerivedSelection { source: panel, event }),
        }
    }
}

fn controls(configs: Vec<ControlConfig>) -> Vec<ControlPlugin> {
    configs.into_iter().map(control).collect()
}

fn control(config: ControlConfig) -> ControlPlugin {
    let mut plugin = ControlPlugin::new(&config.kind, config.attributes).with_header(config.header);
    if let Some(id) = config.id {
        plugin = plugin.with_id(id);
    }
    if let Some(value) = config.value {
        plugin = plugin.with_value(value);
    }
    plugin
}
