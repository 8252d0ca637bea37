//! The composition tree and `dps` aggregation.
//!
//! A board is assembled from [`Tab`]s whose content is a tree of
//! [`Component`]s: grids, panels and captions. Every container exposes
//! `dps`, the panels beneath it in child order. Once the board is built the
//! panels move into the board's arena and the tree is frozen as
//! [`LayoutNode`]s that refer to panels by id; `dps` is then a read-only fold
//! computed once per context.

#[cfg(test)]
#[path = "layout_test.rs"]
mod layout_test;

use serde::{Deserialize, Serialize};

use crate::control::{ControlId, ControlPlugin};
use crate::panel::DynamicPanel;
use crate::source::PanelId;

/// What the dynamic part of a caption shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptionSource {
    /// Row count of a panel's last materialized table.
    RowCount { panel: PanelId },
    /// Current value of a control.
    ControlValue { control: ControlId },
}

/// Live text: `start + <dynamic> + end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    #[serde(default)]
    pub start: String,
    pub source: CaptionSource,
    #[serde(default)]
    pub end: String,
}

impl Caption {
    #[must_use]
    pub fn render(&self, dynamic: &str) -> String {
        format!("{}{dynamic}{}", self.start, self.end)
    }
}

/// A grid of child components wrapped every `col_wrap` columns.
#[derive(Debug, Clone)]
pub struct ContentGrid {
    pub header: String,
    pub col_wrap: usize,
    pub children: Vec<Component>,
}

impl ContentGrid {
    #[must_use]
    pub fn new(children: Vec<Component>) -> Self {
        Self { header: String::new(), col_wrap: 1, children }
    }

    #[must_use]
    pub fn dps(&self) -> Vec<&DynamicPanel> {
        self.children.iter().flat_map(Component::dps).collect()
    }
}

/// A node of the composition tree before the board is built.
#[derive(Debug, Clone)]
pub enum Component {
    Panel(Box<DynamicPanel>),
    Grid(ContentGrid),
    Caption(Caption),
}

impl Component {
    #[must_use]
    pub fn dps(&self) -> Vec<&DynamicPanel> {
        match self {
            Self::Panel(panel) => vec![&**panel],
            Self::Grid(grid) => grid.dps(),
            Self::Caption(_) => Vec::new(),
        }
    }
}

impl From<DynamicPanel> for Component {
    fn from(panel: DynamicPanel) -> Self {
        Self::Panel(Box::new(panel))
    }
}

impl From<ContentGrid> for Component {
    fn from(grid: ContentGrid) -> Self {
        Self::Grid(grid)
    }
}

impl From<Caption> for Component {
    fn from(caption: Caption) -> Self {
        Self::Caption(caption)
    }
}

/// One navigation context: a sidebar of global controls plus content.
#[derive(Debug, Clone)]
pub struct Tab {
    /// Navigation key; must be unique within a board.
    pub label: String,
    pub header: String,
    pub sidebar_header: String,
    pub sidebar_controls: Vec<ControlPlugin>,
    pub content: Vec<Component>,
}

impl Tab {
    #[must_use]
    pub fn new(label: impl Into<String>, content: Vec<Component>) -> Self {
        Self {
            label: label.into(),
            header: String::new(),
            sidebar_header: crate::consts::DEFAULT_SIDEBAR_HEADER.to_owned(),
            sidebar_controls: Vec::new(),
            content,
        }
    }

    #[must_use]
    pub fn with_sidebar(mut self, controls: Vec<ControlPlugin>) -> Self {
        self.sidebar_controls = controls;
        self
    }

    #[must_use]
    pub fn dps(&self) -> Vec<&DynamicPanel> {
        self.content.iter().flat_map(Component::dps).collect()
    }
}

/// Frozen tree node; panels are referenced by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayoutNode {
    Panel { id: PanelId },
    Grid { header: String, col_wrap: usize, children: Vec<LayoutNode> },
    Caption(Caption),
}

impl LayoutNode {
    #[must_use]
    pub fn dps(&self) -> Vec<&str> {
        match self {
            Self::Panel { id } => vec![id.as_str()],
            Self::Grid { children, .. } => children.iter().flat_map(Self::dps).collect(),
            Self::Caption(_) => Vec::new(),
        }
    }

    /// Captions beneath this node in layout order.
    #[must_use]
    pub fn captions(&self) -> Vec<&Caption> {
        match self {
            Self::Panel { .. } => Vec::new(),
            Self::Grid { children, .. } => children.iter().flat_map(Self::captions).collect(),
            Self::Caption(caption) => vec![caption],
        }
    }
}

/// Move the panels of a component tree into `arena`, returning the frozen
/// tree.
pub(crate) fn freeze(component: Component, arena: &mut Vec<DynamicPanel>) -> LayoutNode {
    match component {
        Component::Panel(panel) => {
            let id = panel.id().to_owned();
            arena.push(*panel);
            LayoutNode::Panel { id }
        }
        Component::Grid(grid) => LayoutNode::Grid {
            header: grid.header,
            col_wrap: grid.col_wrap,
            children: grid.children.into_iter().map(|c| freeze(c, arena)).collect(),
        },
        Component::Caption(caption) => LayoutNode::Caption(caption),
    }
}
