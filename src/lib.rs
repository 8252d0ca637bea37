//! Reactive dashboard engine.
//!
//! A board is a set of navigation contexts, each a sidebar of global controls
//! plus a tree of panels. Every panel owns a base table; control values
//! filter it or adjust how it is rendered, and interactions on one panel can
//! select the rows another panel shows. The shared control state travels as a
//! [`datastate::DataState`] so any other component can replay the same
//! filters over its own table.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`board`] | Contexts, event handling and cross-panel propagation |
//! | [`runtime`] | Async task that coalesces and applies event batches |
//! | [`config`] | YAML board definitions |
//! | [`panel`] | Two-phase recompute of a single panel |
//! | [`control`] | Control plugins, the [`control::Transform`] seam and its registry |
//! | [`plugins`] | Built-in filter and input kinds |
//! | [`layout`] | Tabs, grids and captions, frozen into a layout tree |
//! | [`source`] | Data sources, storage and interaction events |
//! | [`table`] | Column-oriented table with stable row ids |
//! | [`patch`] | Render-argument patches and their merge |
//! | [`render`] | The [`render::Render`] seam and stock renderers |
//! | [`error`] | Error types and stable error codes |
//! | [`consts`] | Kind tags, reserved keys and runtime defaults |

pub mod board;
pub mod config;
pub mod consts;
pub mod control;
pub mod error;
pub mod layout;
pub mod panel;
pub mod patch;
pub mod plugins;
pub mod render;
pub mod runtime;
pub mod source;
pub mod table;

pub use board::{Board, BoardEvent, PanelUpdate};
pub use config::{BoardConfig, ConfigError, load_board};
pub use control::{ControlPlugin, Transform, TransformRegistry};
pub use datastate::{ControlDescriptor, ControlEntry, DataState};
pub use error::{BoardError, ErrorCode};
pub use layout::{Caption, CaptionSource, Component, ContentGrid, Tab};
pub use panel::DynamicPanel;
pub use runtime::{BoardHandle, RuntimeConfig, spawn_board_runtime};
pub use source::{DataSource, EventKind, InteractionEvent};
pub use table::Table;
