//! Shared constants: patch keys, built-in kind tags, runtime defaults.

/// Patch key whose map overrides the panel's render inputs.
pub const PLOT_INPUTS_KEY: &str = "plot_inputs";

pub const KIND_FILTER_CHECKLIST: &str = "filter:checklist";
pub const KIND_FILTER_RADIO: &str = "filter:radio";
pub const KIND_FILTER_DROPDOWN: &str = "filter:dropdown";
pub const KIND_FILTER_SLIDER: &str = "filter:slider";
pub const KIND_FILTER_RANGE_SLIDER: &str = "filter:range_slider";
pub const KIND_SUM_CHECKLIST: &str = "sum:checklist";
pub const KIND_PLOT_INPUT_RADIO: &str = "plot_input:radio";
pub const KIND_PLOT_INPUT_DROPDOWN: &str = "plot_input:dropdown";
pub const KIND_PLOT_INPUT_SLIDER: &str = "plot_input:slider";
pub const KIND_PLOT_INPUT_RANGE_SLIDER: &str = "plot_input:range_slider";

/// Context key of a board built without tabs.
pub const DEFAULT_CONTEXT: &str = "";

pub const DEFAULT_SIDEBAR_HEADER: &str = "Data Controls";

pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_BATCH: usize = 64;
/// Capacity of the update broadcast channel.
pub const DEFAULT_UPDATE_CAPACITY: usize = 256;
