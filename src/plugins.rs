//! Built-in control kinds.
//!
//! Filters narrow the table and return an empty patch. Plot-input selectors
//! leave the table alone and return `{"plot_inputs": {param: value}}`. The
//! sum checklist rewrites one column from its per-item siblings.
//!
//! | Kind tag | Attributes | Default value |
//! |----------|------------|---------------|
//! | `filter:checklist` | `data_col`, `data_values`, `toggle_all` | every option |
//! | `filter:radio`, `filter:dropdown` | `data_col`, `data_values` | first option |
//! | `filter:slider` | `data_col`, `slider_min`, `slider_max`, `edges_infinite` | `slider_max` |
//! | `filter:range_slider` | `data_col`, `slider_min`, `slider_max`, `edges_infinite` | `[slider_min, slider_max]` |
//! | `sum:checklist` | `data_col`, `data_values`, `toggle_all` | every option |
//! | `plot_input:radio`, `plot_input:dropdown` | `plot_input`, `data_values` | first option |
//! | `plot_input:slider` | `plot_input`, `slider_min`, `slider_max` | `slider_max` |
//! | `plot_input:range_slider` | `plot_input`, `slider_min`, `slider_max` | `[slider_min, slider_max]` |

#[cfg(test)]
#[path = "plugins_test.rs"]
mod plugins_test;

use std::sync::Arc;

use datastate::Attributes;
use serde_json::Value;

use crate::consts::{
    KIND_FILTER_CHECKLIST, KIND_FILTER_DROPDOWN, KIND_FILTER_RADIO, KIND_FILTER_RANGE_SLIDER,
    KIND_FILTER_SLIDER, KIND_PLOT_INPUT_DROPDOWN, KIND_PLOT_INPUT_RADIO,
    KIND_PLOT_INPUT_RANGE_SLIDER, KIND_PLOT_INPUT_SLIDER, KIND_SUM_CHECKLIST,
};
use crate::control::{PanelContext, Transform, attr_array, attr_bool_or, attr_f64, attr_str};
use crate::error::BoardError;
use crate::patch::PanelPatch;
use crate::table::{Table, cell_eq};

/// One instance of every built-in kind.
pub(crate) fn builtins() -> Vec<Arc<dyn Transform>> {
    vec![
        Arc::new(ChecklistFilter),
        Arc::new(OptionFilter::radio()),
        Arc::new(OptionFilter::dropdown()),
        Arc::new(SliderFilter),
        Arc::new(RangeSliderFilter),
        Arc::new(SumChecklist),
        Arc::new(OptionInput::radio()),
        Arc::new(OptionInput::dropdown()),
        Arc::new(SliderInput),
        Arc::new(RangeSliderInput),
    ]
}

// =============================================================================
// FILTERS
// =============================================================================

/// Keep rows whose target cell is one of the checked options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecklistFilter;

impl Transform for ChecklistFilter {
    fn kind_tag(&self) -> &'static str {
        KIND_FILTER_CHECKLIST
    }

    fn default_value(&self, attributes: &Attributes) -> Result<Value, BoardError> {
        Ok(Value::Array(attr_array(attributes, "data_values")?.to_vec()))
    }

    fn validate(&self, attributes: &Attributes, value: &Value) -> Result<(), BoardError> {
        attr_str(attributes, "data_col")?;
        attr_array(attributes, "data_values")?;
        if !value.is_array() {
            return Err(BoardError::config("checklist value must be a list"));
        }
        Ok(())
    }

    fn required_columns(&self, attributes: &Attributes) -> Vec<String> {
        attr_str(attributes, "data_col").map(|c| vec![c.to_owned()]).unwrap_or_default()
    }

    fn toggle_options(&self, attributes: &Attributes) -> Option<Vec<Value>> {
        toggle_options(attributes)
    }

    fn configure(
        &self,
        attributes: &Attributes,
        panel: PanelContext<'_>,
        table: Table,
        value: &Value,
    ) -> Result<(Table, PanelPatch), BoardError> {
        let column = attr_str(attributes, "data_col")?;
        let checked = value
            .as_array()
            .ok_or_else(|| BoardError::invalid_value(self.kind_tag(), "expected a list"))?;
        let table = filter_column(panel, &table, column, |cell| {
            checked.iter().any(|option| cell_eq(cell, option))
        })?;
        Ok((table, PanelPatch::new()))
    }
}

/// Keep rows whose target cell equals the selected option. Backs both the
/// radio and the dropdown kinds.
#[derive(Debug, Clone, Copy)]
pub struct OptionFilter {
    kind_tag: &'static str,
}

impl OptionFilter {
    #[must_use]
    pub fn radio() -> Self {
        Self { kind_tag: KIND_FILTER_RADIO }
    }

    #[must_use]
    pub fn dropdown() -> Self {
        Self { kind_tag: KIND_FILTER_DROPDOWN }
    }
}

impl Transform for OptionFilter {
    fn kind_tag(&self) -> &'static str {
        self.kind_tag
    }

    fn default_value(&self, attributes: &Attributes) -> Result<Value, BoardError> {
        first_option(attributes)
    }

    fn validate(&self, attributes: &Attributes, value: &Value) -> Result<(), BoardError> {
        attr_str(attributes, "data_col")?;
        check_option(attributes, value)
    }

    fn required_columns(&self, attributes: &Attributes) -> Vec<String> {
        attr_str(attributes, "data_col").map(|c| vec![c.to_owned()]).unwrap_or_default()
    }

    fn configure(
        &self,
        attributes: &Attributes,
        panel: PanelContext<'_>,
        table: Table,
        value: &Value,
    ) -> Result<(Table, PanelPatch), BoardError> {
        let column = attr_str(attributes, "data_col")?;
        let table = filter_column(panel, &table, column, |cell| cell_eq(cell, value))?;
        Ok((table, PanelPatch::new()))
    }
}

/// Exact-match filter on a numeric column; a two-element value switches to
/// range semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SliderFilter;

impl Transform for SliderFilter {
    fn kind_tag(&self) -> &'static str {
        KIND_FILTER_SLIDER
    }

    fn default_value(&self, attributes: &Attributes) -> Result<Value, BoardError> {
        Ok(number_value(Bounds::from_attributes(attributes)?.max))
    }

    fn validate(&self, attributes: &Attributes, value: &Value) -> Result<(), BoardError> {
        attr_str(attributes, "data_col")?;
        let bounds = Bounds::from_attributes(attributes)?;
        if value.is_array() {
            bounds.check_pair(value)
        } else {
            bounds.check_scalar(value)
        }
    }

    fn required_columns(&self, attributes: &Attributes) -> Vec<String> {
        attr_str(attributes, "data_col").map(|c| vec![c.to_owned()]).unwrap_or_default()
    }

    fn configure(
        &self,
        attributes: &Attributes,
        panel: PanelContext<'_>,
        table: Table,
        value: &Value,
    ) -> Result<(Table, PanelPatch), BoardError> {
        let column = attr_str(attributes, "data_col")?;
        let table = if value.is_array() {
            let range = Range::resolve(attributes, value, self.kind_tag())?;
            filter_column(panel, &table, column, |cell| range.contains(cell))?
        } else if value.is_number() {
            filter_column(panel, &table, column, |cell| cell_eq(cell, value))?
        } else {
            return Err(BoardError::invalid_value(self.kind_tag(), "expected a number or a pair"));
        };
        Ok((table, PanelPatch::new()))
    }
}

/// Keep rows with `min <= cell <= max`; with `edges_infinite` a bound sitting
/// on the slider's own edge is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeSliderFilter;

impl Transform for RangeSliderFilter {
    fn kind_tag(&self) -> &'static str {
        KIND_FILTER_RANGE_SLIDER
    }

    fn default_value(&self, attributes: &Attributes) -> Result<Value, BoardError> {
        Ok(Bounds::from_attributes(attributes)?.full_range())
    }

    fn validate(&self, attributes: &Attributes, value: &Value) -> Result<(), BoardError> {
        attr_str(attributes, "data_col")?;
        Bounds::from_attributes(attributes)?.check_pair(value)
    }

    fn required_columns(&self, attributes: &Attributes) -> Vec<String> {
        attr_str(attributes, "data_col").map(|c| vec![c.to_owned()]).unwrap_or_default()
    }

    fn configure(
        &self,
        attributes: &Attributes,
        panel: PanelContext<'_>,
        table: Table,
        value: &Value,
    ) -> Result<(Table, PanelPatch), BoardError> {
        let column = attr_str(attributes, "data_col")?;
        let range = Range::resolve(attributes, value, self.kind_tag())?;
        let table = filter_column(panel, &table, column, |cell| range.contains(cell))?;
        Ok((table, PanelPatch::new()))
    }
}

/// Replace `data_col` with the row-wise sum of `<data_col>_<item>` over the
/// checked items.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumChecklist;

impl Transform for SumChecklist {
    fn kind_tag(&self) -> &'static str {
        KIND_SUM_CHECKLIST
    }

    fn default_value(&self, attributes: &Attributes) -> Result<Value, BoardError> {
        Ok(Value::Array(attr_array(attributes, "data_values")?.to_vec()))
    }

    fn validate(&self, attributes: &Attributes, value: &Value) -> Result<(), BoardError> {
        attr_str(attributes, "data_col")?;
        attr_array(attributes, "data_values")?;
        if !value.is_array() {
            return Err(BoardError::config("sum checklist value must be a list"));
        }
        Ok(())
    }

    fn required_columns(&self, attributes: &Attributes) -> Vec<String> {
        let (Ok(column), Ok(items)) = (attr_str(attributes, "data_col"), attr_array(attributes, "data_values"))
        else {
            return Vec::new();
        };
        items.iter().map(|item| part_column(column, item)).collect()
    }

    fn toggle_options(&self, attributes: &Attributes) -> Option<Vec<Value>> {
        toggle_options(attributes)
    }

    fn configure(
        &self,
        attributes: &Attributes,
        panel: PanelContext<'_>,
        table: Table,
        value: &Value,
    ) -> Result<(Table, PanelPatch), BoardError> {
        let column = attr_str(attributes, "data_col")?;
        let checked = value
            .as_array()
            .ok_or_else(|| BoardError::invalid_value(self.kind_tag(), "expected a list"))?;

        let mut sums = vec![0.0_f64; table.len()];
        for item in checked {
            let name = part_column(column, item);
            let cells = table
                .column(&name)
                .ok_or_else(|| BoardError::MissingColumn { panel: panel.panel_id.to_owned(), column: name.clone() })?;
            for (sum, cell) in sums.iter_mut().zip(cells) {
                *sum += cell.as_f64().unwrap_or(0.0);
            }
        }
        let values = sums.into_iter().map(number_value).collect();
        Ok((table.with_column(column, values)?, PanelPatch::new()))
    }
}

// =============================================================================
// PLOT INPUTS
// =============================================================================

/// Option selector feeding a render input. Backs the radio and dropdown kinds.
#[derive(Debug, Clone, Copy)]
pub struct OptionInput {
    kind_tag: &'static str,
}

impl OptionInput {
    #[must_use]
    pub fn radio() -> Self {
        Self { kind_tag: KIND_PLOT_INPUT_RADIO }
    }

    #[must_use]
    pub fn dropdown() -> Self {
        Self { kind_tag: KIND_PLOT_INPUT_DROPDOWN }
    }
}

impl Transform for OptionInput {
    fn kind_tag(&self) -> &'static str {
        self.kind_tag
    }

    fn default_value(&self, attributes: &Attributes) -> Result<Value, BoardError> {
        first_option(attributes)
    }

    fn validate(&self, attributes: &Attributes, value: &Value) -> Result<(), BoardError> {
        attr_str(attributes, "plot_input")?;
        check_option(attributes, value)
    }

    fn configure(
        &self,
        attributes: &Attributes,
        _panel: PanelContext<'_>,
        table: Table,
        value: &Value,
    ) -> Result<(Table, PanelPatch), BoardError> {
        plot_input(attributes, table, value)
    }
}

/// Numeric selector feeding a render input.
#[derive(Debug, Clone, Copy, Default)]
pub struct SliderInput;

impl Transform for SliderInput {
    fn kind_tag(&self) -> &'static str {
        KIND_PLOT_INPUT_SLIDER
    }

    fn default_value(&self, attributes: &Attributes) -> Result<Value, BoardError> {
        Ok(number_value(Bounds::from_attributes(attributes)?.max))
    }

    fn validate(&self, attributes: &Attributes, value: &Value) -> Result<(), BoardError> {
        attr_str(attributes, "plot_input")?;
        Bounds::from_attributes(attributes)?.check_scalar(value)
    }

    fn configure(
        &self,
        attributes: &Attributes,
        _panel: PanelContext<'_>,
        table: Table,
        value: &Value,
    ) -> Result<(Table, PanelPatch), BoardError> {
        plot_input(attributes, table, value)
    }
}

/// Two-handle selector feeding a render input with `[lo, hi]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeSliderInput;

impl Transform for RangeSliderInput {
    fn kind_tag(&self) -> &'static str {
        KIND_PLOT_INPUT_RANGE_SLIDER
    }

    fn default_value(&self, attributes: &Attributes) -> Result<Value, BoardError> {
        Ok(Bounds::from_attributes(attributes)?.full_range())
    }

    fn validate(&self, attributes: &Attributes, value: &Value) -> Result<(), BoardError> {
        attr_str(attributes, "plot_input")?;
        Bounds::from_attributes(attributes)?.check_pair(value)
    }

    fn configure(
        &self,
        attributes: &Attributes,
        _panel: PanelContext<'_>,
        table: Table,
        value: &Value,
    ) -> Result<(Table, PanelPatch), BoardError> {
        plot_input(attributes, table, value)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn plot_input(attributes: &Attributes, table: Table, value: &Value) -> Result<(Table, PanelPatch), BoardError> {
    let param = attr_str(attributes, "plot_input")?;
    Ok((table, PanelPatch::plot_input(param, value.clone())))
}

fn filter_column<F>(panel: PanelContext<'_>, table: &Table, column: &str, keep: F) -> Result<Table, BoardError>
where
    F: Fn(&Value) -> bool,
{
    table
        .filter_by(column, keep)
        .ok_or_else(|| BoardError::MissingColumn { panel: panel.panel_id.to_owned(), column: column.to_owned() })
}

fn toggle_options(attributes: &Attributes) -> Option<Vec<Value>> {
    if !attr_bool_or(attributes, "toggle_all", true) {
        return None;
    }
    match attr_array(attributes, "data_values") {
        Ok(values) => Some(values.to_vec()),
        Err(_) => None,
    }
}

fn first_option(attributes: &Attributes) -> Result<Value, BoardError> {
    attr_array(attributes, "data_values")?
        .first()
        .cloned()
        .ok_or_else(|| BoardError::config("`data_values` must not be empty"))
}

fn check_option(attributes: &Attributes, value: &Value) -> Result<(), BoardError> {
    let options = attr_array(attributes, "data_values")?;
    if options.iter().any(|option| cell_eq(option, value)) {
        Ok(())
    } else {
        Err(BoardError::config(format!("value {value} is not one of `data_values`")))
    }
}

/// Column holding one item's share of a summed column.
fn part_column(column: &str, item: &Value) -> String {
    match item {
        Value::String(s) => format!("{column}_{s}"),
        other => format!("{column}_{other}"),
    }
}

/// Integral sums stay integers in the output table.
#[allow(clippy::cast_possible_truncation)]
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn as_pair(value: &Value) -> Option<(f64, f64)> {
    match value.as_array().map(Vec::as_slice) {
        Some([lo, hi]) => Some((lo.as_f64()?, hi.as_f64()?)),
        _ => None,
    }
}

/// Configured `[slider_min, slider_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    min: f64,
    max: f64,
}

impl Bounds {
    fn from_attributes(attributes: &Attributes) -> Result<Self, BoardError> {
        let min = attr_f64(attributes, "slider_min")?;
        let max = attr_f64(attributes, "slider_max")?;
        if min > max {
            return Err(BoardError::config(format!("slider_min {min} exceeds slider_max {max}")));
        }
        Ok(Self { min, max })
    }

    fn full_range(self) -> Value {
        Value::Array(vec![number_value(self.min), number_value(self.max)])
    }

    fn contains(self, n: f64) -> bool {
        self.min <= n && n <= self.max
    }

    fn check_scalar(self, value: &Value) -> Result<(), BoardError> {
        match value.as_f64() {
            Some(n) if self.contains(n) => Ok(()),
            _ => Err(BoardError::config(format!(
                "slider value {value} outside [{}, {}]",
                self.min, self.max
            ))),
        }
    }

    fn check_pair(self, value: &Value) -> Result<(), BoardError> {
        match as_pair(value) {
            Some((lo, hi)) if lo <= hi && self.contains(lo) && self.contains(hi) => Ok(()),
            Some(_) => Err(BoardError::config(format!(
                "range {value} outside [{}, {}]",
                self.min, self.max
            ))),
            None => Err(BoardError::config(format!("range value {value} must be a pair of numbers"))),
        }
    }
}

/// Resolved filter range; `None` is an open end.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    lo: Option<f64>,
    hi: Option<f64>,
}

impl Range {
    fn resolve(attributes: &Attributes, value: &Value, kind_tag: &str) -> Result<Self, BoardError> {
        let (lo, hi) =
            as_pair(value).ok_or_else(|| BoardError::invalid_value(kind_tag, "expected a pair of numbers"))?;
        if !attr_bool_or(attributes, "edges_infinite", false) {
            return Ok(Self { lo: Some(lo), hi: Some(hi) });
        }
        let bounds = Bounds::from_attributes(attributes)?;
        Ok(Self {
            lo: (lo > bounds.min).then_some(lo),
            hi: (hi < bounds.max).then_some(hi),
        })
    }

    fn contains(self, cell: &Value) -> bool {
        let Some(n) = cell.as_f64() else {
            return false;
        };
        self.lo.is_none_or(|lo| lo <= n) && self.hi.is_none_or(|hi| n <= hi)
    }
}
