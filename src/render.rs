//! Render collaborators.
//!
//! The engine calls [`Render::render`] once per recompute, after phase 2,
//! with the final table and the resolved render inputs. What the artifact
//! looks like is up to the collaborator; the built-ins emit JSON documents a
//! front end can draw directly.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::table::Table;

/// Rendered output of a panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifact(pub Value);

impl Artifact {
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Turns a table and resolved inputs into an artifact.
pub trait Render: Send + Sync {
    fn render(&self, table: &Table, inputs: &Map<String, Value>) -> Artifact;
}

/// Data-table artifact: `{"columns": [{"id", "name"}], "data": [record...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordsRenderer {
    /// Add each row's stable id under `_id`.
    pub include_ids: bool,
}

impl Render for RecordsRenderer {
    fn render(&self, table: &Table, _inputs: &Map<String, Value>) -> Artifact {
        let columns: Vec<Value> = table
            .column_names()
            .into_iter()
            .map(|name| json!({"id": name, "name": name}))
            .collect();
        let data: Vec<Value> = table
            .records()
            .into_iter()
            .zip(table.ids())
            .map(|(mut record, id)| {
                if self.include_ids {
                    record.insert("_id".to_owned(), Value::from(*id));
                }
                Value::Object(record)
            })
            .collect();
        Artifact(json!({"columns": columns, "data": data}))
    }
}

/// Chart artifact: `{"kind", "x", "y", "inputs", "points"}`.
///
/// `x` and `y` hold the values of the columns named by the `x` and `y`
/// render inputs (null when unset or absent from the table); `points` holds
/// the row ids so interaction events can refer back to rows.
#[derive(Debug, Clone)]
pub struct FigureRenderer {
    pub kind: String,
}

impl FigureRenderer {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    fn axis(table: &Table, inputs: &Map<String, Value>, key: &str) -> Value {
        inputs
            .get(key)
            .and_then(Value::as_str)
            .and_then(|column| table.column(column))
            .map_or(Value::Null, |cells| Value::Array(cells.to_vec()))
    }
}

impl Render for FigureRenderer {
    fn render(&self, table: &Table, inputs: &Map<String, Value>) -> Artifact {
        Artifact(json!({
            "kind": self.kind,
            "x": Self::axis(table, inputs, "x"),
            "y": Self::axis(table, inputs, "y"),
            "inputs": inputs,
            "points": table.ids(),
        }))
    }
}

/// Adapts a closure into a renderer.
pub struct FnRenderer<F>(pub F);

impl<F> Render for FnRenderer<F>
where
    F: Fn(&Table, &Map<String, Value>) -> Artifact + Send + Sync,
{
    fn render(&self, table: &Table, inputs: &Map<String, Value>) -> Artifact {
        (self.0)(table, inputs)
    }
}

impl<F> fmt::Debug for FnRenderer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnRenderer")
    }
}
