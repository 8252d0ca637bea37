//! Tabular data model shared by every transform.
//!
//! A [`Table`] is an ordered set of named, equal-length columns of JSON cells
//! plus one stable [`RowId`] per row. Row ids are assigned by position when a
//! source is loaded and survive every filter, so a selection made against one
//! panel's filtered table still names the same rows in another panel.

#[cfg(test)]
#[path = "table_test.rs"]
mod table_test;

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::BoardError;

/// Stable, position-derived row identifier.
pub type RowId = u64;

/// One record keyed by column name.
pub type Record = Map<String, Value>;

/// A named column of cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// Ordered columns of equal length with unique row ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    ids: Vec<RowId>,
    columns: Vec<Column>,
}

impl Table {
    /// Build a table from named columns, assigning ids `0..len`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Configuration`] for unequal column lengths or
    /// duplicate column names.
    pub fn from_columns<N>(columns: Vec<(N, Vec<Value>)>) -> Result<Self, BoardError>
    where
        N: Into<String>,
    {
        let columns: Vec<Column> = columns
            .into_iter()
            .map(|(name, values)| Column { name: name.into(), values })
            .collect();
        let len = columns.first().map_or(0, |c| c.values.len());
        let ids = (0..len as u64).collect();
        Self::with_ids(ids, columns)
    }

    /// Build a table with explicit row ids.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Configuration`] when any column length differs
    /// from the id count, ids repeat, or column names repeat.
    pub fn with_ids(ids: Vec<RowId>, columns: Vec<Column>) -> Result<Self, BoardError> {
        let mut names = HashSet::new();
        for column in &columns {
            if column.values.len() != ids.len() {
                return Err(BoardError::config(format!(
                    "column `{}` has {} rows, expected {}",
                    column.name,
                    column.values.len(),
                    ids.len()
                )));
            }
            if !names.insert(column.name.as_str()) {
                return Err(BoardError::config(format!("duplicate column `{}`", column.name)));
            }
        }
        let unique: HashSet<&RowId> = ids.iter().collect();
        if unique.len() != ids.len() {
            return Err(BoardError::config("row ids must be unique"));
        }
        Ok(Self { ids, columns })
    }

    /// Build a table from records. Columns appear in first-seen key order and
    /// keys absent from a record read as null.
    ///
    /// # Errors
    ///
    /// Never fails for well-formed records; the signature matches the other
    /// constructors.
    pub fn from_records(records: &[Record]) -> Result<Self, BoardError> {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }
        let columns = names
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|r| r.get(&name).cloned().unwrap_or(Value::Null))
                    .collect();
                (name, values)
            })
            .collect();
        Self::from_columns(columns)
    }

    /// An empty table with the same column names as `self`.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self {
            ids: Vec::new(),
            columns: self
                .columns
                .iter()
                .map(|c| Column { name: c.name.clone(), values: Vec::new() })
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> &[RowId] {
        &self.ids
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Cells of one column, in row order.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Rows as records, in row order.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        (0..self.len())
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[row].clone()))
                    .collect()
            })
            .collect()
    }

    /// Keep the rows whose cell in `column` satisfies `keep`. Returns `None`
    /// when the column does not exist.
    #[must_use]
    pub fn filter_by<F>(&self, column: &str, keep: F) -> Option<Self>
    where
        F: Fn(&Value) -> bool,
    {
        let cells = self.column(column)?;
        let mask: Vec<bool> = cells.iter().map(keep).collect();
        Some(self.retain_mask(&mask))
    }

    /// Keep the rows whose id is in `ids`, in this table's order. Ids absent
    /// from the table are ignored.
    #[must_use]
    pub fn select_ids(&self, ids: &[RowId]) -> Self {
        let wanted: HashSet<RowId> = ids.iter().copied().collect();
        let mask: Vec<bool> = self.ids.iter().map(|id| wanted.contains(id)).collect();
        self.retain_mask(&mask)
    }

    /// Replace the named column, or append it when absent.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Configuration`] when `values` does not have one
    /// cell per row.
    pub fn with_column(mut self, name: &str, values: Vec<Value>) -> Result<Self, BoardError> {
        if values.len() != self.len() {
            return Err(BoardError::config(format!(
                "column `{name}` has {} rows, expected {}",
                values.len(),
                self.len()
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => column.values = values,
            None => self.columns.push(Column { name: name.to_owned(), values }),
        }
        Ok(self)
    }

    fn retain_mask(&self, mask: &[bool]) -> Self {
        let ids = self
            .ids
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(id, _)| *id)
            .collect();
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: c
                    .values
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(v, _)| v.clone())
                    .collect(),
            })
            .collect();
        Self { ids, columns }
    }
}

/// Cell equality where numbers compare by value, so `2000` equals `2000.0`.
#[must_use]
pub fn cell_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON * x.abs().max(1.0),
            _ => x == y,
        },
        _ => a == b,
    }
}
