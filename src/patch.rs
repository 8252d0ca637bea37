//! Panel patches: the side channel controls use to change panel behavior.
//!
//! A control never mutates its panel. It returns a sparse [`PanelPatch`]
//! alongside the transformed table, and the panel folds the patches of its
//! controls left to right with [`merge`]. Keys holding a map in both patches
//! merge one level deep; every other key is taken from the later patch.

#[cfg(test)]
#[path = "patch_test.rs"]
mod patch_test;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::consts::PLOT_INPUTS_KEY;

/// Sparse override of panel attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelPatch(Map<String, Value>);

impl PanelPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `{"plot_inputs": {param: value}}`.
    #[must_use]
    pub fn plot_input(param: &str, value: Value) -> Self {
        let mut inputs = Map::new();
        inputs.insert(param.to_owned(), value);
        let mut patch = Map::new();
        patch.insert(PLOT_INPUTS_KEY.to_owned(), Value::Object(inputs));
        Self(patch)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render-input overrides carried under `plot_inputs`, if any.
    #[must_use]
    pub fn plot_inputs(&self) -> Option<&Map<String, Value>> {
        self.0.get(PLOT_INPUTS_KEY).and_then(Value::as_object)
    }

    /// Apply `plot_inputs` key-wise over `base`. Without overrides the base
    /// map is returned unchanged.
    #[must_use]
    pub fn resolve_inputs(&self, base: &Map<String, Value>) -> Map<String, Value> {
        let mut resolved = base.clone();
        if let Some(overrides) = self.plot_inputs() {
            for (k, v) in overrides {
                resolved.insert(k.clone(), v.clone());
            }
        }
        resolved
    }
}

impl From<Map<String, Value>> for PanelPatch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Merge two patches; `later` wins at the leaf level.
#[must_use]
pub fn merge(earlier: &PanelPatch, later: &PanelPatch) -> PanelPatch {
    let mut out = earlier.0.clone();
    for (key, incoming) in &later.0 {
        match (out.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                for (k, v) in nested {
                    existing.insert(k.clone(), v.clone());
                }
            }
            _ => {
                out.insert(key.clone(), incoming.clone());
            }
        }
    }
    PanelPatch(out)
}

/// Fold patches left to right in control order.
#[must_use]
pub fn merge_all<'a, I>(patches: I) -> PanelPatch
where
    I: IntoIterator<Item = &'a PanelPatch>,
{
    patches
        .into_iter()
        .fold(PanelPatch::new(), |acc, p| merge(&acc, p))
}
