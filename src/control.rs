//! Controls, the transform contract, and the kind-tag registry.
//!
//! DESIGN
//! ======
//! A [`ControlPlugin`] is plain data: an id, a header, an immutable
//! [`ControlDescriptor`] and the live value. Behavior lives in a
//! [`Transform`] implementation looked up by the descriptor's kind tag in a
//! [`TransformRegistry`] populated before any state is replayed. Because the
//! shared data state carries only `(kind_tag, attributes, value)`, any panel
//! can replay a global control without a reference to the control itself.
//!
//! ERROR HANDLING
//! ==============
//! An unknown kind tag is fatal ([`BoardError::UnknownControlKind`]): tags in
//! shared state are produced by this crate, so a miss means the registry and
//! the board disagree. Attribute and default-value problems are reported by
//! [`Transform::validate`] while the board is being built.

#[cfg(test)]
#[path = "control_test.rs"]
mod control_test;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use datastate::{Attributes, ControlDescriptor, ControlEntry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::BoardError;
use crate::patch::PanelPatch;
use crate::table::Table;

/// Identifier of a control.
pub type ControlId = String;

/// Read-only view of the panel a transform is running for.
#[derive(Debug, Clone, Copy)]
pub struct PanelContext<'a> {
    pub panel_id: &'a str,
    /// The panel's base render inputs, before any patch.
    pub render_inputs: &'a Map<String, Value>,
}

/// Pure per-kind transform: `(attributes, panel, table, value) -> (table, patch)`.
pub trait Transform: Send + Sync {
    /// Kind tag this implementation is registered under.
    fn kind_tag(&self) -> &'static str;

    /// Value a control of this kind starts with when none is declared.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Configuration`] when required attributes are missing.
    fn default_value(&self, attributes: &Attributes) -> Result<Value, BoardError>;

    /// Check attributes and the starting value at construction time.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Configuration`] for malformed attributes or a
    /// starting value the control could never produce.
    fn validate(&self, attributes: &Attributes, value: &Value) -> Result<(), BoardError>;

    /// Columns the transform reads; checked against every panel the control
    /// can reach.
    fn required_columns(&self, _attributes: &Attributes) -> Vec<String> {
        Vec::new()
    }

    /// Full option list for checklist kinds that support select-all/none.
    fn toggle_options(&self, _attributes: &Attributes) -> Option<Vec<Value>> {
        None
    }

    /// Apply the control to a table.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::MissingColumn`] or
    /// [`BoardError::InvalidControlValue`] when the inputs cannot be applied.
    fn configure(
        &self,
        attributes: &Attributes,
        panel: PanelContext<'_>,
        table: Table,
        value: &Value,
    ) -> Result<(Table, PanelPatch), BoardError>;
}

/// Static mapping from kind tag to transform implementation.
#[derive(Clone)]
pub struct TransformRegistry {
    transforms: HashMap<&'static str, Arc<dyn Transform>>,
}

impl TransformRegistry {
    /// A registry with no kinds registered.
    #[must_use]
    pub fn empty() -> Self {
        Self { transforms: HashMap::new() }
    }

    /// A registry holding every built-in control kind.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for transform in crate::plugins::builtins() {
            registry.transforms.insert(transform.kind_tag(), transform);
        }
        registry
    }

    /// Add a kind.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Configuration`] if the tag is already taken.
    pub fn register(&mut self, transform: Arc<dyn Transform>) -> Result<(), BoardError> {
        let tag = transform.kind_tag();
        if self.transforms.contains_key(tag) {
            return Err(BoardError::config(format!("control kind `{tag}` registered twice")));
        }
        self.transforms.insert(tag, transform);
        Ok(())
    }

    /// Look up the transform for a kind tag.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::UnknownControlKind`] for unregistered tags.
    pub fn resolve(&self, kind_tag: &str) -> Result<&dyn Transform, BoardError> {
        self.transforms
            .get(kind_tag)
            .map(AsRef::as_ref)
            .ok_or_else(|| BoardError::UnknownControlKind(kind_tag.to_owned()))
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn kind_tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<&'static str> = self.transforms.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("kinds", &self.kind_tags())
            .finish()
    }
}

/// Select-all / select-none affordance of a checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleButton {
    All,
    None,
}

/// Resolve a toggle click to the checklist's next value. No click (the
/// initial mount) resolves to `None`, meaning "leave the value alone".
#[must_use]
pub fn resolve_toggle(options: &[Value], button: Option<ToggleButton>) -> Option<Value> {
    match button? {
        ToggleButton::All => Some(Value::Array(options.to_vec())),
        ToggleButton::None => Some(Value::Array(Vec::new())),
    }
}

/// A user-facing control: descriptor plus live value.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPlugin {
    id: ControlId,
    header: String,
    descriptor: ControlDescriptor,
    value: Option<Value>,
}

impl ControlPlugin {
    /// A control with a generated id and no declared value.
    #[must_use]
    pub fn new(kind_tag: &str, attributes: Attributes) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            header: String::new(),
            descriptor: ControlDescriptor::new(kind_tag, attributes),
            value: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<ControlId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
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
    pub fn kind_tag(&self) -> &str {
        &self.descriptor.kind_tag
    }

    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.descriptor.attributes
    }

    /// Current value; `None` only before the board has prepared the control.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Descriptor without the live value, for storage in shared state.
    #[must_use]
    pub fn serialize(&self) -> ControlDescriptor {
        self.descriptor.clone()
    }

    /// Descriptor paired with the live value (null before preparation).
    #[must_use]
    pub fn entry(&self) -> ControlEntry {
        self.descriptor
            .with_value(self.value.clone().unwrap_or(Value::Null))
    }

    /// Validate `value` against the kind and store it. A rejected value
    /// leaves the current one in place.
    pub(crate) fn set_value(&mut self, value: Value, registry: &TransformRegistry) -> Result<(), BoardError> {
        let transform = registry.resolve(self.kind_tag())?;
        transform.validate(self.attributes(), &value).map_err(|err| match err {
            BoardError::Configuration(reason) => BoardError::invalid_value(self.kind_tag(), reason),
            other => other,
        })?;
        self.value = Some(value);
        Ok(())
    }

    /// Resolve the kind, fill in the default value, and validate.
    pub(crate) fn prepare(&mut self, registry: &TransformRegistry) -> Result<(), BoardError> {
        let transform = registry.resolve(self.kind_tag())?;
        let value = match self.value.take() {
            Some(value) => value,
            None => transform.default_value(self.attributes())?,
        };
        transform
            .validate(self.attributes(), &value)
            .map_err(|err| match err {
                BoardError::Configuration(msg) => {
                    BoardError::Configuration(format!("control `{}`: {msg}", self.id))
                }
                other => other,
            })?;
        self.value = Some(value);
        Ok(())
    }
}

// =============================================================================
// ATTRIBUTE ACCESS
// =============================================================================

pub(crate) fn attr<'a>(attributes: &'a Attributes, key: &str) -> Result<&'a Value, BoardError> {
    attributes
        .get(key)
        .ok_or_else(|| BoardError::config(format!("missing attribute `{key}`")))
}

pub(crate) fn attr_str<'a>(attributes: &'a Attributes, key: &str) -> Result<&'a str, BoardError> {
    attr(attributes, key)?
        .as_str()
        .ok_or_else(|| BoardError::config(format!("attribute `{key}` must be a string")))
}

pub(crate) fn attr_f64(attributes: &Attributes, key: &str) -> Result<f64, BoardError> {
    attr(attributes, key)?
        .as_f64()
        .ok_or_else(|| BoardError::config(format!("attribute `{key}` must be a number")))
}

pub(crate) fn attr_array<'a>(attributes: &'a Attributes, key: &str) -> Result<&'a [Value], BoardError> {
    attr(attributes, key)?
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| BoardError::config(format!("attribute `{key}` must be a list")))
}

pub(crate) fn attr_bool_or(attributes: &Attributes, key: &str, default: bool) -> bool {
    attributes.get(key).and_then(Value::as_bool).unwrap_or(default)
}
