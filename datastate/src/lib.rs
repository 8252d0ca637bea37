//! Shared data-state model and codecs for the board's global recompute input.
//!
//! This crate owns the only structure that crosses the panel boundary: the
//! [`DataState`] snapshot published by the board orchestrator and replayed by
//! every mounted panel. It deliberately carries plain data (kind tags, JSON
//! attributes, JSON values) and never a live control reference, so a snapshot
//! can be replayed after the control that produced it has been swapped out by
//! a navigation change.
//!
//! Two encodings are provided: the plain JSON shape (global controls as
//! `[kindTag, attributes, value]` triples) and a compact protobuf encoding
//! that carries attributes and values as `google.protobuf.Struct`/`Value`.

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open-ended control configuration, keyed by attribute name.
pub type Attributes = Map<String, Value>;

/// Error returned by the decoding helpers.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireDataState`.
    #[error("failed to decode protobuf data state: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The JSON value does not have the data-state shape.
    #[error("invalid data state JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Immutable, serializable record of a control's kind and configuration.
///
/// Never carries the control's live value; pair it with a value through
/// [`ControlDescriptor::with_value`] when publishing into a [`DataState`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDescriptor {
    /// Stable identifier of the control implementation, e.g. `"filter:checklist"`.
    pub kind_tag: String,
    /// Configuration consumed by the implementation's transform.
    pub attributes: Attributes,
}

impl ControlDescriptor {
    #[must_use]
    pub fn new(kind_tag: impl Into<String>, attributes: Attributes) -> Self {
        Self { kind_tag: kind_tag.into(), attributes }
    }

    /// Pair this descriptor with a live value for publication.
    #[must_use]
    pub fn with_value(&self, value: Value) -> ControlEntry {
        ControlEntry {
            kind_tag: self.kind_tag.clone(),
            attributes: self.attributes.clone(),
            value,
        }
    }
}

/// One global control as published in a [`DataState`].
///
/// Serializes as the triple `[kindTag, attributes, value]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, Attributes, Value)", into = "(String, Attributes, Value)")]
pub struct ControlEntry {
    pub kind_tag: String,
    pub attributes: Attributes,
    pub value: Value,
}

impl From<(String, Attributes, Value)> for ControlEntry {
    fn from((kind_tag, attributes, value): (String, Attributes, Value)) -> Self {
        Self { kind_tag, attributes, value }
    }
}

impl From<ControlEntry> for (String, Attributes, Value) {
    fn from(entry: ControlEntry) -> Self {
        (entry.kind_tag, entry.attributes, entry.value)
    }
}

/// Canonical snapshot of navigation plus the active global controls.
///
/// Replaced wholesale on every navigation or global-control change; never
/// mutated in place once published.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataState {
    /// Key of the active navigation context (tab label), empty without tabs.
    pub active_context: String,
    /// Active global controls in sidebar order.
    pub global_controls: Vec<ControlEntry>,
}

impl DataState {
    #[must_use]
    pub fn new(active_context: impl Into<String>, global_controls: Vec<ControlEntry>) -> Self {
        Self { active_context: active_context.into(), global_controls }
    }
}

/// Convert a snapshot into its plain JSON shape.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails, which only happens
/// for non-string map keys and cannot occur for well-formed snapshots.
pub fn to_json(state: &DataState) -> Result<Value, CodecError> {
    Ok(serde_json::to_value(state)?)
}

/// Parse a snapshot from its plain JSON shape.
///
/// # Errors
///
/// Returns [`CodecError::Json`] when the value is not a data-state object.
pub fn from_json(value: Value) -> Result<DataState, CodecError> {
    Ok(serde_json::from_value(value)?)
}

/// Encode a snapshot into protobuf bytes.
#[must_use]
pub fn encode_state(state: &DataState) -> Vec<u8> {
    let wire = state_to_wire(state);

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec cannot run out of buffer space.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into a snapshot.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes.
pub fn decode_state(bytes: &[u8]) -> Result<DataState, CodecError> {
    let wire = WireDataState::decode(bytes)?;
    Ok(wire_to_state(wire))
}

fn state_to_wire(state: &DataState) -> WireDataState {
    WireDataState {
        active_context: state.active_context.clone(),
        global_controls: state
            .global_controls
            .iter()
            .map(|entry| WireControlEntry {
                kind_tag: entry.kind_tag.clone(),
                attributes: Some(map_to_proto_struct(&entry.attributes)),
                value: Some(json_to_proto_value(&entry.value)),
            })
            .collect(),
    }
}

fn wire_to_state(wire: WireDataState) -> DataState {
    DataState {
        active_context: wire.active_context,
        global_controls: wire
            .global_controls
            .into_iter()
            .map(|entry| ControlEntry {
                kind_tag: entry.kind_tag,
                attributes: entry
                    .attributes
                    .map_or_else(Map::new, |s| proto_struct_to_map(&s)),
                value: entry.value.map_or(Value::Null, |v| proto_to_json_value(&v)),
            })
            .collect(),
    }
}

fn map_to_proto_struct(map: &Attributes) -> prost_types::Struct {
    prost_types::Struct {
        fields: map
            .iter()
            .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
            .collect(),
    }
}

fn proto_struct_to_map(value: &prost_types::Struct) -> Attributes {
    value
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
        .collect()
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => {
            prost_types::value::Kind::NullValue(prost_types::NullValue::NullValue as i32)
        }
        Value::Bool(v) => prost_types::value::Kind::BoolValue(*v),
        Value::Number(v) => prost_types::value::Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => prost_types::value::Kind::StringValue(v.clone()),
        Value::Array(v) => prost_types::value::Kind::ListValue(prost_types::ListValue {
            values: v.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(v) => prost_types::value::Kind::StructValue(map_to_proto_struct(v)),
    };

    prost_types::Value { kind: Some(kind) }
}

fn proto_to_json_value(value: &prost_types::Value) -> Value {
    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        prost_types::value::Kind::NullValue(_) => Value::Null,
        prost_types::value::Kind::NumberValue(v) => number_to_json(*v),
        prost_types::value::Kind::StringValue(v) => Value::String(v.clone()),
        prost_types::value::Kind::BoolValue(v) => Value::Bool(*v),
        prost_types::value::Kind::StructValue(v) => Value::Object(proto_struct_to_map(v)),
        prost_types::value::Kind::ListValue(v) => {
            Value::Array(v.values.iter().map(proto_to_json_value).collect())
        }
    }
}

/// Protobuf carries every number as a double; integral values come back as
/// JSON integers so slider bounds compare equal after a round trip.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number_to_json(v: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if v.is_finite() && v.fract() == 0.0 && v.abs() <= MAX_EXACT {
        Value::from(v as i64)
    } else {
        serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
    }
}

#[derive(Clone, PartialEq, Message)]
struct WireDataState {
    #[prost(string, tag = "1")]
    active_context: String,
    #[prost(message, repeated, tag = "2")]
    global_controls: Vec<WireControlEntry>,
}

#[derive(Clone, PartialEq, Message)]
struct WireControlEntry {
    #[prost(string, tag = "1")]
    kind_tag: String,
    #[prost(message, optional, tag = "2")]
    attributes: Option<prost_types::Struct>,
    #[prost(message, optional, tag = "3")]
    value: Option<prost_types::Value>,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
