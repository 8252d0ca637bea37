use serde_json::json;

use super::*;

fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().unwrap_or_default()
}

struct Noop;

impl Transform for Noop {
    fn kind_tag(&self) -> &'static str {
        "test:noop"
    }

    fn default_value(&self, _attributes: &Attributes) -> Result<Value, BoardError> {
        Ok(json!(0))
    }

    fn validate(&self, _attributes: &Attributes, value: &Value) -> Result<(), BoardError> {
        if value.is_number() { Ok(()) } else { Err(BoardError::config("not a number")) }
    }

    fn configure(
        &self,
        _attributes: &Attributes,
        _panel: PanelContext<'_>,
        table: Table,
        _value: &Value,
    ) -> Result<(Table, PanelPatch), BoardError> {
        Ok((table, PanelPatch::new()))
    }
}

#[test]
fn builtin_registry_knows_every_kind() {
    let registry = TransformRegistry::with_builtins();
    assert_eq!(registry.kind_tags().len(), 10);
    assert!(registry.resolve("filter:checklist").is_ok());
    assert!(registry.resolve("plot_input:range_slider").is_ok());
}

#[test]
fn unknown_kind_is_rejected() {
    let registry = TransformRegistry::with_builtins();
    let err = registry.resolve("filter:telepathy").err().expect("unknown");
    assert!(matches!(err, BoardError::UnknownControlKind(tag) if tag == "filter:telepathy"));
}

#[test]
fn register_adds_kind_and_rejects_duplicates() {
    let mut registry = TransformRegistry::empty();
    registry.register(Arc::new(Noop)).expect("register");
    assert_eq!(registry.kind_tags(), vec!["test:noop"]);
    let err = registry.register(Arc::new(Noop)).expect_err("duplicate");
    assert!(matches!(err, BoardError::Configuration(_)));
}

#[test]
fn registry_debug_lists_kinds() {
    let mut registry = TransformRegistry::empty();
    registry.register(Arc::new(Noop)).expect("register");
    assert!(format!("{registry:?}").contains("test:noop"));
}

#[test]
fn control_gets_generated_id_and_serializes_without_value() {
    let control = ControlPlugin::new("filter:radio", attrs(json!({"data_col": "cat"}))).with_value(json!("A"));
    assert!(!control.id().is_empty());
    let descriptor = control.serialize();
    assert_eq!(descriptor.kind_tag, "filter:radio");
    assert_eq!(descriptor.attributes.get("data_col"), Some(&json!("cat")));
    assert_eq!(control.entry().value, json!("A"));
}

#[test]
fn two_controls_get_distinct_ids() {
    let a = ControlPlugin::new("test:noop", Attributes::new());
    let b = ControlPlugin::new("test:noop", Attributes::new());
    assert_ne!(a.id(), b.id());
}

#[test]
fn prepare_fills_default_value() {
    let mut registry = TransformRegistry::empty();
    registry.register(Arc::new(Noop)).expect("register");
    let mut control = ControlPlugin::new("test:noop", Attributes::new()).with_id("n");
    assert!(control.value().is_none());
    control.prepare(&registry).expect("prepare");
    assert_eq!(control.value(), Some(&json!(0)));
}

#[test]
fn prepare_keeps_declared_value_and_validates_it() {
    let mut registry = TransformRegistry::empty();
    registry.register(Arc::new(Noop)).expect("register");
    let mut control = ControlPlugin::new("test:noop", Attributes::new()).with_id("n").with_value(json!("x"));
    let err = control.prepare(&registry).expect_err("invalid");
    assert!(matches!(&err, BoardError::Configuration(msg) if msg.contains("control `n`")));
}

#[test]
fn prepare_rejects_unknown_kind() {
    let mut control = ControlPlugin::new("nope", Attributes::new());
    let err = control.prepare(&TransformRegistry::empty()).expect_err("unknown");
    assert!(matches!(err, BoardError::UnknownControlKind(_)));
}

#[test]
fn toggle_resolves_all_none_and_initial_mount() {
    let options = vec![json!("A"), json!("B")];
    assert_eq!(resolve_toggle(&options, Some(ToggleButton::All)), Some(json!(["A", "B"])));
    assert_eq!(resolve_toggle(&options, Some(ToggleButton::None)), Some(json!([])));
    assert_eq!(resolve_toggle(&options, None), None);
}

#[test]
fn toggle_button_deserializes_lowercase() {
    let button: Option<ToggleButton> = serde_json::from_value(json!("all")).expect("button");
    assert_eq!(button, Some(ToggleButton::All));
    let button: Option<ToggleButton> = serde_json::from_value(Value::Null).expect("button");
    assert_eq!(button, None);
}

#[test]
fn attribute_helpers_report_missing_and_mistyped() {
    let a = attrs(json!({"s": "x", "n": 3, "l": [1], "b": false}));
    assert_eq!(attr_str(&a, "s").expect("str"), "x");
    assert!((attr_f64(&a, "n").expect("num") - 3.0).abs() < f64::EPSILON);
    assert_eq!(attr_array(&a, "l").expect("list").len(), 1);
    assert!(!attr_bool_or(&a, "b", true));
    assert!(attr_bool_or(&a, "missing", true));
    assert!(attr_str(&a, "n").is_err());
    assert!(attr(&a, "missing").is_err());
}
