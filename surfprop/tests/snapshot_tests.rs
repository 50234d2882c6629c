use std::sync::Arc;

use surfprop::{
    Color, ContainerDefinition, ContainerSnapshot, NodeSnapshot, Property, PropertyContainer,
    PropertySnapshot, PropertyType, SingleDefinition, SnapshotMode, Value, ValueMode,
};

fn fader_definition() -> ContainerDefinition {
    ContainerDefinition::new("fader")
        .child("value", SingleDefinition::new("Value", PropertyType::Float, 0.0).range(0.0, 1.0, None))
        .child("label", SingleDefinition::new("Label", PropertyType::String, ""))
        .child(
            "colors",
            ContainerDefinition::new("Colors")
                .child("fill", SingleDefinition::new("Fill", PropertyType::Color, "#3080ff"))
                .child(
                    "outline",
                    SingleDefinition::new("Outline", PropertyType::Color, "#000")
                        .can_disable(true),
                ),
        )
}

fn build() -> Arc<PropertyContainer> {
    PropertyContainer::build(Arc::new(fader_definition()), "", &mut |_: &str, _: &Arc<Property>| {})
}

fn observable(prop: &Property) -> (Value, Option<bool>, Option<ValueMode>, Option<String>) {
    (prop.get_raw(), prop.enabled(), prop.mode(), prop.expression())
}

#[test]
fn leaf_snapshot_is_idempotent_for_varied_states() {
    let states: Vec<PropertySnapshot> = vec![
        PropertySnapshot::default(),
        PropertySnapshot {
            value: Value::Float(0.25),
            enabled: Some(false),
            ..Default::default()
        },
        PropertySnapshot {
            value: Value::Float(0.75),
            mode: Some(ValueMode::Expression),
            expression: Some("=osc('/gain')".into()),
            ..Default::default()
        },
        PropertySnapshot {
            value: Value::Float(1.0),
            mode: Some(ValueMode::Value),
            expression: Some("=1".into()),
            enabled: Some(true),
        },
    ];

    for state in states {
        let prop = Property::new(Arc::new(
            SingleDefinition::new("gain", PropertyType::Float, 0.5),
        ));
        prop.apply_snapshot(&state);
        let before = observable(&prop);
        let snap = prop.to_snapshot().expect("non-disableable leaves always snapshot");
        prop.apply_snapshot(&snap);
        assert_eq!(observable(&prop), before);
    }
}

#[test]
fn untouched_disableable_leaf_is_absent() {
    let root = build();
    let outline = root.property("colors.outline").unwrap();
    assert_eq!(outline.to_snapshot(), None);
    assert!(!outline.is_enabled());

    outline.set(Color::WHITE);
    assert!(outline.to_snapshot().is_some());
}

#[test]
fn tree_snapshot_survives_json() {
    let root = build();
    root.property("value").unwrap().set(0.4);
    root.property("label").unwrap().set("Master");
    let outline = root.property("colors.outline").unwrap();
    outline.set_enabled(Some(true));
    outline.set("#ff0000");

    let snap = root.to_snapshot().unwrap();
    let json = serde_json::to_string(&snap).unwrap();
    let back: ContainerSnapshot = serde_json::from_str(&json).unwrap();

    let fresh = build();
    assert!(fresh.apply_snapshot(&back, SnapshotMode::Replace, "").is_empty());
    assert_eq!(fresh.to_snapshot(), root.to_snapshot());
    assert_eq!(
        fresh.property("colors.outline").unwrap().get(),
        Value::Color(Color::rgba(255, 0, 0, 255))
    );
}

#[test]
fn json_shapes_pick_the_right_node_kind() {
    let leaf: NodeSnapshot = serde_json::from_str(r#"{"value": 3, "mode": "expression", "expression": "=1+2"}"#).unwrap();
    assert!(leaf.is_property());

    let group: NodeSnapshot =
        serde_json::from_str(r#"{"collapsed": true, "children": {"x": {"value": 1}}}"#).unwrap();
    assert!(group.is_container());

    let skipped = serde_json::to_value(PropertySnapshot::default()).unwrap();
    assert_eq!(skipped, serde_json::json!({"value": null}));
}

#[test]
fn clamped_values_stay_in_range() {
    let root = build();
    let value = root.property("value").unwrap();
    value.set(4.0);
    assert_eq!(value.get_raw(), Value::Float(1.0));
    value.set("-2");
    assert_eq!(value.get_raw(), Value::Float(0.0));
}
