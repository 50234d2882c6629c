use surfcore::{
    base::{
        addressable::Addressable,
        api::{ConfigSource, SurfaceCreateInfo, create_context},
        inspectable::EntitySnapshot,
        url::UrlContext,
    },
    tests_utils::{MemoryServer, server_entity, widget},
};
use surfprop::{ContainerDefinition, PropertyType, SingleDefinition, SnapshotMode, Value};

fn definition() -> ContainerDefinition {
    ContainerDefinition::new("out")
        .child("x", SingleDefinition::new("x", PropertyType::Float, 0.0))
        .child("y", SingleDefinition::new("y", PropertyType::Float, 0.0))
}

#[test]
fn context_from_toml_file() {
    let dir = std::env::temp_dir().join(format!("surfcore-ctx-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("engine.toml");
    std::fs::write(&path, "default_server = \"mixer\"\nformula_marker = \"$\"\n").unwrap();

    let ctx = create_context(&SurfaceCreateInfo {
        config: ConfigSource::File(path),
        url: UrlContext::from_url("/?bank=2"),
    })
    .unwrap();
    std::fs::remove_dir_all(&dir).unwrap();
    assert_eq!(ctx.config.default_server.as_deref(), Some("mixer"));

    let server = MemoryServer::new();
    server.add_node("/gain", "f", vec![Value::Float(0.5)]);
    let _mixer = server_entity(&ctx, "Mixer", "mixer", server.clone());
    let out = widget(&ctx, "Out", "", definition());
    let x = out.property("x").unwrap();

    x.set_formula("$osc('/gain') * url('query.bank')");
    assert_eq!(x.get(), Value::Float(1.0));
    ctx.run_pending();
    assert_eq!(server.listener_count("/gain"), 1);
}

#[test]
fn entity_snapshot_survives_json() {
    let ctx = surfcore::tests_utils::context();
    let dev = widget(&ctx, "Device", "dev", definition());
    dev.property("x").unwrap().set(3.0);
    let out = widget(&ctx, "Out", "", definition());
    out.property("y").unwrap().set_formula("=prop('dev:x') * 2");

    let json = serde_json::to_string(&out.to_snapshot()).unwrap();
    let snapshot: EntitySnapshot = serde_json::from_str(&json).unwrap();

    let copy = widget(&ctx, "Copy", "", definition());
    assert!(copy.apply_snapshot(&snapshot, SnapshotMode::Replace).is_empty());
    assert_eq!(copy.name(), "Out");
    assert_eq!(copy.property("y").unwrap().get(), Value::Float(6.0));
    assert_eq!(copy.to_snapshot(), out.to_snapshot());
}
