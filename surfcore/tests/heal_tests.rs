use surfcore::{
    base::{SurfaceContext, addressable::Addressable, meta::EngineConfig},
    tests_utils::{MemoryServer, server_entity, set_user_id, widget},
};
use surfprop::{ContainerDefinition, PropertyType, SingleDefinition, Value};

fn level_definition() -> ContainerDefinition {
    ContainerDefinition::new("meter")
        .child("level", SingleDefinition::new("level", PropertyType::Float, 0.0))
}

#[test]
fn renamed_server_is_recovered_and_text_rewritten() {
    let ctx = SurfaceContext::with_defaults();
    let server = MemoryServer::new();
    server.add_node("/x", "f", vec![Value::Float(0.5)]);
    let srv1 = server_entity(&ctx, "Server 1", "devA", server.clone());
    let meter = widget(&ctx, "Meter", "", level_definition());
    let level = meter.property("level").unwrap();

    level.set_formula("=osc('devA:/x')");
    let resolved = level.get_resolved(None);
    assert_eq!(resolved.error, None);
    assert_eq!(resolved.current, Value::Float(0.5));
    ctx.run_pending();
    assert_eq!(level.expression().as_deref(), Some("=osc('devA:/x')"));

    set_user_id(&srv1, "dev_a");
    assert!(ctx.registry.lookup("devA").is_none());
    assert_eq!(
        ctx.registry.lookup("dev_a").map(|entity| entity.entity_id()),
        Some(srv1.id())
    );

    let resolved = level.get_resolved(None);
    assert_eq!(resolved.error, None);
    assert_eq!(resolved.current, Value::Float(0.5));

    ctx.run_pending();
    assert_eq!(level.expression().as_deref(), Some("=osc('dev_a:/x')"));
    assert_eq!(level.get(), Value::Float(0.5));
    assert_eq!(server.subscribe_count("/x"), 1);
}

#[test]
fn renamed_property_owner_is_recovered() {
    let ctx = SurfaceContext::with_defaults();
    let source = widget(&ctx, "Source", "gainA", level_definition());
    let meter = widget(&ctx, "Meter", "", level_definition());
    source.property("level").unwrap().set(2.0);

    let level = meter.property("level").unwrap();
    level.set_formula("=prop('gainA:level') + prop(\"gainA:level\")");
    assert_eq!(level.get(), Value::Float(4.0));

    set_user_id(&source, "gain_main");
    assert_eq!(level.get(), Value::Float(4.0));
    ctx.run_pending();
    assert_eq!(
        level.expression().as_deref(),
        Some("=prop('gain_main:level') + prop(\"gain_main:level\")")
    );
}

#[test]
fn healing_can_be_disabled() {
    let ctx = SurfaceContext::with_config(EngineConfig {
        self_healing: false,
        ..Default::default()
    });
    let source = widget(&ctx, "Source", "first", level_definition());
    let meter = widget(&ctx, "Meter", "", level_definition());
    let level = meter.property("level").unwrap();
    level.set_formula("=prop('first:level')");
    assert!(level.get_resolved(None).error.is_none());

    set_user_id(&source, "second");
    let error = level.get_resolved(None).error.expect("stale token");
    assert!(error.contains("first"), "{error}");
}

#[test]
fn preferred_identifier_replaces_name_references() {
    let ctx = SurfaceContext::with_defaults();
    let source = widget(&ctx, "Main Bus", "bus", level_definition());
    let meter = widget(&ctx, "Meter", "", level_definition());
    source.property("level").unwrap().set(1.0);

    let level = meter.property("level").unwrap();
    level.set_formula("=prop('Main Bus:level')");
    assert_eq!(level.get(), Value::Float(1.0));
    ctx.run_pending();
    assert_eq!(level.expression().as_deref(), Some("=prop('bus:level')"));
}

#[test]
fn rewrites_can_be_disabled() {
    let ctx = SurfaceContext::with_config(EngineConfig {
        rewrite_references: false,
        ..Default::default()
    });
    let source = widget(&ctx, "Source", "a", level_definition());
    let meter = widget(&ctx, "Meter", "", level_definition());
    let level = meter.property("level").unwrap();
    level.set_formula("=prop('a:level')");
    level.get();

    set_user_id(&source, "b");
    assert!(level.get_resolved(None).error.is_none());
    ctx.run_pending();
    assert_eq!(level.expression().as_deref(), Some("=prop('a:level')"));
}

#[test]
fn pending_rewrite_respects_later_edits() {
    let ctx = SurfaceContext::with_defaults();
    let server = MemoryServer::new();
    server.add_node("/x", "f", vec![Value::Float(0.5)]);
    server.add_node("/y", "f", vec![Value::Float(0.25)]);
    let srv1 = server_entity(&ctx, "Server 1", "devA", server);
    let meter = widget(&ctx, "Meter", "", level_definition());
    let level = meter.property("level").unwrap();

    level.set_formula("=osc('devA:/x')");
    level.get();
    ctx.run_pending();
    set_user_id(&srv1, "dev_a");
    assert!(level.get_resolved(None).error.is_none());

    level.set_formula("=osc('dev_a:/y') * 2");
    ctx.run_pending();
    assert_eq!(level.expression().as_deref(), Some("=osc('dev_a:/y') * 2"));
    assert_eq!(level.get(), Value::Float(0.5));

    set_user_id(&srv1, "dev_b");
    assert!(level.get_resolved(None).error.is_none());
    level.set_formula("=osc('dev_a:/x') + osc('dev_a:/y')");
    ctx.run_pending();
    assert_eq!(
        level.expression().as_deref(),
        Some("=osc('dev_b:/x') + osc('dev_b:/y')")
    );
}
