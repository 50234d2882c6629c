use criterion::{Criterion, black_box, criterion_group, criterion_main};

use surfcore::{
    base::addressable::Addressable,
    expr::{
        error::ExprResult,
        interp::{Resolvers, eval},
        parse,
    },
    tests_utils::{MemoryServer, context, server_entity, widget},
};
use surfprop::{ContainerDefinition, PropertyType, SingleDefinition, Value};

const SOURCE: &str = "prop('dev:x') * 2 + (osc('/a', 0) > 0.5 ? 1 : 0) + url('query.scene', 3)";

/// Answers every host call with a constant.
struct Constant;

impl Resolvers for Constant {
    fn prop(&mut self, _key: Option<&str>, _fallback: Option<Value>) -> ExprResult<Value> {
        Ok(Value::Float(0.25))
    }

    fn osc(&mut self, _path: &str, _fallback: Option<Value>) -> ExprResult<Value> {
        Ok(Value::Float(0.75))
    }

    fn bind(&mut self, _path: &str, _fallback: Option<Value>) -> ExprResult<Value> {
        Ok(Value::Float(0.5))
    }

    fn url(&mut self, _key: &str, _fallback: Option<Value>) -> ExprResult<Value> {
        Ok(Value::Int(3))
    }
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_expression", |b| {
        b.iter(|| {
            black_box(parse(black_box(SOURCE)).ok());
        })
    });
}

fn bench_eval(c: &mut Criterion) {
    let Ok(expr) = parse(SOURCE) else {
        panic!("benchmark source must parse");
    };

    c.bench_function("eval_constant_resolvers", |b| {
        b.iter(|| {
            black_box(eval(&expr, &mut Constant).ok());
        })
    });
}

fn bench_resolve(c: &mut Criterion) {
    let ctx = context();
    let server = MemoryServer::new();
    server.add_node("/a", "f", vec![Value::Float(0.75)]);
    let _srv = server_entity(&ctx, "Server", "srv", server);

    let float = |name: &str| SingleDefinition::new(name, PropertyType::Float, 0.0);
    let dev = widget(&ctx, "Device", "dev", ContainerDefinition::new("dev").child("x", float("x")));
    let out = widget(&ctx, "Out", "", ContainerDefinition::new("out").child("y", float("y")));
    let (Some(x), Some(y)) = (dev.property("x"), out.property("y")) else {
        panic!("fixture properties exist");
    };
    x.set(0.25);
    y.set_formula("=prop('dev:x') * 2 + (osc('srv:/a', 0) > 0.5 ? 1 : 0)");
    ctx.run_pending();

    c.bench_function("resolve_property", |b| {
        b.iter(|| {
            black_box(y.get_resolved(None));
        })
    });
}

criterion_group!(benches, bench_parse, bench_eval, bench_resolve);
criterion_main!(benches);
