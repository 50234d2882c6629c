//! Tree-walking interpreter for [`Expr`].
//!
//! Values follow loose scripting semantics: `+` concatenates as soon as one
//! side is not a plain number, `&&`/`||`/`??` yield operand values and `==`
//! compares numbers numerically.
use std::cmp::Ordering;

use surfprop::value::Value;

use crate::expr::{
    ast::{BinaryOp, Callee, Expr, LogicalOp, UnaryOp},
    error::{ExprError, ExprResult},
};

/// Host functions reachable from an expression, scoped to one evaluation.
pub trait Resolvers {
    /// `prop()` reads the evaluating property's raw value, `prop(key)` another property.
    fn prop(&mut self, key: Option<&str>, fallback: Option<Value>) -> ExprResult<Value>;

    /// Read-only remote value.
    fn osc(&mut self, path: &str, fallback: Option<Value>) -> ExprResult<Value>;

    /// Two-way wiring to a remote address.
    fn bind(&mut self, path: &str, fallback: Option<Value>) -> ExprResult<Value>;

    /// Ambient location context.
    fn url(&mut self, key: &str, fallback: Option<Value>) -> ExprResult<Value>;
}

pub fn eval(expr: &Expr, resolvers: &mut dyn Resolvers) -> ExprResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Array(items) => items
            .iter()
            .map(|item| eval(item, resolvers))
            .collect::<ExprResult<Vec<_>>>()
            .map(Value::List),
        Expr::Unary(op, inner) => {
            let value = eval(inner, resolvers)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!value.is_truthy()),
                UnaryOp::Neg => Value::number(-value.to_number()),
                UnaryOp::Plus => Value::number(value.to_number()),
            })
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, resolvers)?;
            let rhs = eval(rhs, resolvers)?;
            Ok(binary(*op, &lhs, &rhs))
        }
        Expr::Logical(op, lhs, rhs) => {
            let lhs = eval(lhs, resolvers)?;
            let short_circuit = match op {
                LogicalOp::And => !lhs.is_truthy(),
                LogicalOp::Or => lhs.is_truthy(),
                LogicalOp::Nullish => !lhs.is_null(),
            };
            if short_circuit {
                Ok(lhs)
            } else {
                eval(rhs, resolvers)
            }
        }
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if eval(condition, resolvers)?.is_truthy() {
                eval(then_branch, resolvers)
            } else {
                eval(else_branch, resolvers)
            }
        }
        Expr::Call(callee, args) => {
            let mut values = args
                .iter()
                .map(|arg| eval(arg, resolvers))
                .collect::<ExprResult<Vec<_>>>()?
                .into_iter();
            match callee {
                Callee::Math(function) if !function.accepts(values.len()) => Err(ExprError::Type(
                    format!("math.{}() does not take {} argument(s)", function, values.len()),
                )),
                Callee::Math(function) => Ok(function.call(values.as_slice())),
                Callee::Prop => {
                    let key = values.next().filter(|v| !v.is_null()).map(|v| v.to_string());
                    resolvers.prop(key.as_deref(), values.next())
                }
                Callee::Osc | Callee::Bind | Callee::Url => {
                    let target = values
                        .next()
                        .filter(|v| !v.is_null())
                        .map(|v| v.to_string())
                        .ok_or_else(|| {
                            ExprError::Type(format!("{}() requires a path argument", callee.name()))
                        })?;
                    let fallback = values.next();
                    match callee {
                        Callee::Osc => resolvers.osc(&target, fallback),
                        Callee::Bind => resolvers.bind(&target, fallback),
                        _ => resolvers.url(&target, fallback),
                    }
                }
            }
        }
        Expr::MathConst(constant) => Ok(Value::Float(constant.value())),
        Expr::Index(base, index) => {
            let base = eval(base, resolvers)?;
            let index = eval(index, resolvers)?;
            Ok(index_value(&base, &index))
        }
    }
}

fn is_stringy(value: &Value) -> bool {
    matches!(
        value,
        Value::Str(_) | Value::List(_) | Value::Map(_) | Value::Color(_)
    )
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    let (a, b) = (lhs.to_number(), rhs.to_number());
    match op {
        BinaryOp::Add if is_stringy(lhs) || is_stringy(rhs) => Value::Str(format!("{lhs}{rhs}")),
        BinaryOp::Add => Value::number(a + b),
        BinaryOp::Sub => Value::number(a - b),
        BinaryOp::Mul => Value::number(a * b),
        BinaryOp::Div => Value::number(a / b),
        BinaryOp::Rem => Value::number(a % b),
        BinaryOp::Pow => Value::number(a.powf(b)),
        BinaryOp::Eq => Value::Bool(loose_equals(lhs, rhs)),
        BinaryOp::Ne => Value::Bool(!loose_equals(lhs, rhs)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(lhs, rhs)),
        BinaryOp::StrictNe => Value::Bool(!strict_equals(lhs, rhs)),
        BinaryOp::Lt => Value::Bool(compare(lhs, rhs).is_some_and(Ordering::is_lt)),
        BinaryOp::Le => Value::Bool(compare(lhs, rhs).is_some_and(Ordering::is_le)),
        BinaryOp::Gt => Value::Bool(compare(lhs, rhs).is_some_and(Ordering::is_gt)),
        BinaryOp::Ge => Value::Bool(compare(lhs, rhs).is_some_and(Ordering::is_ge)),
    }
}

fn loose_equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Int(_) | Value::Float(_) | Value::Bool(_), _)
        | (_, Value::Int(_) | Value::Float(_) | Value::Bool(_))
            if !matches!(lhs, Value::List(_) | Value::Map(_))
                && !matches!(rhs, Value::List(_) | Value::Map(_)) =>
        {
            lhs.to_number() == rhs.to_number()
        }
        _ => lhs.loose_eq(rhs),
    }
}

fn strict_equals(lhs: &Value, rhs: &Value) -> bool {
    lhs.type_name() == rhs.type_name() && lhs.loose_eq(rhs)
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => lhs.to_number().partial_cmp(&rhs.to_number()),
    }
}

fn index_value(base: &Value, index: &Value) -> Value {
    let position = || {
        let n = index.to_number();
        (n.is_finite() && n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
    };
    match base {
        Value::List(items) => position().and_then(|i| items.get(i).cloned()).unwrap_or_default(),
        Value::Str(s) => position()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(c.to_string()))
            .unwrap_or_default(),
        Value::Map(map) => map.get(&index.to_string()).cloned().unwrap_or_default(),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;

    /// Resolvers backed by fixed values.
    struct Fixed;

    impl Resolvers for Fixed {
        fn prop(&mut self, key: Option<&str>, fallback: Option<Value>) -> ExprResult<Value> {
            match key {
                None => Ok(Value::Int(7)),
                Some("dev:x") => Ok(Value::Int(4)),
                Some(other) => fallback.ok_or_else(|| ExprError::UnknownEntity(other.into())),
            }
        }

        fn osc(&mut self, path: &str, _fallback: Option<Value>) -> ExprResult<Value> {
            Ok(Value::List(vec![Value::from(path), Value::Float(0.5)]))
        }

        fn bind(&mut self, _path: &str, _fallback: Option<Value>) -> ExprResult<Value> {
            Ok(Value::Null)
        }

        fn url(&mut self, _key: &str, fallback: Option<Value>) -> ExprResult<Value> {
            Ok(fallback.unwrap_or_default())
        }
    }

    fn run(src: &str) -> ExprResult<Value> {
        eval(&parse(src).expect("test source parses"), &mut Fixed)
    }

    #[test]
    fn arithmetic_and_concatenation() {
        assert_eq!(run("prop('dev:x') + 1"), Ok(Value::Int(5)));
        assert_eq!(run("prop() * 2 - 1"), Ok(Value::Int(13)));
        assert_eq!(run("'a' + 1 + 2"), Ok(Value::from("a12")));
        assert_eq!(run("1 + 2 + 'a'"), Ok(Value::from("3a")));
        assert_eq!(run("7 / 2"), Ok(Value::Float(3.5)));
        assert_eq!(run("-7 % 3"), Ok(Value::Int(-1)));
        assert_eq!(run("2 ** 10"), Ok(Value::Int(1024)));
    }

    #[test]
    fn logic_returns_operands() {
        assert_eq!(run("0 || 'x'"), Ok(Value::from("x")));
        assert_eq!(run("'' && 'x'"), Ok(Value::from("")));
        assert_eq!(run("null ?? 3"), Ok(Value::Int(3)));
        assert_eq!(run("0 ?? 3"), Ok(Value::Int(0)));
        assert_eq!(run("!1"), Ok(Value::Bool(false)));
        assert_eq!(run("1 < 2 ? 'lo' : 'hi'"), Ok(Value::from("lo")));
    }

    #[test]
    fn equality_rules() {
        assert_eq!(run("1 == '1'"), Ok(Value::Bool(true)));
        assert_eq!(run("1 === '1'"), Ok(Value::Bool(false)));
        assert_eq!(run("1 === 1.0"), Ok(Value::Bool(true)));
        assert_eq!(run("null == 0"), Ok(Value::Bool(false)));
        assert_eq!(run("undefined == null"), Ok(Value::Bool(true)));
        assert_eq!(run("'b' > 'a'"), Ok(Value::Bool(true)));
        assert_eq!(run("'x' < 1"), Ok(Value::Bool(false)));
    }

    #[test]
    fn indexing_and_math() {
        assert_eq!(run("osc('/fader')[1]"), Ok(Value::Float(0.5)));
        assert_eq!(run("[1, 2, 3][5]"), Ok(Value::Null));
        assert_eq!(run("'abc'[1]"), Ok(Value::from("b")));
        assert_eq!(run("math.round(math.PI * 100) / 100"), Ok(Value::Float(3.14)));
        assert_eq!(run("math.clamp(prop(), 0, 5)"), Ok(Value::Int(5)));
        assert!(matches!(run("math.pow(2)"), Err(ExprError::Type(_))));
        assert!(matches!(run("math.sqrt(4, 9)"), Err(ExprError::Type(_))));
    }

    #[test]
    fn resolver_errors_propagate() {
        assert!(matches!(run("prop('nope:y') + 1"), Err(ExprError::UnknownEntity(_))));
        assert_eq!(run("prop('nope:y', 2) + 1"), Ok(Value::Int(3)));
        assert!(run("osc(null)").is_err());
        assert_eq!(run("url('query.x', 'dflt')"), Ok(Value::from("dflt")));
    }
}
