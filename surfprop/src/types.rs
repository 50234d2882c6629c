//! Property types and the coercion rules attached to them.
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIs, EnumIter, EnumString};

use crate::value::{Color, Value};

/// The declared type of a leaf property.
///
/// The type only drives coercion ([`PropertyType::coerce`]) and equality
/// ([`PropertyType::values_equal`]); editors use it to pick a widget.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIs,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum PropertyType {
    Boolean,
    Float,
    Integer,
    String,
    Text,
    Color,
    Enum,
    Icon,
    #[serde(rename = "CSSSIZE")]
    #[strum(serialize = "CSSSIZE")]
    CssSize,
    Bounds,
    #[serde(rename = "POINT2D")]
    #[strum(serialize = "POINT2D")]
    Point2D,
    #[serde(rename = "POINT3D")]
    #[strum(serialize = "POINT3D")]
    Point3D,
}

impl PropertyType {
    /// Returns true for types whose values are plain numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, PropertyType::Float | PropertyType::Integer)
    }

    /// Coerce an arbitrary value into the canonical representation of this type.
    ///
    /// - `INTEGER` parses a leading integer (unparsable input becomes `0`)
    /// - `FLOAT` parses a leading decimal number (unparsable input becomes `0.0`)
    /// - `BOOLEAN` uses truthiness
    /// - `STRING`/`TEXT` use the display form (`null` becomes the empty string)
    /// - `COLOR` produces a [`Color`], black when unrecognizable
    /// - every other type passes the value through untouched
    ///
    /// ```rust
    /// # use surfprop::{types::PropertyType, value::Value};
    /// assert_eq!(PropertyType::Integer.coerce(Value::from("42px")), Value::Int(42));
    /// assert_eq!(PropertyType::Float.coerce(Value::Int(3)), Value::Float(3.0));
    /// assert_eq!(PropertyType::Boolean.coerce(Value::from("")), Value::Bool(false));
    /// ```
    pub fn coerce(&self, value: Value) -> Value {
        match self {
            PropertyType::Integer => Value::Int(to_integer(&value)),
            PropertyType::Float => Value::Float(to_float(&value)),
            PropertyType::Boolean => Value::Bool(value.is_truthy()),
            PropertyType::String | PropertyType::Text => match value {
                Value::Str(_) => value,
                Value::Null => Value::Str(String::new()),
                other => Value::Str(other.to_string()),
            },
            PropertyType::Color => Value::Color(Color::from_value(&value).unwrap_or_default()),
            _ => value,
        }
    }

    /// Type-aware equality: colors compare by component, lists element-wise,
    /// everything else by value.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match self {
            PropertyType::Color => match (Color::from_value(a), Color::from_value(b)) {
                (Some(x), Some(y)) => x == y,
                (None, None) => a == b,
                _ => false,
            },
            _ => a.loose_eq(b),
        }
    }
}

fn to_integer(value: &Value) -> i64 {
    match value {
        Value::Int(i) => *i,
        Value::Float(f) if f.is_finite() => f.trunc() as i64,
        Value::Bool(b) => *b as i64,
        Value::Str(s) => leading_number(s, false)
            .and_then(|n| n.parse::<i64>().ok())
            .unwrap_or(0),
        _ => 0,
    }
}

fn to_float(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        Value::Bool(b) => *b as i64 as f64,
        Value::Str(s) => leading_number(s, true)
            .and_then(|n| n.parse::<f64>().ok())
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Longest numeric prefix of `s` after leading whitespace, `parseInt`/`parseFloat` style.
fn leading_number(s: &str, allow_fraction: bool) -> Option<&str> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > digits_start;

    if allow_fraction {
        if end < bytes.len() && bytes[end] == b'.' {
            let frac_start = end + 1;
            let mut frac_end = frac_start;
            while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
                frac_end += 1;
            }
            if frac_end > frac_start || has_digits {
                has_digits |= frac_end > frac_start;
                end = frac_end;
            }
        }
        if has_digits && end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
            let mut exp_end = end + 1;
            if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
                exp_end += 1;
            }
            let exp_digits = exp_end;
            while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                exp_end += 1;
            }
            if exp_end > exp_digits {
                end = exp_end;
            }
        }
    }

    has_digits.then(|| s[..end].trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn type_names_round_trip_through_strings() {
        for ty in PropertyType::iter() {
            assert_eq!(PropertyType::from_str(&ty.to_string()), Ok(ty));
        }
        assert_eq!(PropertyType::from_str("csssize"), Ok(PropertyType::CssSize));
        assert_eq!(PropertyType::Point2D.to_string(), "POINT2D");
    }

    #[test]
    fn integer_coercion_parses_prefixes() {
        let ty = PropertyType::Integer;
        assert_eq!(ty.coerce(Value::from("  -17abc")), Value::Int(-17));
        assert_eq!(ty.coerce(Value::Float(3.9)), Value::Int(3));
        assert_eq!(ty.coerce(Value::from("abc")), Value::Int(0));
        assert_eq!(ty.coerce(Value::Bool(true)), Value::Int(1));
    }

    #[test]
    fn float_coercion_parses_prefixes() {
        let ty = PropertyType::Float;
        assert_eq!(ty.coerce(Value::from("2.5e2px")), Value::Float(250.0));
        assert_eq!(ty.coerce(Value::from(".5")), Value::Float(0.5));
        assert_eq!(ty.coerce(Value::Null), Value::Float(0.0));
    }

    #[test]
    fn string_and_color_coercion() {
        assert_eq!(
            PropertyType::String.coerce(Value::Int(12)),
            Value::from("12")
        );
        assert_eq!(PropertyType::Text.coerce(Value::Null), Value::from(""));
        assert_eq!(
            PropertyType::Color.coerce(Value::from("#00ff00")),
            Value::Color(Color::rgba(0, 255, 0, 255))
        );
        assert_eq!(
            PropertyType::Color.coerce(Value::from("garbage")),
            Value::Color(Color::BLACK)
        );
    }

    #[test]
    fn passthrough_types_leave_values_alone() {
        let point = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(PropertyType::Point2D.coerce(point.clone()), point);
        assert_eq!(
            PropertyType::Enum.coerce(Value::from("left")),
            Value::from("left")
        );
    }

    #[test]
    fn color_equality_is_component_wise() {
        let ty = PropertyType::Color;
        assert!(ty.values_equal(
            &Value::from("#ff0000"),
            &Value::Color(Color::rgba(255, 0, 0, 255))
        ));
        assert!(!ty.values_equal(&Value::from("#ff0000"), &Value::from("#ff0001")));
    }
}
