//! Dynamic values stored in properties and exchanged with parameter servers.
//!
//! [`Value`] is deliberately loose: expressions produce it, remote nodes carry
//! lists of it, and each [`PropertyType`](crate::types::PropertyType) coerces it
//! into the canonical shape the property expects.
use std::{collections::BTreeMap, fmt::Write as _};

use serde::{Deserialize, Serialize};
use strum::EnumIs;

/// RGBA color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl Color {
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse a CSS-like color: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`,
    /// `rgb(r, g, b)` or `rgba(r, g, b, a)` where `a` lies in `0..=1`.
    ///
    /// ```rust
    /// # use surfprop::value::Color;
    /// assert_eq!(Color::parse("#ff0000"), Some(Color::rgba(255, 0, 0, 255)));
    /// assert_eq!(Color::parse("rgba(0, 0, 255, 0.5)"), Some(Color::rgba(0, 0, 255, 128)));
    /// assert_eq!(Color::parse("not a color"), None);
    /// ```
    pub fn parse(src: &str) -> Option<Self> {
        let src = src.trim();
        if let Some(hex) = src.strip_prefix('#') {
            return Self::parse_hex(hex);
        }

        let lower = src.to_ascii_lowercase();
        let inner = lower
            .strip_prefix("rgba(")
            .or_else(|| lower.strip_prefix("rgb("))?
            .strip_suffix(')')?;
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() != 3 && parts.len() != 4 {
            return None;
        }

        let channel = |s: &str| -> Option<u8> {
            let v: f64 = s.parse().ok()?;
            Some(v.round().clamp(0.0, 255.0) as u8)
        };
        let alpha = match parts.get(3) {
            Some(s) => {
                let v: f64 = s.parse().ok()?;
                (v.clamp(0.0, 1.0) * 255.0).round() as u8
            }
            None => 255,
        };

        Some(Self::rgba(
            channel(parts[0])?,
            channel(parts[1])?,
            channel(parts[2])?,
            alpha,
        ))
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();

        match hex.len() {
            3 => Some(Self::rgba(nibble(0)?, nibble(1)?, nibble(2)?, 255)),
            4 => Some(Self::rgba(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
            6 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    /// Interpret any [`Value`] as a color, if it has a recognizable shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Color(c) => Some(*c),
            Value::Str(s) => Self::parse(s),
            Value::List(items) if items.len() == 3 || items.len() == 4 => {
                let mut channels = [0u8, 0, 0, 255];
                for (slot, item) in channels.iter_mut().zip(items) {
                    *slot = item.as_f64()?.round().clamp(0.0, 255.0) as u8;
                }
                Some(Self::rgba(channels[0], channels[1], channels[2], channels[3]))
            }
            Value::Map(map) => {
                let get = |k: &str| map.get(k).and_then(Value::as_f64);
                Some(Self::rgba(
                    get("r")?.round().clamp(0.0, 255.0) as u8,
                    get("g")?.round().clamp(0.0, 255.0) as u8,
                    get("b")?.round().clamp(0.0, 255.0) as u8,
                    get("a").map_or(255, |a| a.round().clamp(0.0, 255.0) as u8),
                ))
            }
            _ => None,
        }
    }

    /// Hex representation, omitting the alpha byte when fully opaque.
    pub fn to_hex(&self) -> String {
        let mut out = format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b);
        if self.a != 255 {
            let _ = write!(out, "{:02x}", self.a);
        }
        out
    }
}

/// Any value a property can hold.
///
/// `Null` doubles as "undefined": an expression evaluating to `Null` is treated
/// as having produced no result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, EnumIs)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Color(Color),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Numeric view of scalar values. Strings are parsed, booleans map to 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Number conversion used by arithmetic; non-numeric values become NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Str(s) if s.trim().is_empty() => 0.0,
            other => other.as_f64().unwrap_or(f64::NAN),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Color(_) | Value::List(_) | Value::Map(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Color(_) => "color",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Build a number, preferring the integer variant when the value is integral.
    pub fn number(v: f64) -> Self {
        if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 {
            Value::Int(v as i64)
        } else {
            Value::Float(v)
        }
    }

    /// Equality that ignores the integer/float distinction and recurses into lists.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
            }
            _ => self == other,
        }
    }

    /// Protocol argument list form of this value.
    pub fn to_args(&self) -> Vec<Value> {
        match self {
            Value::Null => Vec::new(),
            Value::List(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// Inverse of [`Value::to_args`]: nothing, one scalar, or a list.
    pub fn from_args(args: &[Value]) -> Value {
        match args {
            [] => Value::Null,
            [single] => single.clone(),
            many => Value::List(many.to_vec()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => {
                if v.is_nan() {
                    write!(f, "NaN")
                } else if v.is_infinite() {
                    write!(f, "{}Infinity", if *v < 0.0 { "-" } else { "" })
                } else {
                    write!(f, "{v}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::Color(c) => write!(f, "{}", c.to_hex()),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if !item.is_null() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Value::Map(_) => write!(f, "[object]"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Color> for Value {
    fn from(value: Color) -> Self {
        Value::Color(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_in_all_lengths() {
        assert_eq!(Color::parse("#fff"), Some(Color::WHITE));
        assert_eq!(Color::parse("#0000"), Some(Color::TRANSPARENT));
        assert_eq!(Color::parse("#102030"), Some(Color::rgba(16, 32, 48, 255)));
        assert_eq!(Color::parse("#10203040"), Some(Color::rgba(16, 32, 48, 64)));
        assert_eq!(Color::parse("#12345"), None);
        assert_eq!(Color::parse("#zzzzzz"), None);
    }

    #[test]
    fn color_from_list_and_map() {
        let list = Value::List(vec![1.into(), 2.into(), 3.into()]);
        assert_eq!(Color::from_value(&list), Some(Color::rgba(1, 2, 3, 255)));

        let mut map = BTreeMap::new();
        map.insert("r".to_string(), Value::Int(9));
        map.insert("g".to_string(), Value::Float(8.4));
        map.insert("b".to_string(), Value::Int(7));
        assert_eq!(
            Color::from_value(&Value::Map(map)),
            Some(Color::rgba(9, 8, 7, 255))
        );
    }

    #[test]
    fn hex_output_omits_opaque_alpha() {
        assert_eq!(Color::rgba(255, 0, 16, 255).to_hex(), "#ff0010");
        assert_eq!(Color::rgba(255, 0, 16, 0).to_hex(), "#ff001000");
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }

    #[test]
    fn loose_equality_ignores_numeric_representation() {
        assert!(Value::Int(2).loose_eq(&Value::Float(2.0)));
        assert!(
            Value::List(vec![Value::Int(1), Value::Float(2.5)])
                .loose_eq(&Value::List(vec![Value::Float(1.0), Value::Float(2.5)]))
        );
        assert!(!Value::Int(1).loose_eq(&Value::from("1")));
    }

    #[test]
    fn args_round_trip_scalar_and_list() {
        assert_eq!(Value::from_args(&Value::Int(3).to_args()), Value::Int(3));
        assert!(Value::Null.to_args().is_empty());
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(Value::from_args(&list.to_args()), list);
    }

    #[test]
    fn display_matches_script_conventions() {
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Int(5).to_string(), "5");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Null, Value::from("a")]).to_string(),
            "1,,a"
        );
    }
}
