//! Declarative property definitions.
//!
//! Entities describe their editable surface as a tree of [`PropertyDefinition`]s.
//! Leaves ([`SingleDefinition`]) carry a type and a default; groups
//! ([`ContainerDefinition`]) carry ordered children and may nest arbitrarily.
use std::{fmt, sync::Arc};

use strum::{EnumIs, EnumTryAs};

use crate::{
    types::PropertyType,
    value::{Color, Value},
};

/// Pure value sanitizer attached to a leaf definition.
///
/// Runs on computed expression results and on inbound remote values before
/// type coercion. Returning `Err` reports the message without aborting the
/// surrounding evaluation.
pub type FilterFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Definition of a single editable value.
#[derive(Clone)]
pub struct SingleDefinition {
    pub name: String,
    pub ty: PropertyType,
    pub default: Value,
    pub can_disable: bool,
    pub read_only: bool,
    pub options: Vec<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub filter: Option<FilterFn>,
}

impl fmt::Debug for SingleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleDefinition")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("default", &self.default)
            .field("can_disable", &self.can_disable)
            .field("read_only", &self.read_only)
            .field("options", &self.options)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("step", &self.step)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl SingleDefinition {
    pub fn new(name: impl Into<String>, ty: PropertyType, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            default: default.into(),
            can_disable: false,
            read_only: false,
            options: Vec::new(),
            min: None,
            max: None,
            step: None,
            filter: None,
        }
    }

    pub fn can_disable(mut self, can_disable: bool) -> Self {
        self.can_disable = can_disable;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn options(mut self, options: impl IntoIterator<Item = Value>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    pub fn range(mut self, min: f64, max: f64, step: Option<f64>) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.step = step;
        self
    }

    pub fn filter(
        mut self,
        filter: impl Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Default value after coercion to the declared type.
    pub fn coerced_default(&self) -> Value {
        self.coerce(self.default.clone())
    }

    /// Coerce to the declared type, then clamp numeric values into `min..=max`.
    pub fn coerce(&self, value: Value) -> Value {
        let value = self.ty.coerce(value);
        if !self.ty.is_numeric() || (self.min.is_none() && self.max.is_none()) {
            return value;
        }

        let clamp = |v: f64| {
            let v = self.min.map_or(v, |min| v.max(min));
            self.max.map_or(v, |max| v.min(max))
        };
        match value {
            Value::Int(i) => Value::Int(clamp(i as f64).round() as i64),
            Value::Float(f) if !f.is_nan() => Value::Float(clamp(f)),
            other => other,
        }
    }

    /// Enablement used when the property does not carry an explicit flag.
    pub fn default_enabled(&self) -> bool {
        !self.can_disable
    }
}

/// Definition of a named group of properties.
#[derive(Debug, Clone, Default)]
pub struct ContainerDefinition {
    pub name: String,
    pub color: Option<Color>,
    pub collapsed_by_default: bool,
    pub children: Vec<(String, PropertyDefinition)>,
}

impl ContainerDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn collapsed_by_default(mut self, collapsed: bool) -> Self {
        self.collapsed_by_default = collapsed;
        self
    }

    /// Append (or replace) the child definition stored under `key`.
    pub fn child(mut self, key: impl Into<String>, definition: impl Into<PropertyDefinition>) -> Self {
        self.insert(key, definition);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, definition: impl Into<PropertyDefinition>) {
        let key = key.into();
        let definition = definition.into();
        match self.children.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = definition,
            None => self.children.push((key, definition)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyDefinition> {
        self.children
            .iter()
            .find_map(|(k, def)| (k == key).then_some(def))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Either variant of a property definition.
#[derive(Debug, Clone, EnumIs, EnumTryAs)]
pub enum PropertyDefinition {
    Single(Arc<SingleDefinition>),
    Container(Arc<ContainerDefinition>),
}

impl PropertyDefinition {
    pub fn name(&self) -> &str {
        match self {
            PropertyDefinition::Single(def) => &def.name,
            PropertyDefinition::Container(def) => &def.name,
        }
    }
}

impl From<SingleDefinition> for PropertyDefinition {
    fn from(value: SingleDefinition) -> Self {
        PropertyDefinition::Single(Arc::new(value))
    }
}

impl From<ContainerDefinition> for PropertyDefinition {
    fn from(value: ContainerDefinition) -> Self {
        PropertyDefinition::Container(Arc::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_definitions_clamp_after_coercion() {
        let def = SingleDefinition::new("gain", PropertyType::Float, 0.5).range(0.0, 1.0, Some(0.01));
        assert_eq!(def.coerce(Value::from("3")), Value::Float(1.0));
        assert_eq!(def.coerce(Value::Int(-2)), Value::Float(0.0));

        let steps = SingleDefinition::new("steps", PropertyType::Integer, 4).range(1.0, 8.0, None);
        assert_eq!(steps.coerce(Value::Int(12)), Value::Int(8));
    }

    #[test]
    fn container_insert_replaces_in_place() {
        let mut def = ContainerDefinition::new("style")
            .child("a", SingleDefinition::new("A", PropertyType::Integer, 1))
            .child("b", SingleDefinition::new("B", PropertyType::Integer, 2));
        def.insert("a", SingleDefinition::new("A2", PropertyType::String, "x"));

        let keys: Vec<&str> = def.children.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(def.get("a").map(PropertyDefinition::name), Some("A2"));
        assert!(!def.contains("c"));
    }

    #[test]
    fn default_enablement_follows_can_disable() {
        let plain = SingleDefinition::new("x", PropertyType::Boolean, false);
        assert!(plain.default_enabled());
        assert!(!plain.can_disable(true).default_enabled());
    }
}
