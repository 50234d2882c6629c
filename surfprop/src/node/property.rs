use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use downcast_rs::{DowncastSync, impl_downcast};
use log::trace;
use parking_lot::RwLock;

use crate::{
    definition::SingleDefinition,
    snapshot::{PropertySnapshot, ValueMode},
    value::Value,
};

/// Result of resolving a property.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Value to display and use: the stored value, or the expression result.
    pub current: Value,
    /// Stored value, or the fallback/default when the property is disabled.
    pub raw: Value,
    /// Error reported by the expression, if any. `current` is the fallback then.
    pub error: Option<String>,
}

impl Resolved {
    pub fn passthrough(raw: Value) -> Self {
        Self {
            current: raw.clone(),
            raw,
            error: None,
        }
    }
}

/// Expression machinery attached to a property by its owner.
///
/// The property model does not know how expressions are compiled or where
/// their references point; the owning runtime installs an implementation and
/// [`Property::get_resolved`] delegates to it while the property is in
/// expression mode.
pub trait ExpressionRuntime: DowncastSync {
    /// Compute the resolved value. `raw` is already gated by enablement.
    fn resolve(&self, property: &Property, raw: Value, fallback: Value) -> Resolved;

    /// Release subscriptions and learned state. Called once on disposal.
    fn cleanup(&self);
}
impl_downcast!(sync ExpressionRuntime);

/// Callback fired after the stored value of a property changed.
pub type Observer = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ObserverId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Mutable part of a leaf property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyState {
    pub value: Value,
    pub enabled: Option<bool>,
    pub mode: Option<ValueMode>,
    pub expression: Option<String>,
}

/// A single editable value.
pub struct Property {
    definition: RwLock<Arc<SingleDefinition>>,
    state: RwLock<PropertyState>,
    runtime: RwLock<Option<Arc<dyn ExpressionRuntime>>>,
    observers: RwLock<Vec<(ObserverId, Observer)>>,
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.definition.read().name)
            .field("state", &*self.state.read())
            .field("has_runtime", &self.runtime.read().is_some())
            .finish()
    }
}

impl Property {
    pub fn new(definition: Arc<SingleDefinition>) -> Self {
        let value = definition.coerced_default();
        Self {
            definition: RwLock::new(definition),
            state: RwLock::new(PropertyState {
                value,
                enabled: None,
                mode: None,
                expression: None,
            }),
            runtime: RwLock::new(None),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn definition(&self) -> Arc<SingleDefinition> {
        self.definition.read().clone()
    }

    /// Swap in a shape-compatible definition, re-coercing the stored value
    /// when the type changed.
    pub fn set_definition(&self, definition: Arc<SingleDefinition>) {
        let retype = self.definition.read().ty != definition.ty;
        if retype {
            let mut state = self.state.write();
            state.value = definition.coerce(std::mem::take(&mut state.value));
        }
        *self.definition.write() = definition;
    }

    pub fn state(&self) -> PropertyState {
        self.state.read().clone()
    }

    /// Stored value, regardless of mode and enablement.
    pub fn get_raw(&self) -> Value {
        self.state.read().value.clone()
    }

    /// Resolved value with the default as fallback.
    pub fn get(&self) -> Value {
        self.get_resolved(None).current
    }

    pub fn set(&self, value: impl Into<Value>) -> bool {
        self.set_raw(value.into())
    }

    /// Store a value after coercion. Returns true if the stored value changed;
    /// observers only fire in that case.
    pub fn set_raw(&self, value: Value) -> bool {
        let definition = self.definition();
        let value = definition.coerce(value);
        {
            let mut state = self.state.write();
            if definition.ty.values_equal(&state.value, &value) {
                return false;
            }
            state.value = value.clone();
        }
        trace!("Property `{}` set to {}", definition.name, value);
        self.notify(&value);
        true
    }

    fn notify(&self, value: &Value) {
        let observers: Vec<Observer> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(value);
        }
    }

    pub fn observe(&self, observer: impl Fn(&Value) + Send + Sync + 'static) -> ObserverId {
        let id = ObserverId::next();
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.observers.write().retain(|(other, _)| *other != id);
    }

    pub fn enabled(&self) -> Option<bool> {
        self.state.read().enabled
    }

    pub fn set_enabled(&self, enabled: Option<bool>) {
        self.state.write().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled()
            .unwrap_or_else(|| self.definition.read().default_enabled())
    }

    pub fn mode(&self) -> Option<ValueMode> {
        self.state.read().mode
    }

    pub fn set_mode(&self, mode: Option<ValueMode>) {
        self.state.write().mode = mode;
    }

    pub fn expression(&self) -> Option<String> {
        self.state.read().expression.clone()
    }

    pub fn set_expression(&self, expression: Option<String>) {
        self.state.write().expression = expression;
    }

    /// Switch to expression mode with the given source text.
    pub fn set_formula(&self, expression: impl Into<String>) {
        let mut state = self.state.write();
        state.mode = Some(ValueMode::Expression);
        state.expression = Some(expression.into());
    }

    /// True when the resolved value comes from the expression.
    pub fn is_expression_active(&self) -> bool {
        let state = self.state.read();
        state.mode == Some(ValueMode::Expression)
            && state
                .expression
                .as_deref()
                .is_some_and(|text| !text.trim().is_empty())
    }

    pub fn default_value(&self) -> Value {
        self.definition.read().coerced_default()
    }

    /// Stored value, or `fallback` (default if none) while disabled.
    pub fn gated_raw(&self, fallback: Option<&Value>) -> Value {
        if self.is_enabled() {
            self.get_raw()
        } else {
            fallback.cloned().unwrap_or_else(|| self.default_value())
        }
    }

    /// Resolve the value this property currently presents.
    ///
    /// In value mode `current == raw`. In expression mode the attached
    /// [`ExpressionRuntime`] computes `current`; failures are reported in
    /// [`Resolved::error`] and never escape.
    pub fn get_resolved(&self, fallback: Option<&Value>) -> Resolved {
        let raw = self.gated_raw(fallback);
        if !self.is_expression_active() {
            return Resolved::passthrough(raw);
        }

        let runtime = self.runtime.read().clone();
        match runtime {
            Some(runtime) => {
                let fallback = fallback.cloned().unwrap_or_else(|| raw.clone());
                runtime.resolve(self, raw, fallback)
            }
            None => Resolved::passthrough(raw),
        }
    }

    pub fn attach_runtime(&self, runtime: Arc<dyn ExpressionRuntime>) {
        if let Some(previous) = self.runtime.write().replace(runtime) {
            previous.cleanup();
        }
    }

    pub fn runtime(&self) -> Option<Arc<dyn ExpressionRuntime>> {
        self.runtime.read().clone()
    }

    /// Whether the property differs from a freshly built one.
    ///
    /// With `include_expression`, expression mode alone counts as an override.
    pub fn is_value_overridden(&self, include_expression: bool) -> bool {
        let definition = self.definition();
        let state = self.state.read();
        if include_expression && state.mode == Some(ValueMode::Expression) {
            return true;
        }
        !definition
            .ty
            .values_equal(&state.value, &definition.coerced_default())
    }

    /// No flag, mode or expression is set and the value equals the default.
    pub fn is_default_state(&self) -> bool {
        {
            let state = self.state.read();
            if state.enabled.is_some() || state.mode.is_some() || state.expression.is_some() {
                return false;
            }
        }
        !self.is_value_overridden(false)
    }

    /// Persistable state, or `None` for a disabled-by-default property that was
    /// never touched.
    pub fn to_snapshot(&self) -> Option<PropertySnapshot> {
        if self.definition.read().can_disable && self.is_default_state() {
            return None;
        }

        let state = self.state.read();
        Some(PropertySnapshot {
            value: state.value.clone(),
            enabled: state.enabled,
            mode: state.mode,
            expression: state.expression.clone(),
        })
    }

    pub fn apply_snapshot(&self, snapshot: &PropertySnapshot) {
        {
            let mut state = self.state.write();
            state.enabled = snapshot.enabled;
            state.mode = snapshot.mode;
            state.expression = snapshot.expression.clone();
        }
        self.set_raw(snapshot.value.clone());
    }

    pub fn reset_to_default(&self) {
        {
            let mut state = self.state.write();
            state.enabled = None;
            state.mode = None;
            state.expression = None;
        }
        self.set_raw(self.default_value());
    }

    /// Detach the expression runtime and drop every observer.
    pub fn cleanup(&self) {
        if let Some(runtime) = self.runtime.write().take() {
            runtime.cleanup();
        }
        self.observers.write().clear();
    }
}
