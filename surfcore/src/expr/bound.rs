use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use log::{trace, warn};
use parking_lot::Mutex;
use surfprop::{
    Property, Resolved, Value,
    node::{ExpressionRuntime, ObserverId},
};

use crate::{
    base::{SurfaceContext, addressable::Addressable, server::NodeEvent},
    expr::{
        error::ExprResult,
        expression::{CycleGuard, EvalArgs, Expression, ExpressionSnapshot},
        sync::{DepKey, DepTag},
    },
};

/// An [`Expression`] wired to the property it computes.
///
/// Installed as the property's [`ExpressionRuntime`]. Keeps the expression's
/// source in step with the property, feeds bound remote values into the
/// property and pushes local edits out while the expression binds.
pub struct BoundExpression {
    expression: Arc<Expression>,
    owner: Weak<dyn Addressable>,
    path: String,
    property: Weak<Property>,
    observer: Mutex<Option<ObserverId>>,
    applying_inbound: AtomicBool,
    applying_outbound: AtomicBool,
}

impl BoundExpression {
    /// Create the expression of `property` (at `path` on `owner`) and install it.
    pub fn attach(
        ctx: Arc<SurfaceContext>,
        owner: Weak<dyn Addressable>,
        path: &str,
        property: &Arc<Property>,
    ) -> Arc<Self> {
        let expression = Expression::new(ctx);
        expression.set_source(property.mode(), property.expression());

        let bound = Arc::new(Self {
            expression,
            owner,
            path: path.to_string(),
            property: Arc::downgrade(property),
            observer: Mutex::new(None),
            applying_inbound: AtomicBool::new(false),
            applying_outbound: AtomicBool::new(false),
        });

        let this = Arc::downgrade(&bound);
        bound.expression.set_event_sink(Arc::new(move |key: &DepKey, tag: DepTag, event: &NodeEvent| {
            if let Some(bound) = this.upgrade() {
                bound.on_event(key, tag, event);
            }
        }));

        let target = Arc::downgrade(property);
        bound.expression.set_source_provider(Arc::new(move || {
            target
                .upgrade()
                .map(|property| ExpressionSnapshot {
                    mode: property.mode(),
                    expression: property.expression(),
                })
                .unwrap_or_default()
        }));

        let target = Arc::downgrade(property);
        bound.expression.set_rewrite_hook(Arc::new(move |text: &str| {
            if let Some(property) = target.upgrade() {
                property.set_expression(Some(text.to_string()));
            }
        }));

        let this = Arc::downgrade(&bound);
        let observer = property.observe(move |value| {
            if let Some(bound) = this.upgrade() {
                bound.push_outbound(value);
            }
        });
        *bound.observer.lock() = Some(observer);

        property.attach_runtime(bound.clone());
        bound
    }

    pub fn expression(&self) -> &Arc<Expression> {
        &self.expression
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn run<R>(
        &self,
        property: &Property,
        raw: Value,
        fallback: Value,
        guard: &mut CycleGuard,
        eval: impl FnOnce(&Arc<Expression>, EvalArgs<'_>, &mut CycleGuard) -> R,
    ) -> Option<R> {
        let owner = self.owner.upgrade()?;
        let owner_id = owner.entity_id();
        self.expression.set_source(property.mode(), property.expression());

        let definition = property.definition();
        let coerce = |value: Value| definition.coerce(value);
        let args = EvalArgs {
            owner,
            path: &self.path,
            raw,
            fallback,
            coerce: &coerce,
            filter: definition.filter.as_ref(),
        };

        let entered = guard.enter(owner_id, &self.path);
        let result = eval(&self.expression, args, guard);
        if entered {
            guard.exit(owner_id, &self.path);
        }
        Some(result)
    }

    /// Evaluate on behalf of another expression's `prop()` call.
    pub(crate) fn evaluate_nested(
        &self,
        property: &Property,
        fallback: Option<&Value>,
        guard: &mut CycleGuard,
    ) -> ExprResult<Value> {
        let raw = property.gated_raw(fallback);
        let fallback = fallback.cloned().unwrap_or_else(|| raw.clone());
        self.run(property, raw.clone(), fallback, guard, |expression, args, guard| {
            expression.try_evaluate(args, guard)
        })
        .unwrap_or(Ok(raw))
    }

    fn on_event(&self, key: &DepKey, tag: DepTag, event: &NodeEvent) {
        let NodeEvent::ValueChanged(args) = event;
        match tag {
            DepTag::Osc => {
                if let Some(owner) = self.owner.upgrade() {
                    self.expression
                        .context()
                        .invalidate(owner.entity_id(), &self.path);
                }
            }
            DepTag::Binding => {
                if !self.expression.binding_active() {
                    return;
                }
                if self.applying_outbound.load(Ordering::Acquire) {
                    trace!("Dropping echo of `{}` for `{}`", key.address, self.path);
                    return;
                }
                let Some(property) = self.property.upgrade() else {
                    return;
                };

                let value = Value::from_args(args);
                let value = match &property.definition().filter {
                    Some(filter) => match filter(value) {
                        Ok(value) => value,
                        Err(message) => {
                            warn!("Inbound value of `{}` rejected for `{}`: {}", key.address, self.path, message);
                            return;
                        }
                    },
                    None => value,
                };

                self.applying_inbound.store(true, Ordering::Release);
                property.set_raw(value);
                self.applying_inbound.store(false, Ordering::Release);
            }
        }
    }

    fn push_outbound(&self, value: &Value) {
        if self.applying_inbound.load(Ordering::Acquire) || !self.expression.binding_active() {
            return;
        }

        for (address, server) in self.expression.bound_targets() {
            let Some(node) = server.get_node(&address) else {
                continue;
            };
            let args = node.coerce_args(value);
            if node.args == args {
                continue;
            }

            self.applying_outbound.store(true, Ordering::Release);
            server.send_node_value(&address, args.clone());
            server.set_cached_value(&address, args);
            self.applying_outbound.store(false, Ordering::Release);
        }
    }
}

impl ExpressionRuntime for BoundExpression {
    fn resolve(&self, property: &Property, raw: Value, fallback: Value) -> Resolved {
        let mut guard = CycleGuard::new();
        self.run(property, raw.clone(), fallback, &mut guard, |expression, args, guard| {
            expression.evaluate(args, guard)
        })
        .unwrap_or_else(|| Resolved::passthrough(raw))
    }

    fn cleanup(&self) {
        self.expression.cleanup();
        if let Some(observer) = self.observer.lock().take()
            && let Some(property) = self.property.upgrade()
        {
            property.unobserve(observer);
        }
    }
}
