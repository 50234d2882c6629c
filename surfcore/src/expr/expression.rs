use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use surfprop::{Resolved, ValueMode, Value, definition::FilterFn};

use crate::{
    base::{SurfaceContext, addressable::Addressable, registry::EntityId, server::ParameterServer},
    expr::{
        ast::Expr,
        error::{ExprError, ExprResult},
        heal::{Healer, RefKind, rewrite_references},
        interp::eval,
        parser::parse,
        resolver::Scope,
        sync::{DepKey, DepTag, DependencyMap, EventSink, Synchronizer},
    },
    sched::TaskKey,
};

/// Persisted source of an expression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpressionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ValueMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Called with the new source text after a reference rewrite.
pub type RewriteHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Reads the mode and text currently stored by the expression's owner.
pub type SourceProvider = Arc<dyn Fn() -> ExpressionSnapshot + Send + Sync>;

/// `(entity, property path)` pairs currently being evaluated, innermost last.
#[derive(Debug, Default)]
pub struct CycleGuard {
    visiting: SmallVec<(EntityId, String), 4>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, entity: EntityId, path: &str) -> bool {
        self.visiting.iter().any(|(id, p)| *id == entity && p == path)
    }

    /// Returns false if the pair was already being evaluated.
    pub fn enter(&mut self, entity: EntityId, path: &str) -> bool {
        if self.contains(entity, path) {
            return false;
        }
        self.visiting.push((entity, path.to_string()));
        true
    }

    pub fn exit(&mut self, entity: EntityId, path: &str) {
        if let Some(pos) = self.visiting.iter().rposition(|(id, p)| *id == entity && p == path) {
            self.visiting.remove(pos);
        }
    }

    pub fn depth(&self) -> usize {
        self.visiting.len()
    }
}

/// Inputs of one evaluation.
pub struct EvalArgs<'a> {
    pub owner: Arc<dyn Addressable>,
    /// Dotted path of the evaluating property on `owner`.
    pub path: &'a str,
    pub raw: Value,
    pub fallback: Value,
    pub coerce: &'a dyn Fn(Value) -> Value,
    pub filter: Option<&'a FilterFn>,
}

enum CompileState {
    Empty,
    Compiled { key: String, ast: Arc<Expr> },
    Failed { key: String, error: ExprError },
}

/// The expression attached to one property.
///
/// Holds the source text and mode, a compile cache keyed by normalized source,
/// the remote subscriptions the last evaluation asked for and the identifier
/// links learned while resolving references.
pub struct Expression {
    id: u64,
    ctx: Arc<SurfaceContext>,
    source: RwLock<ExpressionSnapshot>,
    compiled: Mutex<CompileState>,
    sync: Synchronizer,
    healer: Healer,
    on_rewrite: RwLock<Option<RewriteHook>>,
    provider: RwLock<Option<SourceProvider>>,
}

impl Expression {
    pub fn new(ctx: Arc<SurfaceContext>) -> Arc<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        Arc::new(Self {
            id,
            ctx,
            source: RwLock::new(ExpressionSnapshot::default()),
            compiled: Mutex::new(CompileState::Empty),
            sync: Synchronizer::new(id),
            healer: Healer::new(),
            on_rewrite: RwLock::new(None),
            provider: RwLock::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &Arc<SurfaceContext> {
        &self.ctx
    }

    pub(crate) fn healer(&self) -> &Healer {
        &self.healer
    }

    pub fn set_source(&self, mode: Option<ValueMode>, expression: Option<String>) {
        *self.source.write() = ExpressionSnapshot { mode, expression };
    }

    pub fn mode(&self) -> Option<ValueMode> {
        self.source.read().mode
    }

    pub fn text(&self) -> Option<String> {
        self.source.read().expression.clone()
    }

    /// Normalized source, or `None` while disabled.
    fn normalized(&self) -> Option<String> {
        let source = self.source.read();
        if source.mode != Some(ValueMode::Expression) {
            return None;
        }
        let text = self.ctx.config.normalize(source.expression.as_deref()?);
        (!text.is_empty()).then(|| text.to_string())
    }

    pub fn is_active(&self) -> bool {
        self.normalized().is_some()
    }

    /// Compile the current source unless the cache already holds it.
    ///
    /// Returns `Ok(None)` while disabled. A compile failure stays cached until
    /// the source changes.
    pub fn setup(&self) -> ExprResult<Option<Arc<Expr>>> {
        let Some(key) = self.normalized() else {
            return Ok(None);
        };

        let mut compiled = self.compiled.lock();
        match &*compiled {
            CompileState::Compiled { key: cached, ast } if *cached == key => return Ok(Some(ast.clone())),
            CompileState::Failed { key: cached, error } if *cached == key => return Err(error.clone()),
            _ => {}
        }

        match parse(&key) {
            Ok(ast) => {
                debug!("Compiled expression #{}: `{}`", self.id, key);
                let ast = Arc::new(ast);
                *compiled = CompileState::Compiled { key, ast: ast.clone() };
                Ok(Some(ast))
            }
            Err(errors) => {
                let error = ExprError::Syntax(errors);
                warn!("Expression #{} failed to compile: {}", self.id, error);
                *compiled = CompileState::Failed {
                    key,
                    error: error.clone(),
                };
                Err(error)
            }
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(*self.compiled.lock(), CompileState::Compiled { .. })
    }

    /// Drop the compile cache so the next [`Expression::setup`] recompiles.
    pub fn invalidate(&self) {
        *self.compiled.lock() = CompileState::Empty;
    }

    /// Resolve the value of the owning property. Never fails: errors are
    /// reported in [`Resolved::error`] with `fallback` as current value.
    pub fn evaluate(self: &Arc<Self>, args: EvalArgs<'_>, guard: &mut CycleGuard) -> Resolved {
        let raw = args.raw.clone();
        let fallback = args.fallback.clone();
        match self.try_evaluate(args, guard) {
            Ok(current) => Resolved {
                current,
                raw,
                error: None,
            },
            Err(error) => {
                debug!("Expression #{} failed: {}", self.id, error);
                Resolved {
                    current: fallback,
                    raw,
                    error: Some(error.to_string()),
                }
            }
        }
    }

    /// Like [`Expression::evaluate`] but hands the error back.
    pub fn try_evaluate(self: &Arc<Self>, args: EvalArgs<'_>, guard: &mut CycleGuard) -> ExprResult<Value> {
        let mut deps = DependencyMap::new();
        let outcome = self.compute(&args, guard, &mut deps);
        self.sync.request(&self.ctx.scheduler, deps);
        outcome
    }

    fn compute(
        self: &Arc<Self>,
        args: &EvalArgs<'_>,
        guard: &mut CycleGuard,
        deps: &mut DependencyMap,
    ) -> ExprResult<Value> {
        let Some(ast) = self.setup()? else {
            return Ok(args.raw.clone());
        };

        let mut scope = Scope::new(self, args, guard, deps);
        let result = eval(&ast, &mut scope);
        let binding_used = scope.binding_used();

        let value = result.inspect_err(|error| {
            if error.is_syntax() {
                self.invalidate();
            }
        })?;

        if binding_used || deps.values().any(|dep| dep.tag.is_binding()) {
            return Ok(args.raw.clone());
        }
        if value.is_null() {
            return Ok(args.fallback.clone());
        }

        let value = match args.filter {
            Some(filter) => filter(value).map_err(ExprError::Filter)?,
            None => value,
        };
        Ok((args.coerce)(value))
    }

    /// Queue a rewrite of `from` into `to` at every `kind` call site, once per
    /// drain.
    pub(crate) fn schedule_rewrite(self: &Arc<Self>, kind: RefKind, from: &str, to: &str) {
        if !self.ctx.config.rewrite_references {
            return;
        }
        let key = TaskKey::Rewrite {
            owner: self.id,
            kind,
            from: from.to_string(),
        };
        let expression = Arc::downgrade(self);
        let (from, to) = (from.to_string(), to.to_string());
        self.ctx.scheduler.schedule(key, move || {
            if let Some(expression) = expression.upgrade() {
                expression.rewrite(kind, &from, &to);
            }
        });
    }

    fn rewrite(&self, kind: RefKind, from: &str, to: &str) {
        self.sync_source();
        let updated = {
            let mut source = self.source.write();
            let Some(text) = source.expression.as_deref() else {
                return;
            };
            let Some(updated) = rewrite_references(text, kind, from, to) else {
                return;
            };
            source.expression = Some(updated.clone());
            updated
        };

        info!("Rewrote {} reference `{}` to `{}` in expression #{}", kind, from, to, self.id);
        let hook = self.on_rewrite.read().clone();
        if let Some(hook) = hook {
            hook(&updated);
        }
    }

    pub fn set_rewrite_hook(&self, hook: RewriteHook) {
        *self.on_rewrite.write() = Some(hook);
    }

    pub fn set_source_provider(&self, provider: SourceProvider) {
        *self.provider.write() = Some(provider);
    }

    /// Pull the owner's current text, which may have been edited since the
    /// last evaluation.
    fn sync_source(&self) {
        let provider = self.provider.read().clone();
        if let Some(provider) = provider {
            let snapshot = provider();
            self.set_source(snapshot.mode, snapshot.expression);
        }
    }

    pub fn set_event_sink(&self, sink: EventSink) {
        self.sync.set_event_sink(sink);
    }

    pub fn binding_active(&self) -> bool {
        self.sync.binding_active()
    }

    pub fn subscriptions(&self) -> Vec<(DepKey, DepTag)> {
        self.sync.active()
    }

    pub fn bound_targets(&self) -> Vec<(String, Arc<dyn ParameterServer>)> {
        self.sync.bound_targets()
    }

    pub fn to_snapshot(&self) -> ExpressionSnapshot {
        self.source.read().clone()
    }

    pub fn apply_snapshot(&self, snapshot: &ExpressionSnapshot) {
        self.set_source(snapshot.mode, snapshot.expression.clone());
    }

    /// Release every subscription and forget learned links.
    pub fn cleanup(&self) {
        self.sync.cleanup();
        self.healer.clear();
        self.invalidate();
        debug!("Expression #{} disposed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_cache_follows_normalized_source() {
        let ctx = SurfaceContext::with_defaults();
        let expr = Expression::new(ctx);
        assert!(matches!(expr.setup(), Ok(None)));

        expr.set_source(Some(ValueMode::Expression), Some("=1 + 2;".into()));
        let first = expr.setup().unwrap().unwrap();
        expr.set_source(Some(ValueMode::Expression), Some("  = return 1 + 2 ".into()));
        let second = expr.setup().unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        expr.set_source(Some(ValueMode::Expression), Some("=function(){}".into()));
        assert!(expr.setup().unwrap_err().is_syntax());
        assert!(!expr.is_compiled());

        expr.set_source(Some(ValueMode::Value), Some("=1".into()));
        assert!(!expr.is_active());
    }

    #[test]
    fn guard_tracks_nesting() {
        let mut guard = CycleGuard::new();
        let id = EntityId::new();
        assert!(guard.enter(id, "a"));
        assert!(!guard.enter(id, "a"));
        assert!(guard.enter(id, "b"));
        guard.exit(id, "b");
        assert!(!guard.contains(id, "b"));
        assert_eq!(guard.depth(), 1);
    }

    #[test]
    fn snapshot_round_trips() {
        let expr = Expression::new(SurfaceContext::with_defaults());
        let snapshot = ExpressionSnapshot {
            mode: Some(ValueMode::Expression),
            expression: Some("=prop() * 2".into()),
        };
        expr.apply_snapshot(&snapshot);
        assert_eq!(expr.to_snapshot(), snapshot);
    }
}
