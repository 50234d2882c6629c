//! Reference resolution for one evaluation.
//!
//! Selectors of `prop('<selector>:<path>')`:
//! - empty or `this`: the owning entity
//! - `parent`, `parent.parent.<name>`...: ownership hops from the owner,
//!   then descendant names
//! - anything else: an identifier token, looked up in the registry, then by
//!   name in the directory, then through links learned by the [`Healer`].
//!   Further dotted segments descend into children by name, and a trailing
//!   `.parent` run hops upward from the entity found.
//!
//! [`Healer`]: crate::expr::heal::Healer
use std::sync::Arc;

use log::info;
use smallvec::SmallVec;
use surfprop::{Property, Value, utils::sanitize_identifier};

use crate::{
    base::{addressable::Addressable, server::ParameterServer},
    expr::{
        bound::BoundExpression,
        error::{ExprError, ExprResult},
        expression::{CycleGuard, EvalArgs, Expression},
        heal::RefKind,
        interp::Resolvers,
        sync::{DepKey, DepTag, Dependency, DependencyMap, record_dependency},
    },
};

pub(crate) struct Scope<'a, 'b> {
    expression: &'a Arc<Expression>,
    args: &'a EvalArgs<'b>,
    guard: &'a mut CycleGuard,
    deps: &'a mut DependencyMap,
    binding_used: bool,
}

/// `fallback` if the call supplied one, `error` otherwise.
fn or_fallback(fallback: Option<Value>, error: ExprError) -> ExprResult<Value> {
    fallback.ok_or(error)
}

impl<'a, 'b> Scope<'a, 'b> {
    pub(crate) fn new(
        expression: &'a Arc<Expression>,
        args: &'a EvalArgs<'b>,
        guard: &'a mut CycleGuard,
        deps: &'a mut DependencyMap,
    ) -> Self {
        Self {
            expression,
            args,
            guard,
            deps,
            binding_used: false,
        }
    }

    pub(crate) fn binding_used(&self) -> bool {
        self.binding_used
    }

    /// Resolve an identifier token to an entity, learning the link and
    /// scheduling a rewrite when the written token is stale.
    fn resolve_token(&self, kind: RefKind, written: &str) -> ExprResult<Arc<dyn Addressable>> {
        let token = sanitize_identifier(written);
        let ctx = self.expression.context();

        let found = if token.is_empty() {
            None
        } else {
            ctx.registry
                .lookup(&token)
                .or_else(|| ctx.directory.find_by_name(&token))
        };

        let entity = match found {
            Some(entity) => entity,
            None => {
                let healed = if ctx.config.self_healing {
                    self.expression
                        .healer()
                        .recall(&token)
                        .and_then(|id| ctx.directory.get(id))
                } else {
                    None
                };
                let entity = healed.ok_or_else(|| ExprError::UnknownEntity(written.to_string()))?;
                info!(
                    "Recovered stale reference `{}` through entity {} (now `{}`)",
                    written,
                    entity.entity_id(),
                    entity.identifier()
                );
                entity
            }
        };

        self.expression.healer().learn(&token, entity.entity_id());
        let preferred = entity.identifier();
        if !preferred.is_empty() && preferred != token {
            self.expression.schedule_rewrite(kind, written, &preferred);
        }
        Ok(entity)
    }

    fn resolve_selector(&self, selector: &str) -> ExprResult<Arc<dyn Addressable>> {
        let owner = self.args.owner.clone();
        if selector.is_empty() || selector == "this" {
            return Ok(owner);
        }

        let unknown = || ExprError::UnknownEntity(selector.to_string());
        let segments: SmallVec<&str, 4> = selector.split('.').map(str::trim).collect();

        if matches!(segments[0], "this" | "parent") {
            let mut current = owner;
            for segment in &segments {
                current = match *segment {
                    "this" => current,
                    "parent" => current.parent().ok_or_else(unknown)?,
                    name => current.child(name).ok_or_else(unknown)?,
                };
            }
            return Ok(current);
        }

        let mut end = segments.len();
        while end > 1 && segments[end - 1] == "parent" {
            end -= 1;
        }

        let mut entity = self.resolve_token(RefKind::Prop, segments[0])?;
        for name in &segments[1..end] {
            entity = entity.child(name).ok_or_else(unknown)?;
        }
        for _ in end..segments.len() {
            entity = entity.parent().ok_or_else(unknown)?;
        }
        Ok(entity)
    }

    /// Current value of another property, evaluating its expression within
    /// this evaluation's cycle guard.
    fn read_property(
        &mut self,
        label: &str,
        property: &Property,
        fallback: Option<Value>,
    ) -> ExprResult<Value> {
        if property.is_expression_active()
            && let Some(bound) = property
                .runtime()
                .and_then(|runtime| runtime.downcast_arc::<BoundExpression>().ok())
        {
            return match bound.evaluate_nested(property, fallback.as_ref(), self.guard) {
                Ok(value) => Ok(value),
                Err(error) if error.is_cycle() => Err(error),
                Err(error) => or_fallback(
                    fallback,
                    ExprError::Nested {
                        path: label.to_string(),
                        message: error.to_string(),
                    },
                ),
            };
        }

        let resolved = property.get_resolved(fallback.as_ref());
        match resolved.error {
            None => Ok(resolved.current),
            Some(message) => or_fallback(
                fallback,
                ExprError::Nested {
                    path: label.to_string(),
                    message,
                },
            ),
        }
    }

    /// Server named by `token`, else the closest ancestor server, else the
    /// configured default.
    fn resolve_server(
        &self,
        kind: RefKind,
        token: Option<&str>,
    ) -> ExprResult<(Arc<dyn Addressable>, Arc<dyn ParameterServer>)> {
        if let Some(token) = token {
            let entity = self.resolve_token(kind, token)?;
            let server = entity
                .server()
                .ok_or_else(|| ExprError::NotAServer(token.to_string()))?;
            return Ok((entity, server));
        }

        let mut current = Some(self.args.owner.clone());
        while let Some(entity) = current {
            if let Some(server) = entity.server() {
                return Ok((entity, server));
            }
            current = entity.parent();
        }

        match &self.expression.context().config.default_server {
            Some(token) => self.resolve_server(kind, Some(token.as_str())),
            None => Err(ExprError::NoServer(self.args.owner.name())),
        }
    }

    /// Resolve `[server:]/address`, record the dependency and return the
    /// remote node's current value.
    fn remote(&mut self, tag: DepTag, path: &str) -> ExprResult<Value> {
        let kind = match tag {
            DepTag::Osc => RefKind::Osc,
            DepTag::Binding => RefKind::Bind,
        };

        let trimmed = path.trim();
        let (token, address) = if trimmed.starts_with('/') {
            (None, trimmed)
        } else {
            match trimmed.split_once(':') {
                Some((token, address)) => (Some(token.trim()), address.trim()),
                None => return Err(ExprError::InvalidAddress(path.to_string())),
            }
        };
        if !address.starts_with('/') {
            return Err(ExprError::InvalidAddress(path.to_string()));
        }

        let (entity, server) = self.resolve_server(kind, token)?;
        record_dependency(
            self.deps,
            DepKey {
                server: entity.entity_id(),
                address: address.to_string(),
            },
            Dependency {
                tag,
                server: server.clone(),
            },
        );

        if !server.structure_ready() {
            return Err(ExprError::ServerNotReady(entity.identifier()));
        }
        server
            .get_node(address)
            .map(|node| node.value())
            .ok_or_else(|| ExprError::UnknownAddress {
                server: entity.identifier(),
                address: address.to_string(),
            })
    }
}

impl Resolvers for Scope<'_, '_> {
    fn prop(&mut self, key: Option<&str>, fallback: Option<Value>) -> ExprResult<Value> {
        let Some(key) = key else {
            return Ok(self.args.raw.clone());
        };

        let (selector, path) = match key.split_once(':') {
            Some((selector, path)) => (selector.trim(), path.trim()),
            None => ("", key.trim()),
        };

        let target = match self.resolve_selector(selector) {
            Ok(target) => target,
            Err(error) => return or_fallback(fallback, error),
        };
        let Some(property) = target.property(path) else {
            return or_fallback(
                fallback,
                ExprError::UnknownProperty {
                    entity: target.identifier(),
                    path: path.to_string(),
                },
            );
        };

        let target_id = target.entity_id();
        let label = format!("{}:{}", target.identifier(), path);
        if target_id == self.args.owner.entity_id() && path == self.args.path {
            return Err(ExprError::SelfReference(label));
        }
        if self.guard.contains(target_id, path) {
            return Err(ExprError::Cycle {
                entity: target.identifier(),
                path: path.to_string(),
            });
        }

        self.read_property(&label, &property, fallback)
    }

    fn osc(&mut self, path: &str, fallback: Option<Value>) -> ExprResult<Value> {
        match self.remote(DepTag::Osc, path) {
            Ok(value) => Ok(value),
            Err(error) => or_fallback(fallback, error),
        }
    }

    fn bind(&mut self, path: &str, fallback: Option<Value>) -> ExprResult<Value> {
        self.binding_used = true;
        match self.remote(DepTag::Binding, path) {
            Ok(_) => Ok(self.args.raw.clone()),
            Err(error) => or_fallback(fallback, error),
        }
    }

    fn url(&mut self, key: &str, fallback: Option<Value>) -> ExprResult<Value> {
        Ok(self
            .expression
            .context()
            .lookup_url(key)
            .or(fallback)
            .unwrap_or_default())
    }
}
