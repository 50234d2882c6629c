//! Entities owning a property tree.
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use surfprop::{
    ContainerDefinition, ContainerSnapshot, Property, PropertyContainer, PropertyNode, PropertyType,
    Resolved, SingleDefinition, SnapshotMode, Value,
    node::ObserverId,
    utils::{Error as PropError, sanitize_identifier},
};

use crate::{
    base::{
        SurfaceContext,
        addressable::Addressable,
        registry::EntityId,
        server::ParameterServer,
    },
    expr::BoundExpression,
    magic::USER_ID_KEY,
};

/// Source of an entity's property definitions.
///
/// Queried on construction and on every [`InspectableWithProps::setup_props`],
/// so implementations may return different trees over time.
pub trait PropertyDefinitions: Send + Sync {
    fn property_definitions(&self) -> ContainerDefinition;
}

impl PropertyDefinitions for ContainerDefinition {
    fn property_definitions(&self) -> ContainerDefinition {
        self.clone()
    }
}

/// Persisted state of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub props: ContainerSnapshot,
}

/// An addressable entity with a property tree, e.g. a board, a widget or a
/// parameter server.
///
/// Every leaf gets a [`BoundExpression`] when it is created, and the entity
/// keeps its registry token in step with its `userID` property.
pub struct InspectableWithProps {
    id: EntityId,
    i_type: String,
    ctx: Arc<SurfaceContext>,
    definitions: Arc<dyn PropertyDefinitions>,
    me: Weak<InspectableWithProps>,
    name: RwLock<String>,
    props: Arc<PropertyContainer>,
    parent: RwLock<Option<Weak<InspectableWithProps>>>,
    children: RwLock<Vec<Arc<InspectableWithProps>>>,
    server: RwLock<Option<Arc<dyn ParameterServer>>>,
    registered: Mutex<Option<String>>,
    user_id_observer: Mutex<Option<(Weak<Property>, ObserverId)>>,
}

impl InspectableWithProps {
    pub fn create(
        ctx: &Arc<SurfaceContext>,
        i_type: &str,
        name: &str,
        definitions: Arc<dyn PropertyDefinitions>,
    ) -> Arc<Self> {
        let entity = Arc::new_cyclic(|me: &Weak<Self>| {
            let owner: Weak<dyn Addressable> = me.clone();
            let definition = Self::complete_definitions(definitions.as_ref());
            let props = PropertyContainer::build(Arc::new(definition), "", &mut |path: &str, prop: &Arc<Property>| {
                BoundExpression::attach(ctx.clone(), owner.clone(), path, prop);
            });

            Self {
                id: EntityId::new(),
                i_type: i_type.to_string(),
                ctx: ctx.clone(),
                definitions,
                me: me.clone(),
                name: RwLock::new(name.to_string()),
                props,
                parent: RwLock::new(None),
                children: RwLock::new(Vec::new()),
                server: RwLock::new(None),
                registered: Mutex::new(None),
                user_id_observer: Mutex::new(None),
            }
        });

        let as_dyn: Arc<dyn Addressable> = entity.clone();
        ctx.directory.insert(&as_dyn);
        entity.track_user_id();
        entity
    }

    /// Provider definitions plus the reserved `userID` leaf.
    fn complete_definitions(definitions: &dyn PropertyDefinitions) -> ContainerDefinition {
        let mut definition = definitions.property_definitions();
        if !definition.contains(USER_ID_KEY) {
            definition.insert(
                USER_ID_KEY,
                SingleDefinition::new(USER_ID_KEY, PropertyType::String, ""),
            );
        }
        definition
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn context(&self) -> &Arc<SurfaceContext> {
        &self.ctx
    }

    /// Current definitions, including the reserved `userID` leaf.
    pub fn property_definitions(&self) -> ContainerDefinition {
        Self::complete_definitions(self.definitions.as_ref())
    }

    pub fn props(&self) -> &Arc<PropertyContainer> {
        &self.props
    }

    pub fn set_name(&self, name: &str) {
        *self.name.write() = name.to_string();
    }

    /// Sanitized `userID`, empty when unset.
    pub fn user_token(&self) -> String {
        self.props
            .property(USER_ID_KEY)
            .map(|prop| sanitize_identifier(&prop.get_raw().to_string()))
            .unwrap_or_default()
    }

    /// Rebuild the tree from the current definitions, keeping every node
    /// whose definition kept its shape.
    pub fn setup_props(&self) {
        let owner: Weak<dyn Addressable> = self.me.clone();
        let definition = Arc::new(self.property_definitions());
        let ctx = self.ctx.clone();
        self.props.reconcile(definition, "", &mut |path: &str, prop: &Arc<Property>| {
            BoundExpression::attach(ctx.clone(), owner.clone(), path, prop);
        });
        self.track_user_id();
    }

    pub fn get_prop(&self, path: &str) -> Option<PropertyNode> {
        self.props.get(path)
    }

    /// Resolved value of the leaf at `path`.
    pub fn get_resolved(&self, path: &str, fallback: Option<&Value>) -> Option<Resolved> {
        Some(self.props.property(path)?.get_resolved(fallback))
    }

    /// Whether the leaf at `path` differs from its default. Expression mode
    /// counts as overridden when the configuration says so.
    pub fn is_value_overridden(&self, path: &str) -> Option<bool> {
        let prop = self.props.property(path)?;
        Some(prop.is_value_overridden(self.ctx.config.expression_overrides_value))
    }

    pub fn to_snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            name: Some(self.name.read().clone()),
            props: self.props.to_snapshot().unwrap_or_default(),
        }
    }

    /// Reconcile against the current definitions, then apply `snapshot`.
    /// Parts that do not fit the tree are skipped and returned.
    pub fn apply_snapshot(&self, snapshot: &EntitySnapshot, mode: SnapshotMode) -> Vec<PropError> {
        self.setup_props();
        if let Some(name) = &snapshot.name {
            self.set_name(name);
        }
        let issues = self.props.apply_snapshot(&snapshot.props, mode, "");
        self.refresh_registration();
        issues
    }

    fn track_user_id(&self) {
        let Some(prop) = self.props.property(USER_ID_KEY) else {
            return;
        };

        let mut observer = self.user_id_observer.lock();
        if let Some((tracked, _)) = observer.as_ref()
            && tracked.upgrade().is_some_and(|tracked| Arc::ptr_eq(&tracked, &prop))
        {
            return;
        }
        if let Some((tracked, id)) = observer.take()
            && let Some(tracked) = tracked.upgrade()
        {
            tracked.unobserve(id);
        }

        let me = self.me.clone();
        let id = prop.observe(move |_| {
            if let Some(entity) = me.upgrade() {
                entity.refresh_registration();
            }
        });
        *observer = Some((Arc::downgrade(&prop), id));
        drop(observer);
        self.refresh_registration();
    }

    /// Bring the registry in line with the current `userID`.
    pub fn refresh_registration(&self) {
        let token = self.user_token();
        let mut registered = self.registered.lock();
        if registered.as_deref() == Some(token.as_str()) || (registered.is_none() && token.is_empty()) {
            return;
        }

        if let Some(previous) = registered.take() {
            self.ctx.registry.unregister(&previous, self.id);
        }
        if token.is_empty() {
            return;
        }

        let Some(me) = self.me.upgrade() else {
            return;
        };
        let me: Arc<dyn Addressable> = me;
        match self.ctx.registry.register(&token, &me) {
            Ok(()) => *registered = Some(token),
            Err(error) => warn!("Entity `{}` keeps no identifier: {}", self.name.read(), error),
        }
    }

    /// Token this entity currently holds in the registry.
    pub fn registered_token(&self) -> Option<String> {
        self.registered.lock().clone()
    }

    pub fn set_server(&self, server: Option<Arc<dyn ParameterServer>>) {
        *self.server.write() = server;
    }

    pub fn attach_child(&self, child: &Arc<InspectableWithProps>) {
        child.detach();
        *child.parent.write() = Some(self.me.clone());
        self.children.write().push(child.clone());
        debug!("Entity {} attached under {}", child.id, self.id);
    }

    /// Remove this entity from its parent.
    pub fn detach(&self) {
        let parent = self.parent.write().take().and_then(|parent| parent.upgrade());
        if let Some(parent) = parent {
            parent.children.write().retain(|child| child.id != self.id);
        }
    }

    /// Dispose the entity and its descendants: release identifiers,
    /// subscriptions and directory entries.
    pub fn destroy(&self) {
        let children = std::mem::take(&mut *self.children.write());
        for child in children {
            *child.parent.write() = None;
            child.destroy();
        }
        self.detach();

        if let Some(token) = self.registered.lock().take() {
            self.ctx.registry.unregister(&token, self.id);
        }
        if let Some((tracked, id)) = self.user_id_observer.lock().take()
            && let Some(tracked) = tracked.upgrade()
        {
            tracked.unobserve(id);
        }
        self.props.cleanup();
        self.ctx.directory.remove(self.id);
        info!("Destroyed entity `{}` ({})", self.name.read(), self.id);
    }
}

impl Addressable for InspectableWithProps {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn i_type(&self) -> String {
        self.i_type.clone()
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn identifier(&self) -> String {
        let token = self.user_token();
        if token.is_empty() {
            sanitize_identifier(&self.name.read())
        } else {
            token
        }
    }

    fn parent(&self) -> Option<Arc<dyn Addressable>> {
        let parent = self.parent.read().as_ref()?.upgrade()?;
        Some(parent)
    }

    fn children(&self) -> Vec<Arc<dyn Addressable>> {
        self.children
            .read()
            .iter()
            .map(|child| child.clone() as Arc<dyn Addressable>)
            .collect()
    }

    fn property(&self, path: &str) -> Option<Arc<Property>> {
        self.props.property(path)
    }

    fn server(&self) -> Option<Arc<dyn ParameterServer>> {
        self.server.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use surfprop::{PropertySnapshot, ValueMode};

    use crate::base::meta::EngineConfig;

    use super::*;

    fn gain_definitions() -> Arc<dyn PropertyDefinitions> {
        Arc::new(
            ContainerDefinition::new("fader")
                .child("gain", SingleDefinition::new("gain", PropertyType::Float, 0.0))
                .child(
                    "style",
                    ContainerDefinition::new("style")
                        .child("color", SingleDefinition::new("color", PropertyType::Color, "#ff0000")),
                ),
        )
    }

    #[test]
    fn user_id_is_reserved_and_tracked() {
        let ctx = SurfaceContext::with_defaults();
        let fader = InspectableWithProps::create(&ctx, "widget", "Fader 1", gain_definitions());
        assert!(fader.get_prop(USER_ID_KEY).is_some());
        assert_eq!(fader.identifier(), "fader_1");
        assert_eq!(fader.registered_token(), None);

        fader.property(USER_ID_KEY).unwrap().set("Main Gain");
        assert_eq!(fader.registered_token().as_deref(), Some("main_gain"));
        assert_eq!(ctx.registry.holder("main_gain"), Some(fader.id()));

        fader.property(USER_ID_KEY).unwrap().set("other");
        assert_eq!(ctx.registry.holder("main_gain"), None);
        assert_eq!(ctx.registry.holder("other"), Some(fader.id()));
    }

    #[test]
    fn colliding_identifier_is_refused() {
        let ctx = SurfaceContext::with_defaults();
        let first = InspectableWithProps::create(&ctx, "widget", "a", gain_definitions());
        let second = InspectableWithProps::create(&ctx, "widget", "b", gain_definitions());
        first.property(USER_ID_KEY).unwrap().set("same");
        second.property(USER_ID_KEY).unwrap().set("same");
        assert_eq!(ctx.registry.holder("same"), Some(first.id()));
        assert_eq!(second.registered_token(), None);

        first.destroy();
        second.refresh_registration();
        assert_eq!(ctx.registry.holder("same"), Some(second.id()));
    }

    #[test]
    fn snapshot_modes() {
        let ctx = SurfaceContext::with_defaults();
        let fader = InspectableWithProps::create(&ctx, "widget", "f", gain_definitions());
        fader.property("gain").unwrap().set(0.5);
        fader.property("style.color").unwrap().set("#00ff00");

        let mut snapshot = EntitySnapshot::default();
        snapshot.props.children.insert(
            "gain".into(),
            PropertySnapshot {
                value: Value::Float(0.25),
                mode: Some(ValueMode::Value),
                ..Default::default()
            }
            .into(),
        );

        assert!(fader.apply_snapshot(&snapshot, SnapshotMode::Patch).is_empty());
        assert_eq!(fader.property("gain").unwrap().get_raw(), Value::Float(0.25));
        assert!(!fader.property("style.color").unwrap().is_default_state());

        fader.apply_snapshot(&snapshot, SnapshotMode::Replace);
        assert!(fader.property("style.color").unwrap().is_default_state());
    }

    #[test]
    fn expression_mode_override_follows_config() {
        for (counts, expected) in [(true, true), (false, false)] {
            let ctx = SurfaceContext::with_config(EngineConfig {
                expression_overrides_value: counts,
                ..Default::default()
            });
            let fader = InspectableWithProps::create(&ctx, "widget", "f", gain_definitions());
            assert_eq!(fader.is_value_overridden("gain"), Some(false));
            fader.property("gain").unwrap().set_formula("=1");
            assert_eq!(fader.is_value_overridden("gain"), Some(expected));
        }
        let ctx = SurfaceContext::with_defaults();
        let fader = InspectableWithProps::create(&ctx, "widget", "f", gain_definitions());
        assert_eq!(fader.is_value_overridden("nope"), None);
    }

    #[test]
    fn hierarchy_and_destroy() {
        let ctx = SurfaceContext::with_defaults();
        let board = InspectableWithProps::create(&ctx, "board", "Board", gain_definitions());
        let fader = InspectableWithProps::create(&ctx, "widget", "Fader", gain_definitions());
        board.attach_child(&fader);
        assert_eq!(fader.parent().unwrap().entity_id(), board.id());
        assert_eq!(board.child("fader").unwrap().entity_id(), fader.id());
        assert_eq!(ctx.directory.len(), 2);

        board.destroy();
        assert!(ctx.directory.is_empty());
        assert!(fader.parent().is_none());
    }
}
