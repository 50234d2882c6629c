//! Identifier registry and entity directory.
//!
//! Both are owned by a [`SurfaceContext`](crate::base::SurfaceContext) and only
//! hold weak references: an entity that is dropped without being destroyed
//! simply stops resolving.
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Weak},
};

use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use surfprop::utils::sanitize_identifier;
use uuid::Uuid;

use crate::{
    base::addressable::Addressable,
    utils::error::{SurfError, SurfResult},
};

/// Globally unique, stable identity of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        EntityId(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Registration {
    id: EntityId,
    entity: Weak<dyn Addressable>,
}

/// Maps sanitized user identifiers to their owning entity.
///
/// At most one live entity holds a given token.
#[derive(Default)]
pub struct IdentifierRegistry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entity` under `token`. Fails if another live entity holds it;
    /// re-registering the same entity is a no-op.
    pub fn register(&self, token: &str, entity: &Arc<dyn Addressable>) -> SurfResult<()> {
        let id = entity.entity_id();
        let mut entries = self.entries.write();

        if let Some(existing) = entries.get(token)
            && existing.id != id
            && existing.entity.strong_count() > 0
        {
            return Err(SurfError::IdentifierTaken {
                token: token.to_string(),
                holder: existing.id,
            });
        }

        info!("Registering identifier `{}` for entity {}", token, id);
        entries.insert(
            token.to_string(),
            Registration {
                id,
                entity: Arc::downgrade(entity),
            },
        );
        Ok(())
    }

    /// Remove `token` if, and only if, it is held by `id`.
    pub fn unregister(&self, token: &str, id: EntityId) -> bool {
        let mut entries = self.entries.write();
        match entries.get(token) {
            Some(existing) if existing.id == id => {
                entries.remove(token);
                info!("Unregistered identifier `{}` of entity {}", token, id);
                true
            }
            _ => false,
        }
    }

    /// Live entity registered under the sanitized form of `token`.
    pub fn lookup(&self, token: &str) -> Option<Arc<dyn Addressable>> {
        let token = sanitize_identifier(token);
        self.entries.read().get(&token)?.entity.upgrade()
    }

    pub fn holder(&self, token: &str) -> Option<EntityId> {
        self.entries.read().get(token).map(|r| r.id)
    }
}

/// Every entity of a context, by id.
#[derive(Default)]
pub struct EntityDirectory {
    entities: RwLock<BTreeMap<EntityId, Weak<dyn Addressable>>>,
}

impl EntityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity: &Arc<dyn Addressable>) {
        let id = entity.entity_id();
        debug!("Entity {} ({}) joined the directory", id, entity.i_type());
        self.entities.write().insert(id, Arc::downgrade(entity));
    }

    pub fn remove(&self, id: EntityId) {
        if self.entities.write().remove(&id).is_some() {
            debug!("Entity {} left the directory", id);
        }
    }

    pub fn get(&self, id: EntityId) -> Option<Arc<dyn Addressable>> {
        self.entities.read().get(&id)?.upgrade()
    }

    /// Live entities, dropping entries whose entity is gone.
    pub fn iter(&self) -> Vec<Arc<dyn Addressable>> {
        let mut stale = Vec::new();
        let live = self
            .entities
            .read()
            .iter()
            .filter_map(|(id, weak)| {
                let entity = weak.upgrade();
                if entity.is_none() {
                    stale.push(*id);
                }
                entity
            })
            .collect();

        if !stale.is_empty() {
            let mut entities = self.entities.write();
            for id in stale {
                entities.remove(&id);
            }
        }
        live
    }

    /// First entity whose sanitized name or identifier equals `token`.
    pub fn find_by_name(&self, token: &str) -> Option<Arc<dyn Addressable>> {
        let token = sanitize_identifier(token);
        self.iter()
            .into_iter()
            .find(|entity| sanitize_identifier(&entity.name()) == token || entity.identifier() == token)
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
