use std::sync::Arc;

use log::{debug, info};
use parking_lot::{Mutex, RwLock};

use crate::{
    base::{
        api::{ConfigSource, SurfaceCreateInfo},
        meta::EngineConfig,
        registry::{EntityDirectory, EntityId, IdentifierRegistry},
        url::UrlContext,
    },
    sched::Scheduler,
    utils::error::SurfResult,
};

pub mod addressable;
pub mod api;
pub mod inspectable;
pub mod meta;
pub mod registry;
pub mod server;
pub mod url;

/// A property whose displayed value may have changed because a remote value
/// it reads was updated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Invalidation {
    pub entity: EntityId,
    pub path: String,
}

/// Application root: owns the registry, the entity directory and the deferred
/// work queue shared by every entity and expression.
pub struct SurfaceContext {
    pub config: EngineConfig,
    pub registry: IdentifierRegistry,
    pub directory: EntityDirectory,
    pub scheduler: Scheduler,
    url: RwLock<UrlContext>,
    invalidations: Mutex<Vec<Invalidation>>,
}

impl SurfaceContext {
    pub fn create(create_info: &SurfaceCreateInfo) -> SurfResult<Arc<Self>> {
        let config = match &create_info.config {
            ConfigSource::Defaults => EngineConfig::default(),
            ConfigSource::Value(config) => config.clone(),
            ConfigSource::File(path) => EngineConfig::load_from_toml(path)?,
            ConfigSource::DefaultPath => {
                let path = EngineConfig::default_path();
                if path.is_file() {
                    info!("Loading engine configuration from `{}`", path.display());
                    EngineConfig::load_from_toml(&path)?
                } else {
                    debug!("No engine configuration at `{}`, using defaults", path.display());
                    EngineConfig::default()
                }
            }
        };

        Ok(Arc::new(Self {
            config,
            registry: IdentifierRegistry::new(),
            directory: EntityDirectory::new(),
            scheduler: Scheduler::new(),
            url: RwLock::new(create_info.url.clone()),
            invalidations: Mutex::new(Vec::new()),
        }))
    }

    /// Context with default configuration.
    pub fn with_defaults() -> Arc<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: IdentifierRegistry::new(),
            directory: EntityDirectory::new(),
            scheduler: Scheduler::new(),
            url: RwLock::new(UrlContext::default()),
            invalidations: Mutex::new(Vec::new()),
        })
    }

    /// Run the deferred work of one turn. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        self.scheduler.drain()
    }

    pub fn url(&self) -> UrlContext {
        self.url.read().clone()
    }

    pub fn set_url(&self, url: UrlContext) {
        *self.url.write() = url;
    }

    pub(crate) fn lookup_url(&self, key: &str) -> Option<surfprop::value::Value> {
        self.url.read().lookup(key)
    }

    pub fn invalidate(&self, entity: EntityId, path: &str) {
        let mut invalidations = self.invalidations.lock();
        let invalidation = Invalidation {
            entity,
            path: path.to_string(),
        };
        if !invalidations.contains(&invalidation) {
            invalidations.push(invalidation);
        }
    }

    /// Drain the properties invalidated since the last call.
    pub fn take_invalidations(&self) -> Vec<Invalidation> {
        std::mem::take(&mut *self.invalidations.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_is_used() {
        let info = SurfaceCreateInfo {
            config: ConfigSource::Value(EngineConfig {
                self_healing: false,
                ..Default::default()
            }),
            url: UrlContext::from_url("/?a=1"),
        };
        let ctx = SurfaceContext::create(&info).unwrap();
        assert!(!ctx.config.self_healing);
        assert_eq!(ctx.lookup_url("query.a"), Some("1".into()));
    }

    #[test]
    fn missing_config_file_fails_creation() {
        let info = SurfaceCreateInfo {
            config: ConfigSource::File("/no/such/engine.toml".into()),
            ..Default::default()
        };
        assert!(SurfaceContext::create(&info).is_err());
    }

    #[test]
    fn invalidations_are_deduplicated_and_drained() {
        let ctx = SurfaceContext::with_defaults();
        let id = EntityId::new();
        ctx.invalidate(id, "x");
        ctx.invalidate(id, "x");
        ctx.invalidate(id, "y");
        assert_eq!(ctx.take_invalidations().len(), 2);
        assert!(ctx.take_invalidations().is_empty());
    }
}
