use std::{path::PathBuf, sync::Arc};

use crate::{
    base::{SurfaceContext, meta::EngineConfig, url::UrlContext},
    utils::error::SurfResult,
};

/// Where the engine configuration of a new context comes from.
#[derive(Debug, Clone, Default)]
pub enum ConfigSource {
    /// Built-in defaults.
    #[default]
    Defaults,
    /// An explicit configuration value.
    Value(EngineConfig),
    /// A TOML file that must exist.
    File(PathBuf),
    /// [`EngineConfig::default_path`] if the file exists, defaults otherwise.
    DefaultPath,
}

/// Container used to request the creation of a [`SurfaceContext`].
#[derive(Debug, Clone, Default)]
pub struct SurfaceCreateInfo {
    pub config: ConfigSource,
    pub url: UrlContext,
}

/// Creates and initializes a new [`SurfaceContext`].
pub fn create_context(create_info: &SurfaceCreateInfo) -> SurfResult<Arc<SurfaceContext>> {
    SurfaceContext::create(create_info)
}
