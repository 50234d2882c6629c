use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    magic::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_FORMULA_MARKER, ENV_ENGINE_CONFIG_PATH},
    utils::error::{SurfError, SurfResult},
};

/// Tunables of the expression and binding engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix stripped from expression text before compilation.
    pub formula_marker: String,

    /// Whether expression mode alone makes a property count as overridden.
    pub expression_overrides_value: bool,

    /// Recover references whose identifier no longer resolves through
    /// previously learned entity links.
    pub self_healing: bool,

    /// Rewrite stale identifiers in expression text once a link is recovered.
    pub rewrite_references: bool,

    /// Server token used by `osc('/addr')` when neither the expression nor an
    /// ancestor of the owner names a server.
    pub default_server: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            formula_marker: DEFAULT_FORMULA_MARKER.to_string(),
            expression_overrides_value: true,
            self_healing: true,
            rewrite_references: true,
            default_server: None,
        }
    }
}

impl EngineConfig {
    /// Get the default path to the engine configuration file.
    pub fn default_path() -> PathBuf {
        if let Ok(config_path) = std::env::var(ENV_ENGINE_CONFIG_PATH) {
            return config_path.into();
        }

        let mut path = PathBuf::new();

        #[cfg(target_os = "windows")]
        {
            if let Ok(appdata) = std::env::var("APPDATA") {
                path.push(appdata);
            }
        }
        #[cfg(not(target_os = "windows"))]
        {
            if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
                path.push(xdg_config_home);
            } else if let Ok(home) = std::env::var("HOME") {
                path.push(home);
                path.push(".config");
            }
        }

        path.push(CONFIG_DIR_NAME);
        path.push(CONFIG_FILE_NAME);
        path
    }

    /// Load an EngineConfig from a TOML file. Missing keys take their defaults.
    pub fn load_from_toml(path: &Path) -> SurfResult<Self> {
        let toml_str = std::fs::read_to_string(path)?;

        toml::from_str(&toml_str).map_err(|e| SurfError::ConfigParseError {
            source: e,
            file: path.display().to_string(),
        })
    }

    /// Save the EngineConfig to a TOML file, creating parent directories.
    pub fn save_to_toml(&self, path: &Path) -> SurfResult<()> {
        let toml_str = toml::to_string(self).map_err(|e| SurfError::ConfigSerializeError {
            source: e,
            file: path.display().to_string(),
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Strip the formula marker, a leading `return` and trailing semicolons.
    ///
    /// The result is what gets compiled and what keys the compile cache.
    pub fn normalize<'a>(&self, text: &'a str) -> &'a str {
        let mut src = text.trim();
        if !self.formula_marker.is_empty() {
            src = src.strip_prefix(self.formula_marker.as_str()).unwrap_or(src).trim_start();
        }
        if let Some(rest) = src.strip_prefix("return")
            && !rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
        {
            src = rest.trim_start();
        }
        src.trim_end_matches(|c: char| c == ';' || c.is_whitespace())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_marker_return_and_semicolons() {
        let config = EngineConfig::default();
        assert_eq!(config.normalize("  =prop('a:x') + 1 "), "prop('a:x') + 1");
        assert_eq!(config.normalize("= return 1 + 2;;"), "1 + 2");
        assert_eq!(config.normalize("returned"), "returned");
        assert_eq!(config.normalize("=="), "=");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str("self_healing = false\ndefault_server = \"mixer\"").unwrap();
        assert!(!config.self_healing);
        assert!(config.rewrite_references);
        assert_eq!(config.formula_marker, "=");
        assert_eq!(config.default_server.as_deref(), Some("mixer"));
    }

    #[test]
    fn config_round_trips_through_file() {
        let dir = std::env::temp_dir().join(format!("surfcore-conf-{}", std::process::id()));
        let path = dir.join("nested").join("engine.toml");
        let config = EngineConfig {
            formula_marker: "$".into(),
            default_server: Some("main".into()),
            ..Default::default()
        };
        config.save_to_toml(&path).unwrap();
        assert_eq!(EngineConfig::load_from_toml(&path).unwrap(), config);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::load_from_toml(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, SurfError::IoError(_)));
    }
}
