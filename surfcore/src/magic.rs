/// Name of the environment variable containing the path to the engine configuration file.
/// If not set, defaults to
///  (1) on Linux and macOS: `$XDG_CONFIG_HOME/surface/engine.toml` or `$HOME/.config/surface/engine.toml`
///  (2) on Windows: `%APPDATA%\surface\engine.toml`
pub const ENV_ENGINE_CONFIG_PATH: &str = "SURF_CONFIG_PATH";

/// Directory and file name of the engine configuration below the platform config root.
pub const CONFIG_DIR_NAME: &str = "surface";
pub const CONFIG_FILE_NAME: &str = "engine.toml";

/// Prefix marking property text as a formula.
pub const DEFAULT_FORMULA_MARKER: &str = "=";

/// Reserved property holding the user-facing identifier of an entity.
pub const USER_ID_KEY: &str = "userID";
