use thiserror::Error;

use crate::base::registry::EntityId;

#[derive(Debug, Error)]
pub enum SurfError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration file '{file}': {source}")]
    ConfigParseError {
        source: toml::de::Error,
        file: String,
    },

    #[error("Failed during serialization of TOML to path `{file}`: {source}")]
    ConfigSerializeError {
        source: toml::ser::Error,
        file: String,
    },

    #[error("Identifier `{token}` is already held by entity {holder}")]
    IdentifierTaken { token: String, holder: EntityId },
}

pub type SurfResult<T> = Result<T, SurfError>;
