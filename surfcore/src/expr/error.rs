use strum::{EnumIs, EnumTryAs};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, EnumIs, EnumTryAs, Error)]
pub enum ExprError {
    /// Lexing or parsing failed; carries one diagnostic per problem.
    #[error("Syntax error: {}", .0.join("; "))]
    Syntax(Vec<String>),

    #[error("{0}")]
    Type(String),

    #[error("No entity matches `{0}`")]
    UnknownEntity(String),

    #[error("Entity `{entity}` has no property `{path}`")]
    UnknownProperty { entity: String, path: String },

    #[error("Entity `{0}` is not a parameter server")]
    NotAServer(String),

    #[error("No parameter server is reachable from `{0}`")]
    NoServer(String),

    #[error("Parameter server `{0}` has not loaded its structure yet")]
    ServerNotReady(String),

    #[error("Address `{address}` does not exist on `{server}`")]
    UnknownAddress { server: String, address: String },

    #[error("Invalid address `{0}`: expected `[server:]/address`")]
    InvalidAddress(String),

    #[error("Property `{0}` references itself (self-reference)")]
    SelfReference(String),

    #[error("Reference cycle through `{entity}:{path}`")]
    Cycle { entity: String, path: String },

    #[error("Referenced property `{path}` failed: {message}")]
    Nested { path: String, message: String },

    #[error("Filter rejected the value: {0}")]
    Filter(String),
}

pub type ExprResult<T> = Result<T, ExprError>;
