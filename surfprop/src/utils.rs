use strum::{EnumIs, EnumTryAs};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, EnumTryAs, Error)]
pub enum Error {
    /// A snapshot targets a leaf where the tree holds a container, or the reverse.
    #[error(
        "Snapshot shape does not match the property tree at `{path}`: expected a {expected}, found a {found}."
    )]
    ShapeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// No node exists at the given dotted path.
    #[error("No property exists at path `{0}`.")]
    UnknownPath(String),

    /// The node at the given path is a container where a leaf was required.
    #[error("The node at `{0}` is a property group, not a property.")]
    NotALeaf(String),

    /// A user-supplied filter function rejected a value.
    #[error("Filter rejected the value: {0}")]
    FilterRejected(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Normalize a human identifier into a registry token.
///
/// Lower-cases, trims, collapses whitespace runs into a single underscore and
/// strips every character outside `[a-z0-9_-]`.
///
/// ```rust
/// # use surfprop::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("  Main Mixer  "), "main_mixer");
/// assert_eq!(sanitize_identifier("Dev-A/01"), "dev-a01");
/// assert_eq!(sanitize_identifier("devA"), "deva");
/// ```
pub fn sanitize_identifier(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_inner_whitespace() {
        assert_eq!(sanitize_identifier("a \t  b\nc"), "a_b_c");
        assert_eq!(sanitize_identifier(""), "");
        assert_eq!(sanitize_identifier("   "), "");
    }

    #[test]
    fn sanitize_strips_foreign_characters() {
        assert_eq!(sanitize_identifier("Café №1!"), "caf_1");
        assert_eq!(sanitize_identifier("dev_a"), "dev_a");
    }
}
