//! Self-healing of identifier references.
//!
//! While expressions resolve successfully the [`Healer`] learns which entity
//! each token pointed at. When a token stops resolving because its entity was
//! renamed, the learned link recovers the entity and the expression text is
//! rewritten to the entity's current identifier.
use std::collections::HashMap;

use log::debug;
use parking_lot::Mutex;
use strum::Display;

use crate::base::registry::EntityId;

/// Syntactic call site kind a token appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RefKind {
    Prop,
    Osc,
    Bind,
}

/// Learned token/entity links of one expression.
#[derive(Default)]
pub struct Healer {
    links: Mutex<HashMap<String, EntityId>>,
}

impl Healer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `token` (sanitized) resolved to `id`.
    pub fn learn(&self, token: &str, id: EntityId) {
        let mut links = self.links.lock();
        if links.insert(token.to_string(), id) != Some(id) {
            debug!("Learned link `{}` -> {}", token, id);
        }
    }

    /// Entity previously reached through `token`.
    pub fn recall(&self, token: &str) -> Option<EntityId> {
        self.links.lock().get(token).copied()
    }

    pub fn clear(&self) {
        self.links.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.links.lock().is_empty()
    }
}

/// Replace `from` by `to` at every `kind` call site of `text`, in both quote
/// styles. Returns `None` when nothing matched.
///
/// ```rust
/// # use surfcore::expr::heal::{RefKind, rewrite_references};
/// let text = "=osc('devA:/x') + osc(\"devA:/y\") + prop('devA:z')";
/// assert_eq!(
///     rewrite_references(text, RefKind::Osc, "devA", "dev_a").as_deref(),
///     Some("=osc('dev_a:/x') + osc(\"dev_a:/y\") + prop('devA:z')")
/// );
/// ```
pub fn rewrite_references(text: &str, kind: RefKind, from: &str, to: &str) -> Option<String> {
    if from.is_empty() || from == to {
        return None;
    }

    let suffixes: &[&str] = match kind {
        RefKind::Prop => &[":", "."],
        RefKind::Osc | RefKind::Bind => &[":/"],
    };

    let mut out = text.to_string();
    for quote in ['\'', '"'] {
        for suffix in suffixes {
            let needle = format!("{kind}({quote}{from}{suffix}");
            let replacement = format!("{kind}({quote}{to}{suffix}");
            out = out.replace(&needle, &replacement);
        }
    }

    (out != text).then_some(out)
}
