use std::sync::Arc;

use surfprop::{node::Property, utils::sanitize_identifier};

use crate::base::{registry::EntityId, server::ParameterServer};

/// Capabilities the expression resolver needs from any entity it can reach.
///
/// Boards, widgets and parameter servers all implement this; resolution never
/// depends on concrete entity types.
pub trait Addressable: Send + Sync {
    fn entity_id(&self) -> EntityId;

    /// Category tag, e.g. `"server"` or `"widget"`.
    fn i_type(&self) -> String;

    fn name(&self) -> String;

    /// Registry token: the sanitized user identifier, else the sanitized name.
    fn identifier(&self) -> String;

    fn parent(&self) -> Option<Arc<dyn Addressable>>;

    fn children(&self) -> Vec<Arc<dyn Addressable>>;

    /// Direct child whose sanitized name or identifier matches `name`.
    fn child(&self, name: &str) -> Option<Arc<dyn Addressable>> {
        let token = sanitize_identifier(name);
        self.children()
            .into_iter()
            .find(|child| child.identifier() == token || sanitize_identifier(&child.name()) == token)
    }

    /// Leaf property at a dotted path.
    fn property(&self, path: &str) -> Option<Arc<Property>>;

    fn server(&self) -> Option<Arc<dyn ParameterServer>> {
        None
    }
}
