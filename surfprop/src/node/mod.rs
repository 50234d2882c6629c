//! Live property trees.
//!
//! A tree is made of [`PropertyNode`]s: leaves ([`Property`]) hold a value,
//! groups ([`PropertyContainer`]) hold named children. Nodes are shared behind
//! `Arc` so that expression runtimes, bindings and editors can keep handles to
//! a leaf while its owner reconciles the tree.
use std::sync::Arc;

use strum::{EnumIs, EnumTryAs};

use crate::{
    definition::PropertyDefinition,
    snapshot::{NodeSnapshot, SnapshotMode},
    utils::Error,
};

mod container;
mod property;

pub use container::PropertyContainer;
pub use property::{
    ExpressionRuntime, Observer, ObserverId, Property, PropertyState, Resolved,
};

/// Callback receiving every leaf created while building or reconciling a tree.
pub type CreatedHook<'a> = &'a mut dyn FnMut(&str, &Arc<Property>);

pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[derive(Debug, Clone, EnumIs, EnumTryAs)]
pub enum PropertyNode {
    Leaf(Arc<Property>),
    Container(Arc<PropertyContainer>),
}

impl PropertyNode {
    pub fn build(definition: &PropertyDefinition, path: &str, on_created: CreatedHook<'_>) -> Self {
        match definition {
            PropertyDefinition::Single(single) => {
                let prop = Arc::new(Property::new(single.clone()));
                on_created(path, &prop);
                PropertyNode::Leaf(prop)
            }
            PropertyDefinition::Container(group) => {
                PropertyNode::Container(PropertyContainer::build(group.clone(), path, on_created))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PropertyNode::Leaf(_) => "property",
            PropertyNode::Container(_) => "property group",
        }
    }

    pub fn to_snapshot(&self) -> Option<NodeSnapshot> {
        match self {
            PropertyNode::Leaf(prop) => prop.to_snapshot().map(NodeSnapshot::Property),
            PropertyNode::Container(group) => group.to_snapshot().map(NodeSnapshot::Container),
        }
    }

    pub fn apply_snapshot(&self, snapshot: &NodeSnapshot, mode: SnapshotMode, path: &str) -> Vec<Error> {
        match (self, snapshot) {
            (PropertyNode::Leaf(prop), NodeSnapshot::Property(snap)) => {
                prop.apply_snapshot(snap);
                Vec::new()
            }
            (PropertyNode::Container(group), NodeSnapshot::Container(snap)) => {
                group.apply_snapshot(snap, mode, path)
            }
            _ => vec![Error::ShapeMismatch {
                path: path.to_string(),
                expected: self.kind(),
                found: snapshot.kind(),
            }],
        }
    }

    pub fn reset_to_default(&self) {
        match self {
            PropertyNode::Leaf(prop) => prop.reset_to_default(),
            PropertyNode::Container(group) => group.reset_to_default(),
        }
    }

    pub fn is_default_state(&self) -> bool {
        match self {
            PropertyNode::Leaf(prop) => prop.is_default_state(),
            PropertyNode::Container(group) => group.is_default_state(),
        }
    }

    pub fn cleanup(&self) {
        match self {
            PropertyNode::Leaf(prop) => prop.cleanup(),
            PropertyNode::Container(group) => group.cleanup(),
        }
    }
}
