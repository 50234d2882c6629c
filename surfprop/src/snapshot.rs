//! Persisted shapes of property trees.
//!
//! A missing key always means "use the default". Snapshots are what the undo
//! history stores, so they are kept minimal: see [`Property::to_snapshot`] and
//! [`PropertyContainer::to_snapshot`].
//!
//! [`Property::to_snapshot`]: crate::node::Property::to_snapshot
//! [`PropertyContainer::to_snapshot`]: crate::node::PropertyContainer::to_snapshot
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIs, EnumString};

use crate::value::Value;

/// Whether a property shows its stored value or the result of its expression.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIs,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValueMode {
    Value,
    Expression,
}

/// How [`apply_snapshot`](crate::node::PropertyContainer::apply_snapshot) treats
/// keys missing from the incoming snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, EnumIs)]
pub enum SnapshotMode {
    /// Only keys present in the snapshot are touched.
    #[default]
    Patch,
    /// Keys absent from the snapshot are reset to their defaults.
    Replace,
}

/// Snapshot of a single leaf property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ValueMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Snapshot of a property group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    pub children: BTreeMap<String, NodeSnapshot>,
}

/// Snapshot of either node shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumIs)]
#[serde(untagged)]
pub enum NodeSnapshot {
    Container(ContainerSnapshot),
    Property(PropertySnapshot),
}

impl NodeSnapshot {
    pub fn kind(&self) -> &'static str {
        match self {
            NodeSnapshot::Container(_) => "property group",
            NodeSnapshot::Property(_) => "property",
        }
    }
}

impl From<PropertySnapshot> for NodeSnapshot {
    fn from(value: PropertySnapshot) -> Self {
        NodeSnapshot::Property(value)
    }
}

impl From<ContainerSnapshot> for NodeSnapshot {
    fn from(value: ContainerSnapshot) -> Self {
        NodeSnapshot::Container(value)
    }
}
