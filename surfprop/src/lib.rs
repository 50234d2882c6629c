//! Property node model for control-surface entities.
//!
//! Entities declare their editable surface through [`definition`]s; this crate
//! materializes them into live trees of [`node::Property`] and
//! [`node::PropertyContainer`], coerces stored values to their declared
//! [`types::PropertyType`], and produces minimal [`snapshot`]s for undo history
//! and persistence. Expression evaluation is out of scope here: an owner may
//! plug an [`node::ExpressionRuntime`] into any leaf.

pub mod definition;
pub mod node;
pub mod snapshot;
pub mod types;
pub mod utils;
pub mod value;

pub use definition::{ContainerDefinition, PropertyDefinition, SingleDefinition};
pub use node::{Property, PropertyContainer, PropertyNode, Resolved};
pub use snapshot::{ContainerSnapshot, NodeSnapshot, PropertySnapshot, SnapshotMode, ValueMode};
pub use types::PropertyType;
pub use value::{Color, Value};
