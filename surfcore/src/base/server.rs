//! Interface to remote parameter servers.
//!
//! The transport is not part of this crate: a server is seen as an
//! already-decoded address space plus listener and send primitives.
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use surfprop::value::{Color, Value};

/// Event delivered to node listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// The node's argument list changed.
    ValueChanged(Vec<Value>),
}

pub type NodeCallback = Arc<dyn Fn(&NodeEvent) + Send + Sync>;

/// Handle returned by [`ParameterServer::add_node_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl ListenerId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ListenerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node of a remote address space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteNode {
    pub address: String,
    /// Current argument list.
    pub args: Vec<Value>,
    /// OSC type tags, one per argument (`i h f d s T F c r`).
    pub type_tags: String,
}

impl RemoteNode {
    pub fn new(address: impl Into<String>, type_tags: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            address: address.into(),
            args,
            type_tags: type_tags.into(),
        }
    }

    /// Scalar for single-argument nodes, list otherwise.
    pub fn value(&self) -> Value {
        Value::from_args(&self.args)
    }

    /// Argument list for `value`, converted with the node's type tags.
    /// Arguments past the tagged ones pass through unchanged.
    pub fn coerce_args(&self, value: &Value) -> Vec<Value> {
        let mut tags = self.type_tags.chars();
        value
            .to_args()
            .into_iter()
            .map(|arg| match tags.next() {
                Some(tag) => coerce_tagged(tag, arg),
                None => arg,
            })
            .collect()
    }
}

fn coerce_tagged(tag: char, arg: Value) -> Value {
    match tag {
        'i' | 'h' => {
            let n = arg.to_number();
            Value::Int(if n.is_finite() { n.trunc() as i64 } else { 0 })
        }
        'f' | 'd' => Value::Float(arg.to_number()),
        's' => Value::Str(arg.to_string()),
        'T' | 'F' => Value::Bool(arg.is_truthy()),
        'c' => Value::Str(arg.to_string().chars().take(1).collect()),
        'r' => Value::Color(Color::from_value(&arg).unwrap_or_default()),
        _ => arg,
    }
}

/// A remote, introspectable parameter server.
///
/// Listener callbacks may be invoked from [`ParameterServer::send_node_value`]
/// or from the transport; implementations must not hold internal locks while
/// calling them.
pub trait ParameterServer: Send + Sync {
    /// Whether the address space has been loaded.
    fn structure_ready(&self) -> bool;

    fn get_node(&self, address: &str) -> Option<RemoteNode>;

    fn add_node_listener(&self, address: &str, callback: NodeCallback) -> ListenerId;

    fn remove_node_listener(&self, address: &str, listener: ListenerId);

    /// Push a new argument list to the remote node.
    fn send_node_value(&self, address: &str, args: Vec<Value>);

    /// Update the locally cached argument list without sending anything.
    fn set_cached_value(&self, address: &str, args: Vec<Value>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_drive_argument_conversion() {
        let node = RemoteNode::new("/mix", "ifsT", vec![]);
        let value = Value::List(vec![
            Value::Float(2.7),
            Value::Int(3),
            Value::Int(4),
            Value::Int(0),
            Value::from("extra"),
        ]);
        assert_eq!(
            node.coerce_args(&value),
            vec![
                Value::Int(2),
                Value::Float(3.0),
                Value::from("4"),
                Value::Bool(false),
                Value::from("extra"),
            ]
        );
    }

    #[test]
    fn node_value_is_scalar_or_list() {
        let single = RemoteNode::new("/a", "f", vec![Value::Float(0.5)]);
        assert_eq!(single.value(), Value::Float(0.5));
        let pair = RemoteNode::new("/b", "ii", vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(pair.value(), Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(RemoteNode::default().value(), Value::Null);
    }
}
