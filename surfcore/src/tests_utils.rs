//! Fixtures for tests: an in-memory parameter server and entity builders.
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use surfprop::{ContainerDefinition, Value};

use crate::{
    base::{
        SurfaceContext,
        addressable::Addressable,
        inspectable::{InspectableWithProps, PropertyDefinitions},
        server::{ListenerId, NodeCallback, NodeEvent, ParameterServer, RemoteNode},
    },
    magic::USER_ID_KEY,
};

#[derive(Default)]
struct Counters {
    subscribes: BTreeMap<String, usize>,
    unsubscribes: BTreeMap<String, usize>,
    sent: Vec<(String, Vec<Value>)>,
}

/// [`ParameterServer`] backed by a map of nodes.
///
/// `send_node_value` only records the call; use [`MemoryServer::emit`] to
/// simulate the remote side changing a value.
#[derive(Default)]
pub struct MemoryServer {
    ready: AtomicBool,
    nodes: RwLock<BTreeMap<String, RemoteNode>>,
    listeners: RwLock<BTreeMap<String, Vec<(ListenerId, NodeCallback)>>>,
    counters: Mutex<Counters>,
}

impl MemoryServer {
    /// A server whose structure is already loaded.
    pub fn new() -> Arc<Self> {
        let server = Self::default();
        server.ready.store(true, Ordering::SeqCst);
        Arc::new(server)
    }

    /// A server that still has to load its structure.
    pub fn loading() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn add_node(&self, address: &str, type_tags: &str, args: Vec<Value>) {
        self.nodes
            .write()
            .insert(address.to_string(), RemoteNode::new(address, type_tags, args));
    }

    /// Change a node on the remote side and notify its listeners.
    pub fn emit(&self, address: &str, args: Vec<Value>) {
        if let Some(node) = self.nodes.write().get_mut(address) {
            node.args = args.clone();
        }
        let listeners: Vec<NodeCallback> = self
            .listeners
            .read()
            .get(address)
            .map(|entries| entries.iter().map(|(_, callback)| callback.clone()).collect())
            .unwrap_or_default();
        let event = NodeEvent::ValueChanged(args);
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn cached(&self, address: &str) -> Option<Vec<Value>> {
        self.nodes.read().get(address).map(|node| node.args.clone())
    }

    pub fn listener_count(&self, address: &str) -> usize {
        self.listeners.read().get(address).map_or(0, Vec::len)
    }

    pub fn subscribe_count(&self, address: &str) -> usize {
        self.counters.lock().subscribes.get(address).copied().unwrap_or(0)
    }

    pub fn unsubscribe_count(&self, address: &str) -> usize {
        self.counters.lock().unsubscribes.get(address).copied().unwrap_or(0)
    }

    /// Every `send_node_value` call so far.
    pub fn sent(&self) -> Vec<(String, Vec<Value>)> {
        self.counters.lock().sent.clone()
    }
}

impl ParameterServer for MemoryServer {
    fn structure_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn get_node(&self, address: &str) -> Option<RemoteNode> {
        self.nodes.read().get(address).cloned()
    }

    fn add_node_listener(&self, address: &str, callback: NodeCallback) -> ListenerId {
        let id = ListenerId::next();
        self.listeners
            .write()
            .entry(address.to_string())
            .or_default()
            .push((id, callback));
        *self
            .counters
            .lock()
            .subscribes
            .entry(address.to_string())
            .or_default() += 1;
        id
    }

    fn remove_node_listener(&self, address: &str, listener: ListenerId) {
        if let Some(entries) = self.listeners.write().get_mut(address) {
            entries.retain(|(id, _)| *id != listener);
        }
        *self
            .counters
            .lock()
            .unsubscribes
            .entry(address.to_string())
            .or_default() += 1;
    }

    fn send_node_value(&self, address: &str, args: Vec<Value>) {
        self.counters.lock().sent.push((address.to_string(), args));
    }

    fn set_cached_value(&self, address: &str, args: Vec<Value>) {
        if let Some(node) = self.nodes.write().get_mut(address) {
            node.args = args;
        }
    }
}

/// Definitions that can be swapped at runtime to exercise reconciliation.
pub struct StaticDefinitions {
    definition: RwLock<ContainerDefinition>,
}

impl StaticDefinitions {
    pub fn new(definition: ContainerDefinition) -> Arc<Self> {
        Arc::new(Self {
            definition: RwLock::new(definition),
        })
    }

    pub fn set(&self, definition: ContainerDefinition) {
        *self.definition.write() = definition;
    }
}

impl PropertyDefinitions for StaticDefinitions {
    fn property_definitions(&self) -> ContainerDefinition {
        self.definition.read().clone()
    }
}

/// Context with default configuration.
pub fn context() -> Arc<SurfaceContext> {
    SurfaceContext::with_defaults()
}

/// Entity of type `widget` with the given definitions and, if non-empty, a
/// `userID`.
pub fn widget(
    ctx: &Arc<SurfaceContext>,
    name: &str,
    user_id: &str,
    definition: ContainerDefinition,
) -> Arc<InspectableWithProps> {
    let entity = InspectableWithProps::create(ctx, "widget", name, Arc::new(definition));
    set_user_id(&entity, user_id);
    entity
}

/// Entity of type `server` exposing `server`.
pub fn server_entity(
    ctx: &Arc<SurfaceContext>,
    name: &str,
    user_id: &str,
    server: Arc<MemoryServer>,
) -> Arc<InspectableWithProps> {
    let entity = InspectableWithProps::create(
        ctx,
        "server",
        name,
        Arc::new(ContainerDefinition::new(name)),
    );
    entity.set_server(Some(server));
    set_user_id(&entity, user_id);
    entity
}

pub fn set_user_id(entity: &InspectableWithProps, user_id: &str) {
    if let Some(prop) = entity.property(USER_ID_KEY) {
        prop.set(user_id);
    }
}
