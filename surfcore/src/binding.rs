//! Declarative two-way binding of one property to one remote address.
use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use surfprop::{Property, Value, node::ObserverId};

use crate::base::{
    SurfaceContext,
    registry::EntityId,
    server::{ListenerId, NodeCallback, NodeEvent, ParameterServer},
};

/// Remote end of a [`PropertyBinding`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingTarget {
    /// Identifier token of the server entity.
    pub server: String,
    pub address: String,
}

impl BindingTarget {
    pub fn new(server: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            address: address.into(),
        }
    }
}

struct Link {
    server_id: EntityId,
    address: String,
    server: Arc<dyn ParameterServer>,
    listener: ListenerId,
}

fn args_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.loose_eq(b))
}

/// Keeps a property and a remote address in step, in both directions.
///
/// The target is resolved only when it is set and on [`refresh`]. Nothing
/// watches the registry on the binding's behalf: the host must call `refresh`
/// after a server registers, finishes loading its structure or is renamed,
/// otherwise the binding keeps its previous link (or stays unlinked).
/// Echoes are suppressed: applying an inbound value does not push it back out,
/// and pushing a value ignores what the server reflects during the push. A
/// local value that already matches the remote node is not sent.
///
/// [`refresh`]: PropertyBinding::refresh
pub struct PropertyBinding {
    ctx: Arc<SurfaceContext>,
    property: Arc<Property>,
    target: RwLock<Option<BindingTarget>>,
    link: Mutex<Option<Link>>,
    last_inbound: Mutex<Option<Value>>,
    last_outbound: Mutex<Option<Vec<Value>>>,
    applying_inbound: AtomicBool,
    applying_outbound: AtomicBool,
    observer: Mutex<Option<ObserverId>>,
    me: Weak<PropertyBinding>,
}

impl PropertyBinding {
    pub fn new(ctx: &Arc<SurfaceContext>, property: &Arc<Property>) -> Arc<Self> {
        let binding = Arc::new_cyclic(|me: &Weak<Self>| Self {
            ctx: ctx.clone(),
            property: property.clone(),
            target: RwLock::new(None),
            link: Mutex::new(None),
            last_inbound: Mutex::new(None),
            last_outbound: Mutex::new(None),
            applying_inbound: AtomicBool::new(false),
            applying_outbound: AtomicBool::new(false),
            observer: Mutex::new(None),
            me: me.clone(),
        });

        let this = Arc::downgrade(&binding);
        let observer = property.observe(move |value| {
            if let Some(binding) = this.upgrade() {
                binding.push_outbound(value);
            }
        });
        *binding.observer.lock() = Some(observer);
        binding
    }

    pub fn target(&self) -> Option<BindingTarget> {
        self.target.read().clone()
    }

    pub fn set_target(&self, target: Option<BindingTarget>) {
        *self.target.write() = target;
        self.refresh();
    }

    pub fn is_linked(&self) -> bool {
        self.link.lock().is_some()
    }

    /// Re-resolve the target. Subscribes once per distinct `(server, address)`
    /// and drops the subscription when the target is unset or unreachable.
    ///
    /// Must be called by the host whenever the set of servers or their
    /// identifiers change.
    pub fn refresh(&self) {
        let wanted = self.target().and_then(|target| {
            let entity = self
                .ctx
                .registry
                .lookup(&target.server)
                .or_else(|| self.ctx.directory.find_by_name(&target.server))?;
            let server = entity.server()?;
            (server.structure_ready() && server.get_node(&target.address).is_some())
                .then(|| (entity.entity_id(), target.address, server))
        });

        let mut link = self.link.lock();
        let unchanged = match (&*link, &wanted) {
            (Some(current), Some((server_id, address, _))) => {
                current.server_id == *server_id && current.address == *address
            }
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(old) = link.take() {
            old.server.remove_node_listener(&old.address, old.listener);
            debug!("Binding released `{}` ({})", old.address, old.listener);
        }
        *self.last_inbound.lock() = None;
        *self.last_outbound.lock() = None;

        let Some((server_id, address, server)) = wanted else {
            return;
        };
        let this = self.me.clone();
        let callback: NodeCallback = Arc::new(move |event: &NodeEvent| {
            if let Some(binding) = this.upgrade() {
                binding.on_event(event);
            }
        });
        let listener = server.add_node_listener(&address, callback);
        debug!("Binding subscribed `{}` ({})", address, listener);
        *link = Some(Link {
            server_id,
            address,
            server,
            listener,
        });
    }

    fn on_event(&self, event: &NodeEvent) {
        let NodeEvent::ValueChanged(args) = event;
        if self.applying_outbound.load(Ordering::Acquire) {
            trace!("Binding dropped an inbound echo");
            return;
        }

        let definition = self.property.definition();
        let value = Value::from_args(args);
        {
            let mut last = self.last_inbound.lock();
            if last
                .as_ref()
                .is_some_and(|last| definition.ty.values_equal(last, &value))
            {
                return;
            }
            *last = Some(value.clone());
        }

        let value = match &definition.filter {
            Some(filter) => match filter(value) {
                Ok(value) => value,
                Err(message) => {
                    warn!("Binding rejected an inbound value: {}", message);
                    return;
                }
            },
            None => value,
        };

        self.applying_inbound.store(true, Ordering::Release);
        self.property.set_raw(definition.coerce(value));
        self.applying_inbound.store(false, Ordering::Release);
        *self.last_outbound.lock() = None;
    }

    fn push_outbound(&self, value: &Value) {
        if self.applying_inbound.load(Ordering::Acquire) {
            return;
        }

        let (server, address) = match &*self.link.lock() {
            Some(link) => (link.server.clone(), link.address.clone()),
            None => return,
        };
        let Some(node) = server.get_node(&address) else {
            return;
        };

        let args = node.coerce_args(value);
        {
            let mut last = self.last_outbound.lock();
            if args_equal(last.as_deref().unwrap_or(&node.args), &args) {
                return;
            }
            *last = Some(args.clone());
        }

        self.applying_outbound.store(true, Ordering::Release);
        server.send_node_value(&address, args.clone());
        server.set_cached_value(&address, args);
        self.applying_outbound.store(false, Ordering::Release);
        *self.last_inbound.lock() = None;
    }

    /// Drop the subscription and stop observing the property.
    pub fn cleanup(&self) {
        if let Some(link) = self.link.lock().take() {
            link.server.remove_node_listener(&link.address, link.listener);
        }
        if let Some(observer) = self.observer.lock().take() {
            self.property.unobserve(observer);
        }
    }
}
