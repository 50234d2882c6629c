//! Remote-subscription synchronizer.
//!
//! Each evaluation produces the set of remote addresses it touched. The
//! synchronizer keeps the latest such set in a single pending slot and, on
//! the next scheduler drain, diffs it against the live subscriptions:
//! stale or retagged addresses are unsubscribed first, then new ones are
//! subscribed if their server has loaded its structure.
use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};

use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use strum::{Display, EnumIs};

use crate::{
    base::{
        registry::EntityId,
        server::{ListenerId, NodeCallback, NodeEvent, ParameterServer},
    },
    sched::{Scheduler, TaskKey},
};

/// How an expression uses a remote address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIs)]
#[strum(serialize_all = "lowercase")]
pub enum DepTag {
    /// Read-only, via `osc()`.
    Osc,
    /// Two-way, via `bind()`.
    Binding,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepKey {
    pub server: EntityId,
    pub address: String,
}

#[derive(Clone)]
pub struct Dependency {
    pub tag: DepTag,
    pub server: Arc<dyn ParameterServer>,
}

/// Remote addresses touched by one evaluation.
pub type DependencyMap = BTreeMap<DepKey, Dependency>;

/// Record a dependency. `Binding` wins over `Osc` for the same address.
pub fn record_dependency(map: &mut DependencyMap, key: DepKey, dependency: Dependency) {
    match map.get_mut(&key) {
        Some(existing) => {
            if dependency.tag.is_binding() {
                existing.tag = DepTag::Binding;
            }
        }
        None => {
            map.insert(key, dependency);
        }
    }
}

/// Receives inbound events of active subscriptions.
pub type EventSink = Arc<dyn Fn(&DepKey, DepTag, &NodeEvent) + Send + Sync>;

struct Active {
    tag: DepTag,
    server: Arc<dyn ParameterServer>,
    listener: ListenerId,
}

#[derive(Default)]
struct SyncState {
    pending: Option<DependencyMap>,
    active: BTreeMap<DepKey, Active>,
    binding_active: bool,
    disposed: bool,
}

pub struct Synchronizer {
    id: u64,
    state: Arc<Mutex<SyncState>>,
    sink: Arc<RwLock<Option<EventSink>>>,
}

impl Synchronizer {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(SyncState::default())),
            sink: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_event_sink(&self, sink: EventSink) {
        *self.sink.write() = Some(sink);
    }

    /// Queue `desired` for the next drain, replacing any map still pending.
    pub fn request(&self, scheduler: &Scheduler, desired: DependencyMap) {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            if desired.is_empty() && state.active.is_empty() && state.pending.is_none() {
                return;
            }
            state.pending = Some(desired);
        }

        let state = Arc::downgrade(&self.state);
        let sink = self.sink.clone();
        scheduler.schedule(TaskKey::Sync(self.id), move || Self::run(&state, &sink));
    }

    fn run(state: &Weak<Mutex<SyncState>>, sink: &Arc<RwLock<Option<EventSink>>>) {
        let Some(state) = state.upgrade() else {
            return;
        };

        let (desired, stale) = {
            let mut guard = state.lock();
            let Some(desired) = guard.pending.take() else {
                return;
            };
            if guard.disposed {
                return;
            }

            let stale_keys: Vec<DepKey> = guard
                .active
                .iter()
                .filter(|(key, active)| desired.get(*key).map(|d| d.tag) != Some(active.tag))
                .map(|(key, _)| key.clone())
                .collect();
            let stale: Vec<(DepKey, Active)> = stale_keys
                .into_iter()
                .filter_map(|key| guard.active.remove(&key).map(|active| (key, active)))
                .collect();
            guard.binding_active = desired.values().any(|d| d.tag.is_binding());
            (desired, stale)
        };

        for (key, active) in stale {
            active.server.remove_node_listener(&key.address, active.listener);
            debug!("Unsubscribed {} `{}` ({})", active.tag, key.address, active.listener);
        }

        let wanted: Vec<(DepKey, Dependency)> = {
            let guard = state.lock();
            desired
                .into_iter()
                .filter(|(key, _)| !guard.active.contains_key(key))
                .collect()
        };

        for (key, dependency) in wanted {
            if !dependency.server.structure_ready() || dependency.server.get_node(&key.address).is_none() {
                trace!("Address `{}` not available yet, subscription deferred", key.address);
                continue;
            }

            let callback: NodeCallback = {
                let sink = sink.clone();
                let key = key.clone();
                let tag = dependency.tag;
                Arc::new(move |event: &NodeEvent| {
                    let sink = sink.read().clone();
                    if let Some(sink) = sink {
                        sink(&key, tag, event);
                    }
                })
            };
            let listener = dependency.server.add_node_listener(&key.address, callback);
            debug!("Subscribed {} `{}` ({})", dependency.tag, key.address, listener);

            let mut guard = state.lock();
            if guard.disposed {
                drop(guard);
                dependency.server.remove_node_listener(&key.address, listener);
                return;
            }
            guard.active.insert(
                key,
                Active {
                    tag: dependency.tag,
                    server: dependency.server,
                    listener,
                },
            );
        }
    }

    /// Whether inbound values of bound addresses should reach the property.
    pub fn binding_active(&self) -> bool {
        self.state.lock().binding_active
    }

    /// Active subscriptions with their tag.
    pub fn active(&self) -> Vec<(DepKey, DepTag)> {
        self.state
            .lock()
            .active
            .iter()
            .map(|(key, active)| (key.clone(), active.tag))
            .collect()
    }

    /// Active two-way subscriptions.
    pub fn bound_targets(&self) -> Vec<(String, Arc<dyn ParameterServer>)> {
        self.state
            .lock()
            .active
            .iter()
            .filter(|(_, active)| active.tag.is_binding())
            .map(|(key, active)| (key.address.clone(), active.server.clone()))
            .collect()
    }

    /// Drop every subscription now and forget pending work.
    pub fn cleanup(&self) {
        let active = {
            let mut state = self.state.lock();
            state.disposed = true;
            state.pending = None;
            state.binding_active = false;
            std::mem::take(&mut state.active)
        };
        for (key, active) in active {
            active.server.remove_node_listener(&key.address, active.listener);
            debug!("Unsubscribed {} `{}` on cleanup", active.tag, key.address);
        }
    }
}
