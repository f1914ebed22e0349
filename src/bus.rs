//! Typed publish/subscribe channel local to one visualiser.
//!
//! Modules announce derived semantic events (a variable was declared, a value
//! changed) on the bus so that other modules and host code can react without
//! holding a reference to the publisher.
//!
//! Delivery is synchronous: [`ModuleEventBus::publish`] invokes every listener
//! subscribed to the event's type, in registration order, before returning.
//! Each listener runs in isolation; a listener that panics is logged and the
//! remaining listeners still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::TrackedValue;

/// Types of events modules publish on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleEventType {
    /// A variable came into existence
    VariableDeclared,
    /// An existing variable received a new value
    VariableChanged,
}

impl std::fmt::Display for ModuleEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::VariableDeclared => "VARIABLE_DECLARED",
            Self::VariableChanged => "VARIABLE_CHANGED",
        };
        write!(f, "{}", s)
    }
}

/// An event published by a module, carrying its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleEvent {
    VariableDeclared {
        name: String,
        data: TrackedValue,
    },
    VariableChanged {
        name: String,
        old_data: TrackedValue,
        new_data: TrackedValue,
    },
}

impl ModuleEvent {
    /// Get the event type.
    pub fn event_type(&self) -> ModuleEventType {
        match self {
            Self::VariableDeclared { .. } => ModuleEventType::VariableDeclared,
            Self::VariableChanged { .. } => ModuleEventType::VariableChanged,
        }
    }
}

/// Handle identifying one subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&ModuleEvent) + Send + Sync>;

struct Listener {
    id: SubscriptionId,
    callback: Callback,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    listeners: HashMap<ModuleEventType, Vec<Listener>>,
}

/// Per-visualiser module event bus.
///
/// Cloning the bus yields another handle to the same listener table.
#[derive(Clone, Default)]
pub struct ModuleEventBus {
    state: Arc<RwLock<BusState>>,
}

impl ModuleEventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BusState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BusState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to one event type.
    ///
    /// Listeners run inside the publishing module's event handling, while the
    /// registry holds that module's lock. Read what you need from the event
    /// payload: typed access to the publishing module from a listener returns
    /// [`Error::ModuleBusy`](crate::error::Error::ModuleBusy), and locking its
    /// handle directly with [`ModuleHandle::lock`](crate::module::ModuleHandle::lock)
    /// deadlocks.
    pub fn subscribe<F>(&self, event_type: ModuleEventType, callback: F) -> SubscriptionId
    where
        F: Fn(&ModuleEvent) + Send + Sync + 'static,
    {
        let mut state = self.write();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state
            .listeners
            .entry(event_type)
            .or_default()
            .push(Listener {
                id,
                callback: Arc::new(callback),
            });
        debug!(%event_type, ?id, "Bus subscription added");
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.write();
        for listeners in state.listeners.values_mut() {
            if let Some(pos) = listeners.iter().position(|l| l.id == id) {
                listeners.remove(pos);
                return true;
            }
        }
        false
    }

    /// Publish an event to every listener currently subscribed to its type.
    ///
    /// Listeners run synchronously in registration order. Returns the number
    /// of listeners that completed without panicking.
    pub fn publish(&self, event: ModuleEvent) -> usize {
        let event_type = event.event_type();

        // Snapshot so listeners may subscribe or publish re-entrantly.
        let callbacks: Vec<Callback> = self
            .read()
            .listeners
            .get(&event_type)
            .map(|listeners| listeners.iter().map(|l| Arc::clone(&l.callback)).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(%event_type, "Bus listener panicked; continuing with remaining listeners"),
            }
        }
        delivered
    }

    /// Mark the current position in the subscription sequence.
    pub fn mark(&self) -> SubscriptionId {
        SubscriptionId(self.read().next_id)
    }

    /// Live subscriptions made after `mark`, in subscription order.
    pub fn subscriptions_since(&self, mark: SubscriptionId) -> Vec<SubscriptionId> {
        let mut ids: Vec<SubscriptionId> = self
            .read()
            .listeners
            .values()
            .flatten()
            .map(|l| l.id)
            .filter(|id| *id > mark)
            .collect();
        ids.sort();
        ids
    }

    /// Number of listeners subscribed to an event type.
    pub fn subscriber_count(&self, event_type: ModuleEventType) -> usize {
        self.read()
            .listeners
            .get(&event_type)
            .map_or(0, |listeners| listeners.len())
    }

    /// Remove every subscription.
    pub fn clear(&self) {
        self.write().listeners.clear();
    }
}

impl std::fmt::Debug for ModuleEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        let counts: HashMap<ModuleEventType, usize> = state
            .listeners
            .iter()
            .map(|(ty, listeners)| (*ty, listeners.len()))
            .collect();
        f.debug_struct("ModuleEventBus")
            .field("listeners", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Value;
    use std::sync::Mutex;

    fn declared(name: &str, n: i64) -> ModuleEvent {
        ModuleEvent::VariableDeclared {
            name: name.into(),
            data: TrackedValue::literal(Value::Integer(n)),
        }
    }

    #[test]
    fn test_publish_in_registration_order() {
        let bus = ModuleEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            bus.subscribe(ModuleEventType::VariableDeclared, move |_| {
                log.lock().unwrap().push(tag);
            });
        }

        assert_eq!(bus.publish(declared("x", 1)), 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_only_matching_type_receives() {
        let bus = ModuleEventBus::new();
        let changed = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&changed);
        bus.subscribe(ModuleEventType::VariableChanged, move |_| {
            *counter.lock().unwrap() += 1;
        });

        assert_eq!(bus.publish(declared("x", 1)), 0);
        assert_eq!(*changed.lock().unwrap(), 0);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = ModuleEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(ModuleEventType::VariableDeclared, |_| panic!("listener bug"));
        let sink = Arc::clone(&seen);
        bus.subscribe(ModuleEventType::VariableDeclared, move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        assert_eq!(bus.publish(declared("x", 5)), 1);
        assert_eq!(*seen.lock().unwrap(), vec![declared("x", 5)]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = ModuleEventBus::new();
        let id = bus.subscribe(ModuleEventType::VariableDeclared, |_| {});
        assert_eq!(bus.subscriber_count(ModuleEventType::VariableDeclared), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(ModuleEventType::VariableDeclared), 0);
    }

    #[test]
    fn test_subscriptions_since_mark() {
        let bus = ModuleEventBus::new();
        bus.subscribe(ModuleEventType::VariableDeclared, |_| {});

        let mark = bus.mark();
        let a = bus.subscribe(ModuleEventType::VariableChanged, |_| {});
        let b = bus.subscribe(ModuleEventType::VariableDeclared, |_| {});
        let c = bus.subscribe(ModuleEventType::VariableChanged, |_| {});
        bus.unsubscribe(b);

        assert_eq!(bus.subscriptions_since(mark), vec![a, c]);
        assert!(bus.subscriptions_since(bus.mark()).is_empty());
    }

    #[test]
    fn test_listener_may_subscribe_during_publish() {
        let bus = ModuleEventBus::new();
        let inner = bus.clone();
        bus.subscribe(ModuleEventType::VariableDeclared, move |_| {
            inner.subscribe(ModuleEventType::VariableChanged, |_| {});
        });

        bus.publish(declared("x", 1));
        assert_eq!(bus.subscriber_count(ModuleEventType::VariableChanged), 1);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(declared("x", 5)).unwrap();
        assert_eq!(json["type"], "VARIABLE_DECLARED");
        assert_eq!(json["data"]["name"], "x");
        assert_eq!(ModuleEventType::VariableChanged.to_string(), "VARIABLE_CHANGED");
    }
}
