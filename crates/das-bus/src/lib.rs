//! ---
//! das_section: "02-event-bus"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Typed publish/subscribe event bus."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Typed publish/subscribe bus for simulation events.
//!
//! Each simulation owns one bus; there is no process-global instance.
//! Fan-out happens synchronously on the publishing thread, so events from
//! any single publisher reach every listener in publication order. Listener
//! panics are isolated from the publisher and from other listeners.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use das_msg::{EventType, SimulationEvent};
use parking_lot::RwLock;
use strum::IntoEnumIterator;
use tracing::warn;

/// Callback invoked for every published event of a subscribed type.
pub type EventListener = Arc<dyn Fn(&SimulationEvent) + Send + Sync>;

/// Token identifying one registration.
///
/// Closures are not comparable, so registrations are addressed by token:
/// subscribing the same closure twice yields two independent registrations,
/// and unsubscribing a token twice is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Typed publish/subscribe bus. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<EventType, Vec<(SubscriptionId, EventListener)>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of `event_type`.
    pub fn subscribe(&self, event_type: EventType, listener: EventListener) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .entry(event_type)
            .or_default()
            .push((id, listener));
        id
    }

    /// Register `listener` for every event type.
    pub fn subscribe_all(&self, listener: EventListener) -> Vec<SubscriptionId> {
        EventType::iter()
            .map(|event_type| self.subscribe(event_type, listener.clone()))
            .collect()
    }

    /// Remove one registration. Unknown tokens are ignored.
    pub fn unsubscribe(&self, event_type: EventType, id: SubscriptionId) {
        let mut listeners = self.inner.listeners.write();
        if let Some(entries) = listeners.get_mut(&event_type) {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    /// Deliver `event` to every listener subscribed to its type.
    ///
    /// The listener list is cloned out before the calls so no lock is held
    /// while listeners run; a listener that panics is logged and skipped
    /// without affecting the publisher or the remaining listeners.
    pub fn publish(&self, event: &SimulationEvent) {
        let listeners: Vec<EventListener> = {
            let map = self.inner.listeners.read();
            match map.get(&event.event_type) {
                Some(entries) => entries.iter().map(|(_, l)| l.clone()).collect(),
                None => return,
            }
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(
                    event_type = %event.event_type,
                    node_id = %event.node_id,
                    "event listener panicked; continuing fan-out"
                );
            }
        }
    }

    /// Number of live registrations for `event_type`.
    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.inner
            .listeners
            .read()
            .get(&event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
