//! Filter change notifications
//!
//! Store events are collected while the engine holds its lock and delivered
//! here once the lock is released, so listeners may call back into the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hush_core::store::StoreEvent;
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Listener signature: `(action, properties)`.
pub type FilterChangeListener = dyn Fn(&str, &Value) + Send + Sync;

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Action string and JSON properties of a store event.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChangeEvent {
    pub action: &'static str,
    pub properties: Value,
}

impl From<&StoreEvent> for FilterChangeEvent {
    fn from(event: &StoreEvent) -> Self {
        let properties = match event {
            StoreEvent::Filter { filter, .. } => json!({
                "text": filter.text,
                "type": filter.filter_type.as_str(),
            }),
            StoreEvent::Subscription { subscription, .. } => serde_json::to_value(subscription).unwrap_or_default(),
        };
        Self {
            action: event.action().as_str(),
            properties,
        }
    }
}

#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<FilterChangeListener>)>>,
    /// Single replaceable callback, kept apart from the listener list
    callback: Mutex<Option<Arc<FilterChangeListener>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<FilterChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn set_callback(&self, callback: Option<Arc<FilterChangeListener>>) {
        *self.callback.lock() = callback;
    }

    /// Deliver events in order. Must not be called with the store locked.
    pub fn dispatch(&self, events: &[StoreEvent]) {
        if events.is_empty() {
            return;
        }

        // Snapshot so listeners can (un)register while being called
        let mut targets: Vec<Arc<FilterChangeListener>> =
            self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        targets.extend(self.callback.lock().clone());
        if targets.is_empty() {
            return;
        }

        for event in events {
            let change = FilterChangeEvent::from(event);
            log::debug!("Dispatching {} to {} listeners", change.action, targets.len());
            for target in &targets {
                target(change.action, &change.properties);
            }
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("listeners", &self.listeners.lock().len())
            .field("callback", &self.callback.lock().is_some())
            .finish()
    }
}
