//! Per-category listener registration with snapshot-based fan-out.
//!
//! Listeners live on an arbitrary owning thread/runtime; what the registry
//! stores is the callback plus the executor handle that owns it. Snapshots
//! are immutable, registration-ordered, and reference-counted so an in-flight
//! delivery survives concurrent unregistration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::delivery::TaskExecutor;
use crate::types::{EventPayload, EventType};

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("listener callback failed: {0}")]
    Callback(String),
}

/// Capability interface implemented by runtime-side listeners.
///
/// The returned bool is the "consumed" answer for key categories and is
/// ignored for every other category.
pub trait EventListener: Send + Sync {
    fn on_event(&self, payload: &EventPayload) -> Result<bool, ListenerError>;
}

/// One registered listener with its owning execution context.
#[derive(Clone)]
pub struct ListenerEntry {
    pub(crate) executor: Arc<dyn TaskExecutor>,
    pub(crate) callback: Arc<dyn EventListener>,
    registered_on: ThreadId,
}

impl ListenerEntry {
    /// Registration identity: executor handle, callback reference, and the
    /// thread that performed the registration.
    fn same_registration(&self, other: &ListenerEntry) -> bool {
        Arc::ptr_eq(&self.executor, &other.executor)
            && Arc::ptr_eq(&self.callback, &other.callback)
            && self.registered_on == other.registered_on
    }
}

/// Thread-safe listener registry, one ordered list per event category.
#[derive(Default)]
pub struct CallbackRegistry {
    entries: Mutex<HashMap<EventType, Vec<ListenerEntry>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a registration unless an equal one already exists.
    /// Re-registration is a silent no-op.
    pub fn subscribe(
        &self,
        event: EventType,
        executor: Arc<dyn TaskExecutor>,
        callback: Arc<dyn EventListener>,
    ) {
        let entry = ListenerEntry {
            executor,
            callback,
            registered_on: thread::current().id(),
        };
        let Ok(mut map) = self.entries.lock() else {
            return;
        };
        let list = map.entry(event).or_default();
        if list.iter().any(|e| e.same_registration(&entry)) {
            return;
        }
        list.push(entry);
    }

    /// Remove one registration matching `callback`, or every registration for
    /// the category when `callback` is `None`.
    pub fn unsubscribe(&self, event: EventType, callback: Option<&Arc<dyn EventListener>>) {
        let Ok(mut map) = self.entries.lock() else {
            return;
        };
        match callback {
            Some(cb) => {
                if let Some(list) = map.get_mut(&event) {
                    if let Some(pos) = list.iter().position(|e| Arc::ptr_eq(&e.callback, cb)) {
                        list.remove(pos);
                    }
                }
            }
            None => {
                map.remove(&event);
            }
        }
    }

    /// Immutable copy of the category's registrations as of now, in
    /// registration order. Listeners registered later are not part of it.
    pub fn snapshot(&self, event: EventType) -> Arc<[ListenerEntry]> {
        let Ok(map) = self.entries.lock() else {
            return Vec::new().into();
        };
        match map.get(&event) {
            Some(list) => Arc::from(list.as_slice()),
            None => Vec::new().into(),
        }
    }

    pub fn has_listeners(&self, event: EventType) -> bool {
        self.entries
            .lock()
            .map(|map| map.get(&event).is_some_and(|list| !list.is_empty()))
            .unwrap_or(false)
    }
}
