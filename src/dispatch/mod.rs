//! Subscription dispatcher for inbound events
//!
//! Routes each published event to every listener registered for its kind and
//! to every wildcard listener. Subscriptions live in the dispatcher, not in a
//! socket, so they survive reconnects.
//!
//! # Example
//!
//! ```
//! use assistant_link::dispatch::{Dispatcher, Topic};
//! use assistant_link::types::{EventKind, InboundEvent};
//!
//! let dispatcher: Dispatcher<InboundEvent> = Dispatcher::new();
//! let subscription = dispatcher.subscribe(Topic::Kind(EventKind::Pong), |event| {
//!     log::info!("heartbeat answered: {event:?}");
//! });
//!
//! dispatcher.publish(&InboundEvent::Pong { timestamp: None });
//! subscription.unsubscribe();
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::types::events::{EventKind, InboundEvent};

/// Events that can be routed by a type tag
pub trait Routable: Send + Sync + 'static {
    /// Routing key
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Routing key of this event
    fn kind(&self) -> Self::Kind;
}

impl Routable for InboundEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        InboundEvent::kind(self)
    }
}

/// What a listener subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic<K> {
    /// Events of one kind
    Kind(K),
    /// Every event regardless of kind
    All,
}

/// Listener callback type
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E: Routable> {
    next_id: u64,
    topics: HashMap<Topic<E::Kind>, Vec<(u64, Listener<E>)>>,
}

/// Dispatcher fanning events out to registered listeners
pub struct Dispatcher<E: Routable> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: Routable> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: Routable> Dispatcher<E> {
    /// Create an empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 1,
                topics: HashMap::new(),
            })),
        }
    }

    /// Register a listener for a topic
    ///
    /// The same closure may be registered several times; each registration is
    /// a separate listener with its own [`Subscription`].
    pub fn subscribe<F>(&self, topic: Topic<E::Kind>, listener: F) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .topics
            .entry(topic)
            .or_default()
            .push((id, Arc::new(listener)));

        Subscription {
            registry: Arc::downgrade(&self.registry),
            topic,
            id,
        }
    }

    /// Register a wildcard listener
    pub fn subscribe_all<F>(&self, listener: F) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(Topic::All, listener)
    }

    /// Deliver an event to its kind's listeners and to wildcard listeners
    ///
    /// A listener that panics is logged and skipped; the remaining listeners
    /// still run. Returns the number of listeners that completed.
    pub fn publish(&self, event: &E) -> usize {
        // Snapshot so listeners can (un)subscribe without deadlocking.
        let listeners: Vec<Listener<E>> = {
            let registry = self.registry.lock();
            [Topic::Kind(event.kind()), Topic::All]
                .iter()
                .filter_map(|topic| registry.topics.get(topic))
                .flatten()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    log::error!("Listener for {:?} panicked: {reason}", event.kind());
                }
            }
        }
        delivered
    }

    /// Number of listeners registered for a topic
    #[must_use]
    pub fn listener_count(&self, topic: Topic<E::Kind>) -> usize {
        self.registry.lock().topics.get(&topic).map_or(0, Vec::len)
    }

    /// Number of topics that currently have listeners
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.registry.lock().topics.len()
    }
}

impl<E: Routable> Default for Dispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one registered listener
pub struct Subscription<E: Routable> {
    registry: Weak<Mutex<Registry<E>>>,
    topic: Topic<E::Kind>,
    id: u64,
}

impl<E: Routable> Subscription<E> {
    /// Topic this subscription listens on
    #[must_use]
    pub const fn topic(&self) -> Topic<E::Kind> {
        self.topic
    }

    /// Remove exactly this listener
    ///
    /// Idempotent. The topic entry is dropped once its last listener is gone.
    /// Returns whether a listener was removed.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock();
        let Some(listeners) = registry.topics.get_mut(&self.topic) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            registry.topics.remove(&self.topic);
        }
        removed
    }
}

impl<E: Routable> Debug for Subscription<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish()
    }
}
