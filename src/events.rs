//! Lifecycle notifications.
//!
//! The pool emits notifications after a resource is handed to a caller,
//! after a resource finishes teardown, and when an out-of-band error occurs
//! (factory failure, teardown failure). Observers register callbacks;
//! emission is synchronous fire-and-forget and observer behavior never feeds
//! back into the pool's control flow.

use crate::error::PoolError;
use std::sync::{Arc, Mutex};

/// A lifecycle notification emitted by the pool.
#[derive(Debug)]
pub enum PoolEvent<L> {
    /// A queued acquire request was resolved with `resource`.
    ///
    /// Emitted strictly after the request resolves; `metadata` is whatever
    /// the caller passed to [`acquire`](crate::PoolManager::acquire).
    AfterAcquire {
        /// The resource handed to the caller.
        resource: Arc<L>,
        /// Caller-supplied acquire metadata.
        metadata: serde_json::Value,
    },

    /// A lightweight resource finished teardown successfully.
    AfterClose {
        /// The resource that was torn down.
        resource: Arc<L>,
    },

    /// An error occurred outside any specific caller's request.
    Error(PoolError),
}

/// A registered observer callback.
///
/// Listeners run inline on the emitting task and must not block.
pub type Listener<L> = Box<dyn Fn(&PoolEvent<L>) + Send + Sync>;

/// Fan-out point for pool notifications.
pub struct EventSink<L> {
    listeners: Mutex<Vec<Arc<dyn Fn(&PoolEvent<L>) + Send + Sync>>>,
}

impl<L> EventSink<L> {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener for all pool events.
    ///
    /// Safe to call from inside a listener; the new listener sees events
    /// emitted after its registration.
    pub fn subscribe(&self, listener: Listener<L>) {
        self.listeners.lock().unwrap().push(Arc::from(listener));
    }

    /// Emit an event to every registered listener.
    ///
    /// Listeners run with the registration lock released, against a snapshot
    /// of the listener list taken at the moment of emission.
    pub fn emit(&self, event: &PoolEvent<L>) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(Arc::clone)
            .collect();
        for listener in &listeners {
            listener(event);
        }
    }
}

impl<L> Default for EventSink<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to an [`EventSink`].
pub type SharedEventSink<L> = Arc<EventSink<L>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Nothing;

    #[test]
    fn emit_reaches_every_listener() {
        let sink: EventSink<Nothing> = EventSink::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            sink.subscribe(Box::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }

        sink.emit(&PoolEvent::Error(PoolError::ForeignResource));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn emit_without_listeners_is_a_no_op() {
        let sink: EventSink<Nothing> = EventSink::new();
        sink.emit(&PoolEvent::Error(PoolError::NotFound));
    }

    #[test]
    fn a_listener_may_subscribe_from_inside_its_callback() {
        let sink: Arc<EventSink<Nothing>> = Arc::new(EventSink::new());
        let hits = Arc::new(AtomicUsize::new(0));

        {
            let sink = Arc::clone(&sink);
            let hits = Arc::clone(&hits);
            sink.clone().subscribe(Box::new(move |_| {
                let hits = Arc::clone(&hits);
                sink.subscribe(Box::new(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }));
            }));
        }

        // Must not deadlock; the listener registered mid-emission only sees
        // later events.
        sink.emit(&PoolEvent::Error(PoolError::ForeignResource));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        sink.emit(&PoolEvent::Error(PoolError::ForeignResource));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
