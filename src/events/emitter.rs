//! Typed, synchronous publish/subscribe
//!
//! Handlers are invoked on the emitting thread, in registration order, before
//! `emit` returns. Typed handlers for an event's kind run first, then wildcard
//! handlers. A panicking handler is logged and skipped; the remaining handlers
//! still receive the event.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

/// An event that can be routed by its kind
pub trait Event: Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Token returned by registration, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;
type WildcardHandler<E> = Arc<dyn Fn(<E as Event>::Kind, &E) + Send + Sync>;

struct Registry<E: Event> {
    next_id: u64,
    typed: HashMap<E::Kind, Vec<(HandlerId, Handler<E>)>>,
    wildcard: Vec<(HandlerId, WildcardHandler<E>)>,
}

impl<E: Event> Registry<E> {
    fn allocate(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }
}

pub struct EventEmitter<E: Event> {
    registry: Mutex<Registry<E>>,
}

impl<E: Event> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                typed: HashMap::new(),
                wildcard: Vec::new(),
            }),
        }
    }

    /// Register a handler for one event kind
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> HandlerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.allocate();
        registry
            .typed
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Register a handler that receives every emitted event with its kind
    pub fn on_any<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(E::Kind, &E) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.allocate();
        registry.wildcard.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if the id was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut registry = self.registry.lock();

        for handlers in registry.typed.values_mut() {
            if let Some(pos) = handlers.iter().position(|(h, _)| *h == id) {
                handlers.remove(pos);
                return true;
            }
        }

        if let Some(pos) = registry.wildcard.iter().position(|(h, _)| *h == id) {
            registry.wildcard.remove(pos);
            return true;
        }

        false
    }

    /// Deliver an event to all matching handlers
    pub fn emit(&self, event: &E) {
        let kind = event.kind();

        // Snapshot under the lock so handlers may subscribe, unsubscribe or
        // emit without deadlocking.
        let (typed, wildcard) = {
            let registry = self.registry.lock();
            let typed: Vec<Handler<E>> = registry
                .typed
                .get(&kind)
                .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default();
            let wildcard: Vec<WildcardHandler<E>> =
                registry.wildcard.iter().map(|(_, h)| h.clone()).collect();
            (typed, wildcard)
        };

        for handler in typed {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(kind = ?kind, "Event handler panicked");
            }
        }

        for handler in wildcard {
            if catch_unwind(AssertUnwindSafe(|| handler(kind, event))).is_err() {
                error!(kind = ?kind, "Wildcard event handler panicked");
            }
        }
    }

    /// Number of handlers registered for a kind, excluding wildcards
    pub fn handler_count(&self, kind: E::Kind) -> usize {
        self.registry
            .lock()
            .typed
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl<E: Event> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Ping,
        Pong,
    }

    #[derive(Debug)]
    struct Msg(Kind, u32);

    impl Event for Msg {
        type Kind = Kind;

        fn kind(&self) -> Kind {
            self.0
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let emitter = EventEmitter::<Msg>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = log.clone();
            emitter.on(Kind::Ping, move |_| log.lock().push(tag));
        }

        emitter.emit(&Msg(Kind::Ping, 1));
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn wildcard_runs_after_typed_and_sees_kind() {
        let emitter = EventEmitter::<Msg>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let wildcard_log = log.clone();
        emitter.on_any(move |kind, msg| wildcard_log.lock().push(format!("any:{kind:?}:{}", msg.1)));
        let typed_log = log.clone();
        emitter.on(Kind::Pong, move |msg| typed_log.lock().push(format!("pong:{}", msg.1)));

        emitter.emit(&Msg(Kind::Pong, 7));
        emitter.emit(&Msg(Kind::Ping, 8));

        assert_eq!(
            *log.lock(),
            vec!["pong:7".to_string(), "any:Pong:7".to_string(), "any:Ping:8".to_string()]
        );
    }

    #[test]
    fn panicking_handler_does_not_block_others() {
        let emitter = EventEmitter::<Msg>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        emitter.on(Kind::Ping, |_| panic!("faulty subscriber"));
        let counter = hits.clone();
        emitter.on(Kind::Ping, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = hits.clone();
        emitter.on_any(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&Msg(Kind::Ping, 0));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn off_removes_only_that_handler() {
        let emitter = EventEmitter::<Msg>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let removed = emitter.on(Kind::Ping, move |_| {
            counter.fetch_add(10, Ordering::SeqCst);
        });
        let counter = hits.clone();
        emitter.on(Kind::Ping, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(emitter.off(removed));
        assert!(!emitter.off(removed), "second off should report unknown id");
        emitter.emit(&Msg(Kind::Ping, 0));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.handler_count(Kind::Ping), 1);
    }

    #[test]
    fn handler_may_subscribe_during_emit() {
        let emitter = Arc::new(EventEmitter::<Msg>::new());
        let inner = emitter.clone();
        emitter.on(Kind::Ping, move |_| {
            inner.on(Kind::Pong, |_| {});
        });

        emitter.emit(&Msg(Kind::Ping, 0));
        assert_eq!(emitter.handler_count(Kind::Pong), 1);
    }
}
