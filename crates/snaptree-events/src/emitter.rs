use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// Event name fired by the store and by node listeners after a flush.
pub const UPDATE_EVENT: &str = "update";

pub type HandlerId = u64;

type Handler<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct Subscription<T> {
    event: String,
    once: bool,
    handler: Handler<T>,
}

struct Registry<T> {
    next_handler_id: u64,
    handlers: BTreeMap<HandlerId, Subscription<T>>,
}

/// Shared handle to a set of named-event subscriptions.
///
/// Cloning an `Emitter` yields another handle to the same registry, which is
/// how a node listener handed out to callers stays connected to the node.
pub struct Emitter<T> {
    registry: Rc<RefCell<Registry<T>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        f.debug_struct("Emitter")
            .field("handlers", &registry.handlers.len())
            .finish()
    }
}

impl<T> Emitter<T> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_handler_id: 1,
                handlers: BTreeMap::new(),
            })),
        }
    }

    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> HandlerId
    where
        F: FnMut(&T) + 'static,
    {
        self.subscribe(event.into(), false, Rc::new(RefCell::new(handler)))
    }

    /// Subscribe a handler that is removed right before its first delivery.
    pub fn once<F>(&self, event: impl Into<String>, handler: F) -> HandlerId
    where
        F: FnMut(&T) + 'static,
    {
        self.subscribe(event.into(), true, Rc::new(RefCell::new(handler)))
    }

    fn subscribe(&self, event: String, once: bool, handler: Handler<T>) -> HandlerId {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_handler_id;
        registry.next_handler_id = registry.next_handler_id.saturating_add(1);
        registry.handlers.insert(
            id,
            Subscription {
                event,
                once,
                handler,
            },
        );
        id
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.registry.borrow_mut().handlers.remove(&id).is_some()
    }

    /// Drop every handler subscribed to `event`; returns how many were removed.
    pub fn off_event(&self, event: &str) -> usize {
        let mut registry = self.registry.borrow_mut();
        let before = registry.handlers.len();
        registry.handlers.retain(|_, sub| sub.event != event);
        before - registry.handlers.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.registry
            .borrow()
            .handlers
            .values()
            .filter(|sub| sub.event == event)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.borrow().handlers.is_empty()
    }

    /// Returns `true` when both handles point at the same registry.
    pub fn same_as(&self, other: &Emitter<T>) -> bool {
        Rc::ptr_eq(&self.registry, &other.registry)
    }

    /// Deliver `payload` to every handler of `event`, in subscription order.
    ///
    /// No registry borrow is held while handlers run, so a handler may
    /// subscribe, unsubscribe or emit again. Returns the number of handlers
    /// that completed without panicking.
    pub fn emit(&self, event: &str, payload: &T) -> usize {
        let due: Vec<(HandlerId, bool, Handler<T>)> = {
            let mut registry = self.registry.borrow_mut();
            let ids: Vec<(HandlerId, bool)> = registry
                .handlers
                .iter()
                .filter(|(_, sub)| sub.event == event)
                .map(|(id, sub)| (*id, sub.once))
                .collect();
            let mut due = Vec::with_capacity(ids.len());
            for (id, once) in ids {
                let handler = if once {
                    registry.handlers.remove(&id).map(|sub| sub.handler)
                } else {
                    registry.handlers.get(&id).map(|sub| Rc::clone(&sub.handler))
                };
                if let Some(handler) = handler {
                    due.push((id, once, handler));
                }
            }
            due
        };

        let mut delivered = 0;
        for (id, once, handler) in due {
            // An earlier handler in this round may have unsubscribed this one.
            if !once && !self.registry.borrow().handlers.contains_key(&id) {
                continue;
            }
            let Ok(mut handler) = handler.try_borrow_mut() else {
                tracing::warn!(event, handler = id, "skipping re-entrant event handler");
                continue;
            };
            match panic::catch_unwind(AssertUnwindSafe(|| (&mut *handler)(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!(event, handler = id, "event handler panicked"),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<i32>>>, impl FnMut(&i32) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |v: &i32| sink.borrow_mut().push(*v))
    }

    #[test]
    fn on_receives_every_emit_for_its_event() {
        let emitter = Emitter::new();
        let (seen, handler) = recorder();
        emitter.on("update", handler);
        assert_eq!(emitter.emit("update", &1), 1);
        assert_eq!(emitter.emit("other", &2), 0);
        assert_eq!(emitter.emit("update", &3), 1);
        assert_eq!(*seen.borrow(), vec![1, 3]);
    }

    #[test]
    fn once_is_removed_after_first_delivery() {
        let emitter = Emitter::new();
        let (seen, handler) = recorder();
        emitter.once("update", handler);
        assert_eq!(emitter.listener_count("update"), 1);
        emitter.emit("update", &1);
        emitter.emit("update", &2);
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(emitter.listener_count("update"), 0);
    }

    #[test]
    fn off_unsubscribes() {
        let emitter = Emitter::new();
        let (seen, handler) = recorder();
        let id = emitter.on("update", handler);
        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        emitter.emit("update", &1);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn off_event_drops_all_handlers_of_that_event() {
        let emitter: Emitter<i32> = Emitter::new();
        emitter.on("a", |_| {});
        emitter.on("a", |_| {});
        emitter.on("b", |_| {});
        assert_eq!(emitter.off_event("a"), 2);
        assert_eq!(emitter.listener_count("b"), 1);
    }

    #[test]
    fn panicking_handler_does_not_stop_the_others() {
        let emitter = Emitter::new();
        let (seen, handler) = recorder();
        emitter.on("update", |_: &i32| panic!("boom"));
        emitter.on("update", handler);
        assert_eq!(emitter.emit("update", &7), 1);
        assert_eq!(*seen.borrow(), vec![7]);
        // still usable afterwards
        assert_eq!(emitter.emit("update", &8), 1);
    }

    #[test]
    fn handler_can_unsubscribe_a_later_handler() {
        let emitter: Emitter<i32> = Emitter::new();
        let (seen, handler) = recorder();
        let victim = Rc::new(RefCell::new(0));
        let clone = emitter.clone();
        let victim_id = Rc::clone(&victim);
        emitter.on("update", move |_| {
            clone.off(*victim_id.borrow());
        });
        *victim.borrow_mut() = emitter.on("update", handler);
        emitter.emit("update", &1);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn clones_share_the_registry() {
        let emitter: Emitter<i32> = Emitter::new();
        let other = emitter.clone();
        other.on("update", |_| {});
        assert!(emitter.same_as(&other));
        assert_eq!(emitter.listener_count("update"), 1);
        assert!(!emitter.same_as(&Emitter::new()));
    }
}
