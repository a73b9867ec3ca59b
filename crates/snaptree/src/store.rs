//! The store facade: root tracking, subscriptions and flushing.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use snaptree_events::{Emitter, HandlerId, Scheduler, UPDATE_EVENT};

use crate::config::{FlushMode, StoreConfig};
use crate::error::StoreError;
use crate::graph::{Graph, NodeId};
use crate::ops::{Applied, Operation};
use crate::value::{Fragment, Item, PathStep};
use crate::view::View;

/// A pending notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Notify {
    Node(NodeId),
    Root,
}

pub(crate) struct Engine {
    pub(crate) graph: Graph,
    pub(crate) scheduler: Scheduler<Notify>,
    pub(crate) current: View,
}

impl Engine {
    fn new(store: Weak<Shared>) -> Self {
        let (graph, current) = Graph::new(store);
        Self {
            graph,
            scheduler: Scheduler::new(),
            current,
        }
    }
}

/// State shared between a [`Store`] and every view it hands out.
pub(crate) struct Shared {
    pub(crate) engine: RefCell<Engine>,
    events: Emitter<View>,
    config: StoreConfig,
    flushing: Cell<bool>,
}

impl Shared {
    /// Run one top-level mutation. In immediate mode the resulting batch is
    /// flushed before returning, unless a flush is already delivering.
    pub(crate) fn run<R>(
        &self,
        f: impl FnOnce(&mut Engine) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let result = {
            let mut engine = self.engine.borrow_mut();
            f(&mut engine)
        };
        if result.is_ok() && self.config.flush == FlushMode::Immediate && !self.flushing.get() {
            self.flush();
        }
        result
    }

    /// Deliver every pending notification once, with the latest view as of
    /// this flush. Changes made by handlers are batched for the next flush.
    fn flush(&self) -> usize {
        if self.flushing.replace(true) {
            return 0;
        }
        let deliveries: Vec<(Emitter<View>, &str, View)> = {
            let mut engine = self.engine.borrow_mut();
            let batch = engine.scheduler.take_batch();
            let mut out = Vec::with_capacity(batch.len());
            for task in batch {
                match task {
                    Notify::Root => out.push((
                        self.events.clone(),
                        self.config.root_event.as_str(),
                        engine.current.clone(),
                    )),
                    Notify::Node(id) => {
                        // evicted since it was scheduled
                        let Some(node) = engine.graph.node(id) else {
                            continue;
                        };
                        if let (Some(listener), Some(view)) = (&node.listener, &node.view) {
                            out.push((listener.clone(), UPDATE_EVENT, view.clone()));
                        }
                    }
                }
            }
            out
        };

        let mut delivered = 0;
        for (emitter, event, view) in &deliveries {
            delivered += emitter.emit(event, view);
        }
        self.flushing.set(false);
        if !deliveries.is_empty() {
            tracing::debug!(notifications = deliveries.len(), delivered, "flushed updates");
        }
        delivered
    }
}

/// An observable tree of maps and lists.
///
/// Cloning a `Store` is cheap and yields a handle to the same tree.
#[derive(Clone)]
pub struct Store {
    shared: Rc<Shared>,
}

impl Store {
    pub fn new(initial: impl Into<Fragment>) -> Result<Self, StoreError> {
        Self::with_config(initial, StoreConfig::default())
    }

    /// Build a store from `initial`, which must be a map, a list, or a view.
    /// Building the initial tree schedules no notifications.
    pub fn with_config(
        initial: impl Into<Fragment>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let shared = Rc::new_cyclic(|weak| Shared {
            engine: RefCell::new(Engine::new(weak.clone())),
            events: Emitter::new(),
            config,
            flushing: Cell::new(false),
        });
        {
            let mut engine = shared.engine.borrow_mut();
            engine.replace_all(initial.into())?;
            engine.scheduler.take_batch();
            tracing::debug!(nodes = engine.graph.len(), "store created");
        }
        Ok(Self { shared })
    }

    /// The current root view.
    pub fn current(&self) -> View {
        self.shared.engine.borrow().current.clone()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Replace the whole tree. The root keeps its id; passing a historical
    /// root view restores that generation, and passing the current root view
    /// changes nothing.
    pub fn replace_all(&self, next: impl Into<Fragment>) -> Result<View, StoreError> {
        let next = next.into();
        self.shared.run(|engine| engine.replace_all(next))
    }

    /// Apply `op` to the node behind `target`.
    pub fn apply(&self, target: &View, op: Operation) -> Result<Applied, StoreError> {
        self.shared.run(|engine| engine.apply(target, op))
    }

    /// Apply an operation given by name, see [`Operation::from_name`].
    pub fn apply_named(
        &self,
        target: &View,
        name: &str,
        args: serde_json::Value,
    ) -> Result<Applied, StoreError> {
        let op = Operation::from_name(name, args)?;
        self.apply(target, op)
    }

    pub fn find(&self, path: &[PathStep]) -> Option<Item> {
        self.current().at(path)
    }

    pub fn find_ptr(&self, pointer: &str) -> Result<Option<Item>, StoreError> {
        self.current().at_ptr(pointer)
    }

    /// Subscribe to root-level events. The store emits its configured root
    /// event (`"update"` by default) with the new root view on each flush.
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> HandlerId
    where
        F: FnMut(&View) + 'static,
    {
        self.shared.events.on(event, handler)
    }

    pub fn subscribe_once<F>(&self, event: impl Into<String>, handler: F) -> HandlerId
    where
        F: FnMut(&View) + 'static,
    {
        self.shared.events.once(event, handler)
    }

    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        self.shared.events.off(id)
    }

    /// The root-level emitter.
    pub fn events(&self) -> Emitter<View> {
        self.shared.events.clone()
    }

    /// Deliver pending notifications now. Returns the number of handler
    /// invocations. A flush requested from inside a handler does nothing.
    pub fn flush(&self) -> usize {
        self.shared.flush()
    }

    pub fn has_pending(&self) -> bool {
        !self.shared.engine.borrow().scheduler.is_idle()
    }

    /// Live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.shared.engine.borrow().graph.len()
    }

    /// Whether `view` belongs to this store and its node is still live.
    pub fn contains(&self, view: &View) -> bool {
        let engine = self.shared.engine.borrow();
        view.belongs_to(&engine.graph.store) && engine.graph.node(view.id()).is_some()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.shared.config)
            .field("root", &self.current())
            .finish()
    }
}
