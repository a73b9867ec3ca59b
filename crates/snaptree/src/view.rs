//! Frozen, shareable snapshots of tree nodes.
//!
//! A [`View`] never changes after it is built. Every mutating method asks the
//! owning store to apply the change to the view's node and returns the node's
//! new view; the receiver is left untouched. Mutating through an older view of
//! a node applies to the node's current state.
//!
//! Equality on views is identity: two views are equal only when they are the
//! same allocation, which is what structural sharing guarantees for subtrees
//! that did not change.

use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use snaptree_events::Emitter;

use crate::error::{NodeKind, StoreError};
use crate::graph::NodeId;
use crate::ops::{Applied, Operation};
use crate::pointer::{format_pointer, parse_pointer};
use crate::store::Shared;
use crate::value::{Fragment, Item, PathStep};

#[derive(Debug)]
pub(crate) enum Body {
    Map(IndexMap<String, Item>),
    List(Vec<Item>),
}

struct ViewData {
    id: NodeId,
    body: Body,
    store: Weak<Shared>,
}

#[derive(Clone)]
pub struct View(Rc<ViewData>);

impl View {
    pub(crate) fn new(id: NodeId, body: Body, store: Weak<Shared>) -> Self {
        Self(Rc::new(ViewData { id, body, store }))
    }

    pub(crate) fn body(&self) -> &Body {
        &self.0.body
    }

    pub(crate) fn belongs_to(&self, store: &Weak<Shared>) -> bool {
        Weak::ptr_eq(&self.0.store, store)
    }

    fn shared(&self) -> Result<Rc<Shared>, StoreError> {
        self.0
            .store
            .upgrade()
            .ok_or(StoreError::StaleReference(self.0.id))
    }

    fn apply(&self, op: Operation) -> Result<Applied, StoreError> {
        let shared = self.shared()?;
        shared.run(|engine| engine.apply(self, op))
    }

    pub fn ptr_eq(a: &View, b: &View) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Id of the node this view belongs to; stable across generations.
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn kind(&self) -> NodeKind {
        match &self.0.body {
            Body::Map(_) => NodeKind::Map,
            Body::List(_) => NodeKind::List,
        }
    }

    pub fn is_map(&self) -> bool {
        self.kind() == NodeKind::Map
    }

    pub fn is_list(&self) -> bool {
        self.kind() == NodeKind::List
    }

    pub fn len(&self) -> usize {
        match &self.0.body {
            Body::Map(m) => m.len(),
            Body::List(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: impl Into<PathStep>) -> Option<&Item> {
        let key = key.into();
        match &self.0.body {
            Body::Map(m) => m.get(key.to_key().as_str()),
            Body::List(l) => l.get(key.to_index()?),
        }
    }

    /// The nested view under `key`, if that entry is not a leaf.
    pub fn child(&self, key: impl Into<PathStep>) -> Option<View> {
        self.get(key).and_then(Item::as_view).cloned()
    }

    pub fn contains_key(&self, key: impl Into<PathStep>) -> bool {
        self.get(key).is_some()
    }

    pub fn at(&self, path: &[PathStep]) -> Option<Item> {
        let Some((last, parents)) = path.split_last() else {
            return Some(Item::View(self.clone()));
        };
        let mut cur = self.clone();
        for step in parents {
            cur = cur.child(step)?;
        }
        cur.get(last).cloned()
    }

    /// Like [`View::at`] with an RFC 6901 pointer. A malformed pointer is an
    /// error; a well-formed one that leads nowhere is `Ok(None)`.
    pub fn at_ptr(&self, pointer: &str) -> Result<Option<Item>, StoreError> {
        let path = parse_pointer(pointer)?;
        Ok(self.at(&path))
    }

    pub fn keys(&self) -> Vec<PathStep> {
        self.entries().map(|(k, _)| k).collect()
    }

    pub fn entries(&self) -> Entries<'_> {
        Entries {
            inner: match &self.0.body {
                Body::Map(m) => EntriesInner::Map(m.iter()),
                Body::List(l) => EntriesInner::List(l.iter().enumerate()),
            },
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.entries().map(|(_, item)| item)
    }

    /// Position of `item` in a list view. Nested views match by identity.
    pub fn index_of(&self, item: &Item) -> Option<usize> {
        match &self.0.body {
            Body::List(l) => l.iter().position(|candidate| candidate == item),
            Body::Map(_) => None,
        }
    }

    /// Plain JSON for the whole subtree.
    pub fn value(&self) -> Value {
        match &self.0.body {
            Body::Map(m) => Value::Object(
                m.iter()
                    .map(|(k, item)| (k.clone(), item.value()))
                    .collect::<Map<String, Value>>(),
            ),
            Body::List(l) => Value::Array(l.iter().map(Item::value).collect()),
        }
    }

    /// Whether this is still the current view of a live node.
    pub fn is_current(&self) -> bool {
        let Ok(shared) = self.shared() else {
            return false;
        };
        let Ok(engine) = shared.engine.try_borrow() else {
            return false;
        };
        engine
            .graph
            .node(self.0.id)
            .and_then(|node| node.view.as_ref())
            .is_some_and(|current| View::ptr_eq(current, self))
    }

    pub fn set<I, K, F>(&self, entries: I) -> Result<View, StoreError>
    where
        I: IntoIterator<Item = (K, F)>,
        K: Into<PathStep>,
        F: Into<Fragment>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.apply(Operation::Replace(entries)).map(|a| a.view)
    }

    /// `set` taking its entries from a map (by key) or list (by index).
    pub fn assign(&self, update: impl Into<Fragment>) -> Result<View, StoreError> {
        let entries: Vec<(PathStep, Fragment)> = match update.into() {
            Fragment::Map(m) => m.into_iter().map(|(k, v)| (PathStep::Key(k), v)).collect(),
            Fragment::List(l) => l
                .into_iter()
                .enumerate()
                .map(|(i, v)| (PathStep::Index(i), v))
                .collect(),
            Fragment::View(v) => v
                .entries()
                .map(|(k, item)| (k, Fragment::from(item)))
                .collect(),
            Fragment::Scalar(_) => return Err(StoreError::NotContainer),
        };
        self.apply(Operation::Replace(entries)).map(|a| a.view)
    }

    /// Add or overwrite one key of a map.
    pub fn add(&self, key: impl Into<String>, value: impl Into<Fragment>) -> Result<View, StoreError> {
        if self.kind() != NodeKind::Map {
            return Err(StoreError::UnsupportedOperation {
                op: "add",
                kind: self.kind(),
            });
        }
        self.set([(PathStep::Key(key.into()), value.into())])
    }

    /// Remove keys (maps) or indices (lists). Missing keys are ignored; if
    /// none exist the current view comes back and nothing is notified.
    pub fn remove<I, K>(&self, keys: I) -> Result<View, StoreError>
    where
        I: IntoIterator<Item = K>,
        K: Into<PathStep>,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.apply(Operation::RemoveKeys(keys)).map(|a| a.view)
    }

    /// Remove this node from every place it is referenced. Returns the new
    /// root view.
    pub fn remove_self(&self) -> Result<View, StoreError> {
        self.apply(Operation::RemoveSelf).map(|a| a.view)
    }

    pub fn push(&self, item: impl Into<Fragment>) -> Result<View, StoreError> {
        self.append([item.into()])
    }

    pub fn append<I, F>(&self, items: I) -> Result<View, StoreError>
    where
        I: IntoIterator<Item = F>,
        F: Into<Fragment>,
    {
        let items = items.into_iter().map(Into::into).collect();
        self.apply(Operation::Append(items)).map(|a| a.view)
    }

    pub fn unshift(&self, item: impl Into<Fragment>) -> Result<View, StoreError> {
        self.prepend([item.into()])
    }

    pub fn prepend<I, F>(&self, items: I) -> Result<View, StoreError>
    where
        I: IntoIterator<Item = F>,
        F: Into<Fragment>,
    {
        let items = items.into_iter().map(Into::into).collect();
        self.apply(Operation::Prepend(items)).map(|a| a.view)
    }

    /// Remove the last item. `None` (and no change) on an empty list.
    pub fn pop(&self) -> Result<(View, Option<Item>), StoreError> {
        let applied = self.apply(Operation::Pop)?;
        Ok((applied.view, applied.removed.into_iter().next()))
    }

    /// Remove the first item. `None` (and no change) on an empty list.
    pub fn shift(&self) -> Result<(View, Option<Item>), StoreError> {
        let applied = self.apply(Operation::Shift)?;
        Ok((applied.view, applied.removed.into_iter().next()))
    }

    pub fn splice<I, F>(
        &self,
        index: usize,
        delete: usize,
        insert: I,
    ) -> Result<(View, Vec<Item>), StoreError>
    where
        I: IntoIterator<Item = F>,
        F: Into<Fragment>,
    {
        let insert = insert.into_iter().map(Into::into).collect();
        let applied = self.apply(Operation::Splice {
            index,
            delete,
            insert,
        })?;
        Ok((applied.view, applied.removed))
    }

    /// Every location of this node in the current tree. A shared subtree
    /// has one path per place it is referenced from.
    pub fn paths(&self) -> Result<Vec<Vec<PathStep>>, StoreError> {
        let shared = self.shared()?;
        let engine = shared.engine.borrow();
        engine.graph.paths(self.0.id)
    }

    pub fn pointers(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .paths()?
            .iter()
            .map(|path| format_pointer(path))
            .collect())
    }

    /// Emitter scoped to this node. It fires `"update"` with the node's latest
    /// view on the flush following any change inside the subtree.
    pub fn listener(&self) -> Result<Emitter<View>, StoreError> {
        let shared = self.shared()?;
        let mut engine = shared.engine.borrow_mut();
        engine.graph.listener(self.0.id)
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        View::ptr_eq(self, other)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("id", &self.0.id)
            .field("body", &self.0.body)
            .finish()
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

pub struct Entries<'a> {
    inner: EntriesInner<'a>,
}

enum EntriesInner<'a> {
    Map(indexmap::map::Iter<'a, String, Item>),
    List(std::iter::Enumerate<std::slice::Iter<'a, Item>>),
}

impl<'a> Iterator for Entries<'a> {
    type Item = (PathStep, &'a Item);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            EntriesInner::Map(it) => it.next().map(|(k, v)| (PathStep::Key(k.clone()), v)),
            EntriesInner::List(it) => it.next().map(|(i, v)| (PathStep::Index(i), v)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            EntriesInner::Map(it) => it.size_hint(),
            EntriesInner::List(it) => it.size_hint(),
        }
    }
}
