//! Mutable node graph behind the published views.
//!
//! # Overview
//!
//! Every map or list position of the stored value is a [`Node`] in an arena
//! keyed by [`NodeId`]. A node records, per parent, the slot keys that
//! reference it, so one subtree may sit at several paths (and at several keys
//! of the same parent) without being copied.
//!
//! Reachability is tracked by those parent edges alone. Removing an edge
//! queues the child as an eviction candidate; [`Graph::sweep`] evicts every
//! candidate left without parents, recursively, once the whole mutation has
//! been applied. Nothing ever scans the full arena.
//!
//! A node's `view` is `None` while it is stale. Staleness always covers every
//! ancestor of a stale node, which lets [`Graph::mark_stale`] stop at the first
//! node that is already stale.

mod absorb;
mod materialize;

pub(crate) use absorb::{Plan, Scope};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::rc::Weak;

use indexmap::IndexMap;
use snaptree_events::Emitter;

use crate::error::{NodeKind, StoreError};
use crate::store::Shared;
use crate::value::{PathStep, Scalar};
use crate::view::{Body, View};

/// Store-unique node identifier. A view carries the id of its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Leaf(Scalar),
    Node(NodeId),
}

#[derive(Debug, Clone)]
pub(crate) enum Children {
    Map(IndexMap<String, Slot>),
    List(Vec<Slot>),
}

impl Children {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Children::Map(_) => NodeKind::Map,
            Children::List(_) => NodeKind::List,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Children::Map(m) => m.len(),
            Children::List(l) => l.len(),
        }
    }

    /// Node children with the key they sit under.
    pub(crate) fn node_edges(&self) -> Vec<(NodeId, PathStep)> {
        match self {
            Children::Map(m) => m
                .iter()
                .filter_map(|(k, slot)| match slot {
                    Slot::Node(id) => Some((*id, PathStep::Key(k.clone()))),
                    Slot::Leaf(_) => None,
                })
                .collect(),
            Children::List(l) => l
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| match slot {
                    Slot::Node(id) => Some((*id, PathStep::Index(i))),
                    Slot::Leaf(_) => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) children: Children,
    pub(crate) parents: BTreeMap<NodeId, Vec<PathStep>>,
    pub(crate) view: Option<View>,
    pub(crate) listener: Option<Emitter<View>>,
}

impl Node {
    fn new(children: Children) -> Self {
        Self {
            children,
            parents: BTreeMap::new(),
            view: None,
            listener: None,
        }
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.children.kind()
    }
}

pub(crate) struct Graph {
    pub(crate) nodes: HashMap<NodeId, Node>,
    pub(crate) root: NodeId,
    pub(crate) store: Weak<Shared>,
    next_id: u64,
    /// Nodes that lost a parent edge during the current mutation.
    candidates: Vec<NodeId>,
    /// Nodes that received a new view during the current mutation.
    pub(crate) refreshed: Vec<NodeId>,
}

impl Graph {
    /// A graph holding an empty map as its root, with the root's view.
    pub(crate) fn new(store: Weak<Shared>) -> (Self, View) {
        let mut graph = Self {
            nodes: HashMap::new(),
            root: NodeId(0),
            store,
            next_id: 1,
            candidates: Vec::new(),
            refreshed: Vec::new(),
        };
        let root = graph.allocate_id();
        let view = View::new(root, Body::Map(IndexMap::new()), graph.store.clone());
        let mut node = Node::new(Children::Map(IndexMap::new()));
        node.view = Some(view.clone());
        graph.nodes.insert(root, node);
        graph.root = root;
        (graph, view)
    }

    pub(crate) fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn live(&self, id: NodeId) -> Result<&Node, StoreError> {
        self.nodes.get(&id).ok_or(StoreError::StaleReference(id))
    }

    pub(crate) fn live_mut(&mut self, id: NodeId) -> Result<&mut Node, StoreError> {
        self.nodes.get_mut(&id).ok_or(StoreError::StaleReference(id))
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Current view of the root. Only valid once the graph is materialized.
    pub(crate) fn root_view(&self) -> Result<View, StoreError> {
        self.nodes
            .get(&self.root)
            .and_then(|node| node.view.clone())
            .ok_or_else(|| StoreError::PathNotFound(format!("root {} has no view", self.root)))
    }

    pub(crate) fn link(&mut self, child: NodeId, parent: NodeId, key: PathStep) {
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parents.entry(parent).or_default().push(key);
        }
    }

    /// Remove one `(parent, key)` edge and queue the child for [`Graph::sweep`].
    pub(crate) fn unlink(&mut self, child: NodeId, parent: NodeId, key: &PathStep) {
        let Some(node) = self.nodes.get_mut(&child) else {
            return;
        };
        if let Some(keys) = node.parents.get_mut(&parent) {
            if let Some(pos) = keys.iter().position(|k| k == key) {
                keys.swap_remove(pos);
            }
            if keys.is_empty() {
                node.parents.remove(&parent);
            }
        }
        if node.parents.is_empty() {
            self.candidates.push(child);
        }
    }

    /// Evict every queued node that is still without parents, cascading into
    /// children that lose their last edge. Returns the number of evicted nodes.
    pub(crate) fn sweep(&mut self) -> usize {
        let mut evicted = 0;
        while let Some(id) = self.candidates.pop() {
            if id == self.root {
                continue;
            }
            let orphan = self
                .nodes
                .get(&id)
                .is_some_and(|node| node.parents.is_empty());
            if !orphan {
                continue;
            }
            let Some(node) = self.nodes.remove(&id) else {
                continue;
            };
            tracing::trace!(node = %id, listener = node.listener.is_some(), "evicted node");
            evicted += 1;
            for (child, key) in node.children.node_edges() {
                self.unlink(child, id, &key);
            }
        }
        evicted
    }

    /// Mark `id` and every ancestor stale, walking every parent chain.
    pub(crate) fn mark_stale(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.view.take().is_none() {
                continue;
            }
            stack.extend(node.parents.keys().copied());
        }
    }

    pub(crate) fn ancestors_or_self(&self, id: NodeId) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.parents.keys().copied());
            }
        }
        seen
    }

    /// Every path from the root to `id`, sorted.
    pub(crate) fn paths(&self, id: NodeId) -> Result<Vec<Vec<PathStep>>, StoreError> {
        if id == self.root {
            return Ok(vec![Vec::new()]);
        }
        let node = self.live(id)?;
        let mut out = Vec::new();
        for (parent, keys) in &node.parents {
            if !self.nodes.contains_key(parent) {
                return Err(StoreError::PathNotFound(format!(
                    "parent {parent} of {id} is not in the index"
                )));
            }
            for prefix in self.paths(*parent)? {
                for key in keys {
                    let mut path = prefix.clone();
                    path.push(key.clone());
                    out.push(path);
                }
            }
        }
        if out.is_empty() {
            return Err(StoreError::PathNotFound(format!("{id} is unreachable")));
        }
        out.sort();
        Ok(out)
    }

    /// Listener of `id`, created on first request.
    pub(crate) fn listener(&mut self, id: NodeId) -> Result<Emitter<View>, StoreError> {
        let node = self.live_mut(id)?;
        Ok(node.listener.get_or_insert_with(Emitter::new).clone())
    }

    /// Replace the children of the list `id` in `start..start + delete` with
    /// `inserted`.
    ///
    /// Every child at or after `start` has its edge key rewritten to its new
    /// index. Inserted nodes are linked here; removed slots are returned and
    /// their nodes queued for [`Graph::sweep`].
    pub(crate) fn splice_list(
        &mut self,
        id: NodeId,
        start: usize,
        delete: usize,
        inserted: Vec<Slot>,
    ) -> Result<Vec<Slot>, StoreError> {
        let trailing: Vec<(usize, NodeId)> = match &self.live(id)?.children {
            Children::List(items) => items
                .iter()
                .enumerate()
                .skip(start)
                .filter_map(|(i, slot)| match slot {
                    Slot::Node(child) => Some((i, *child)),
                    Slot::Leaf(_) => None,
                })
                .collect(),
            Children::Map(_) => {
                return Err(StoreError::UnsupportedOperation {
                    op: "splice",
                    kind: NodeKind::Map,
                })
            }
        };
        for (i, child) in &trailing {
            self.unlink(*child, id, &PathStep::Index(*i));
        }

        let (removed, relink) = {
            let node = self.live_mut(id)?;
            let Children::List(items) = &mut node.children else {
                return Err(StoreError::PathNotFound(format!("{id} stopped being a list")));
            };
            let end = (start + delete).min(items.len());
            let removed: Vec<Slot> = items.splice(start..end, inserted).collect();
            let relink: Vec<(usize, NodeId)> = items
                .iter()
                .enumerate()
                .skip(start)
                .filter_map(|(i, slot)| match slot {
                    Slot::Node(child) => Some((i, *child)),
                    Slot::Leaf(_) => None,
                })
                .collect();
            (removed, relink)
        };
        for (i, child) in relink {
            self.link(child, id, PathStep::Index(i));
        }
        Ok(removed)
    }

    /// Put `slot` under `key` of the map `id`, returning the previous slot.
    /// The new child is linked before the old one is unlinked.
    pub(crate) fn put_map(
        &mut self,
        id: NodeId,
        key: String,
        slot: Slot,
    ) -> Result<Option<Slot>, StoreError> {
        if let Slot::Node(child) = &slot {
            self.link(*child, id, PathStep::Key(key.clone()));
        }
        let node = self.live_mut(id)?;
        let Children::Map(entries) = &mut node.children else {
            return Err(StoreError::UnsupportedOperation {
                op: "replace",
                kind: NodeKind::List,
            });
        };
        let old = entries.insert(key.clone(), slot);
        if let Some(Slot::Node(child)) = &old {
            self.unlink(*child, id, &PathStep::Key(key));
        }
        Ok(old)
    }

    /// Overwrite index `index` of the list `id` (which must be in bounds).
    pub(crate) fn put_list(
        &mut self,
        id: NodeId,
        index: usize,
        slot: Slot,
    ) -> Result<Slot, StoreError> {
        if let Slot::Node(child) = &slot {
            self.link(*child, id, PathStep::Index(index));
        }
        let node = self.live_mut(id)?;
        let Children::List(items) = &mut node.children else {
            return Err(StoreError::UnsupportedOperation {
                op: "replace",
                kind: NodeKind::Map,
            });
        };
        let len = items.len();
        let Some(target) = items.get_mut(index) else {
            return Err(StoreError::IndexOutOfBounds { index, len });
        };
        let old = std::mem::replace(target, slot);
        if let Slot::Node(child) = &old {
            self.unlink(*child, id, &PathStep::Index(index));
        }
        Ok(old)
    }

    pub(crate) fn remove_map_key(
        &mut self,
        id: NodeId,
        key: &str,
    ) -> Result<Option<Slot>, StoreError> {
        let node = self.live_mut(id)?;
        let Children::Map(entries) = &mut node.children else {
            return Err(StoreError::UnsupportedOperation {
                op: "remove",
                kind: NodeKind::List,
            });
        };
        let old = entries.shift_remove(key);
        if let Some(Slot::Node(child)) = &old {
            self.unlink(*child, id, &PathStep::Key(key.to_string()));
        }
        Ok(old)
    }

    /// Swap in a whole new set of children for `id`.
    ///
    /// New children are linked before the old ones are unlinked, so a node
    /// present in both sets never becomes an eviction candidate by accident.
    pub(crate) fn reset_children(&mut self, id: NodeId, children: Children) -> Result<(), StoreError> {
        for (child, key) in children.node_edges() {
            self.link(child, id, key);
        }
        let node = self.live_mut(id)?;
        let old = std::mem::replace(&mut node.children, children);
        for (child, key) in old.node_edges() {
            self.unlink(child, id, &key);
        }
        Ok(())
    }
}
