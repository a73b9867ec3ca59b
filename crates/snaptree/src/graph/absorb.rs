//! Bringing fragments into the graph.
//!
//! Absorption runs in two phases. [`Graph::plan`] classifies every embedded
//! view against the untouched graph and rejects cycles; [`Graph::build`] then
//! creates, reuses or restores nodes without any further validation.
//!
//! A view of a live node always stands for that node as it is now, whatever
//! generation the view is. Only restoring a root snapshot resets live nodes
//! to older generations, and only an evicted node is brought back from the
//! view that still describes it.

use std::collections::HashSet;

use indexmap::IndexMap;

use super::{Children, Graph, Node, NodeId, Slot};
use crate::error::StoreError;
use crate::value::{Fragment, Item, Scalar};
use crate::view::{Body, View};

#[derive(Debug)]
pub(crate) enum Plan {
    Leaf(Scalar),
    Map(Vec<(String, Plan)>),
    List(Vec<Plan>),
    /// Share the live node as it is.
    Reuse(NodeId),
    /// (Re)install the node with the view's entries: the node was evicted,
    /// or a root snapshot is being restored.
    Adopt {
        id: NodeId,
        view: View,
        body: Box<Plan>,
    },
}

/// Rules for one planning pass.
pub(crate) struct Scope {
    /// The write target and its ancestors.
    forbidden: HashSet<NodeId>,
    /// Reset live nodes to the generation of the view being absorbed.
    restore: bool,
    /// Nodes already adopted in this pass; later occurrences share them.
    adopted: HashSet<NodeId>,
}

impl Scope {
    /// A write whose target and ancestors are `forbidden`.
    pub(crate) fn write(forbidden: HashSet<NodeId>) -> Self {
        Self {
            forbidden,
            restore: false,
            adopted: HashSet::new(),
        }
    }

    /// Restoring a snapshot of `root`.
    pub(crate) fn restore(root: NodeId) -> Self {
        Self {
            forbidden: HashSet::from([root]),
            restore: true,
            adopted: HashSet::new(),
        }
    }
}

impl Graph {
    pub(crate) fn plan(&self, fragment: Fragment, scope: &mut Scope) -> Result<Plan, StoreError> {
        match fragment {
            Fragment::Scalar(s) => Ok(Plan::Leaf(s)),
            Fragment::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    out.push((key, self.plan(value, scope)?));
                }
                Ok(Plan::Map(out))
            }
            Fragment::List(items) => items
                .into_iter()
                .map(|item| self.plan(item, scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Plan::List),
            Fragment::View(view) => self.plan_view(&view, scope),
        }
    }

    pub(crate) fn plan_view(&self, view: &View, scope: &mut Scope) -> Result<Plan, StoreError> {
        if !view.belongs_to(&self.store) {
            // views of another store are copied by value
            return self.plan_body(view, scope);
        }
        let id = view.id();
        if scope.forbidden.contains(&id) {
            return Err(StoreError::CycleDetected(id));
        }
        if scope.adopted.contains(&id) {
            return Ok(Plan::Reuse(id));
        }
        if let Some(node) = self.nodes.get(&id) {
            let current = node
                .view
                .as_ref()
                .is_some_and(|current| View::ptr_eq(current, view));
            if current || !scope.restore {
                return Ok(Plan::Reuse(id));
            }
        }
        scope.adopted.insert(id);
        Ok(Plan::Adopt {
            id,
            view: view.clone(),
            body: Box::new(self.plan_body(view, scope)?),
        })
    }

    /// The entries of `view` as a plain map/list plan.
    pub(crate) fn plan_body(&self, view: &View, scope: &mut Scope) -> Result<Plan, StoreError> {
        match view.body() {
            Body::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    out.push((key.clone(), self.plan_item(item, scope)?));
                }
                Ok(Plan::Map(out))
            }
            Body::List(items) => items
                .iter()
                .map(|item| self.plan_item(item, scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Plan::List),
        }
    }

    fn plan_item(&self, item: &Item, scope: &mut Scope) -> Result<Plan, StoreError> {
        match item {
            Item::Scalar(s) => Ok(Plan::Leaf(s.clone())),
            Item::View(view) => self.plan_view(view, scope),
        }
    }

    /// Turn a plan into a slot. New and adopted nodes are fully linked to
    /// their own children; linking the returned slot to its parent is up to
    /// the caller.
    pub(crate) fn build(&mut self, plan: Plan) -> Result<Slot, StoreError> {
        match plan {
            Plan::Leaf(s) => Ok(Slot::Leaf(s)),
            Plan::Reuse(id) => Ok(Slot::Node(id)),
            Plan::Adopt { id, view, body } => {
                self.adopt(id, view, *body)?;
                Ok(Slot::Node(id))
            }
            body @ (Plan::Map(_) | Plan::List(_)) => {
                let children = self.build_children(body)?;
                let id = self.allocate_id();
                self.insert_node(id, children);
                Ok(Slot::Node(id))
            }
        }
    }

    pub(crate) fn build_children(&mut self, plan: Plan) -> Result<Children, StoreError> {
        match plan {
            Plan::Map(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let slot = self.build(value)?;
                    map.insert(key, slot);
                }
                Ok(Children::Map(map))
            }
            Plan::List(items) => items
                .into_iter()
                .map(|item| self.build(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Children::List),
            Plan::Leaf(_) | Plan::Reuse(_) | Plan::Adopt { .. } => Err(StoreError::NotContainer),
        }
    }

    fn insert_node(&mut self, id: NodeId, children: Children) {
        let edges = children.node_edges();
        self.nodes.insert(id, Node::new(children));
        for (child, key) in edges {
            self.link(child, id, key);
        }
    }

    /// Whether every nested view of `view` is the installed view of the node
    /// in the matching slot of `children`.
    fn mirrors(&self, view: &View, children: &Children) -> bool {
        let installed = |item: &Item, slot: &Slot| match (item, slot) {
            (Item::Scalar(_), Slot::Leaf(_)) => true,
            (Item::View(expected), Slot::Node(id)) => self
                .nodes
                .get(id)
                .and_then(|node| node.view.as_ref())
                .is_some_and(|now| View::ptr_eq(now, expected)),
            _ => false,
        };
        match (view.body(), children) {
            (Body::Map(items), Children::Map(slots)) => {
                items.len() == slots.len()
                    && items
                        .iter()
                        .zip(slots.iter())
                        .all(|((key, item), (slot_key, slot))| key == slot_key && installed(item, slot))
            }
            (Body::List(items), Children::List(slots)) => {
                items.len() == slots.len()
                    && items.iter().zip(slots).all(|(item, slot)| installed(item, slot))
            }
            _ => false,
        }
    }

    /// Install `view` as the current view of node `id`, resetting or reviving
    /// the node from the view's entries.
    pub(crate) fn adopt(&mut self, id: NodeId, view: View, body: Plan) -> Result<(), StoreError> {
        let children = self.build_children(body)?;
        // A child shared with a newer generation leaves `view` out of date;
        // the materializer rebuilds the node instead.
        let fresh = self.mirrors(&view, &children);

        if self.nodes.contains_key(&id) {
            self.reset_children(id, children)?;
            let parents: Vec<NodeId> = {
                let node = self.live_mut(id)?;
                node.view = None;
                node.parents.keys().copied().collect()
            };
            for parent in parents {
                self.mark_stale(parent);
            }
            tracing::trace!(node = %id, fresh, "restored node to an earlier view");
        } else {
            self.insert_node(id, children);
            tracing::trace!(node = %id, fresh, "revived evicted node");
        }

        if fresh {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.view = Some(view);
            }
            self.refreshed.push(id);
        }
        Ok(())
    }
}
