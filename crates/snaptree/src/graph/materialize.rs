use indexmap::IndexMap;

use super::{Children, Graph, NodeId, Slot};
use crate::error::StoreError;
use crate::value::Item;
use crate::view::{Body, View};

impl Graph {
    /// Current view of `id`, rebuilding it (and any stale descendants) first.
    ///
    /// A node that still has a view is returned as is, so every subtree off
    /// the mutated paths keeps its pointer identity. A stale node reached
    /// through several parents is rebuilt once; later visits see the new view.
    pub(crate) fn materialize(&mut self, id: NodeId) -> Result<View, StoreError> {
        let node = self
            .nodes
            .get(&id)
            .ok_or_else(|| StoreError::PathNotFound(format!("{id} is not in the index")))?;
        if let Some(view) = &node.view {
            return Ok(view.clone());
        }

        let body = match node.children.clone() {
            Children::Map(entries) => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, slot) in entries {
                    out.insert(key, self.materialize_slot(slot)?);
                }
                Body::Map(out)
            }
            Children::List(items) => Body::List(
                items
                    .into_iter()
                    .map(|slot| self.materialize_slot(slot))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };

        let view = View::new(id, body, self.store.clone());
        if let Some(node) = self.nodes.get_mut(&id) {
            node.view = Some(view.clone());
        }
        self.refreshed.push(id);
        Ok(view)
    }

    fn materialize_slot(&mut self, slot: Slot) -> Result<Item, StoreError> {
        match slot {
            Slot::Leaf(s) => Ok(Item::Scalar(s)),
            Slot::Node(child) => self.materialize(child).map(Item::View),
        }
    }
}
