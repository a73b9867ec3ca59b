//! Mutation operations and the update propagator.
//!
//! Every operation is validated against the untouched graph before anything
//! changes. Applying one then runs in four steps: mutate the target node's
//! children, mark the target and all of its ancestors stale, evict nodes left
//! without parents, and rebuild the stale views from the root down.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{NodeKind, StoreError};
use crate::graph::{Children, NodeId, Plan, Scope};
use crate::store::{Engine, Notify};
use crate::value::{Fragment, Item, PathStep};
use crate::view::{Body, View};

#[derive(Debug, Clone)]
pub enum Operation {
    /// Set each key (maps) or index (lists) to the paired value. A list index
    /// equal to the current length appends.
    Replace(Vec<(PathStep, Fragment)>),
    RemoveKeys(Vec<PathStep>),
    RemoveSelf,
    Splice {
        index: usize,
        delete: usize,
        insert: Vec<Fragment>,
    },
    Append(Vec<Fragment>),
    Prepend(Vec<Fragment>),
    Pop,
    Shift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Replace,
    RemoveKeys,
    RemoveSelf,
    Splice,
    Append,
    Prepend,
    Pop,
    Shift,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        OperationKind::Replace,
        OperationKind::RemoveKeys,
        OperationKind::RemoveSelf,
        OperationKind::Splice,
        OperationKind::Append,
        OperationKind::Prepend,
        OperationKind::Pop,
        OperationKind::Shift,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Replace => "replace",
            OperationKind::RemoveKeys => "remove",
            OperationKind::RemoveSelf => "remove_self",
            OperationKind::Splice => "splice",
            OperationKind::Append => "append",
            OperationKind::Prepend => "prepend",
            OperationKind::Pop => "pop",
            OperationKind::Shift => "shift",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StoreError::UnknownOperation(s.to_string()))
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Replace(_) => OperationKind::Replace,
            Operation::RemoveKeys(_) => OperationKind::RemoveKeys,
            Operation::RemoveSelf => OperationKind::RemoveSelf,
            Operation::Splice { .. } => OperationKind::Splice,
            Operation::Append(_) => OperationKind::Append,
            Operation::Prepend(_) => OperationKind::Prepend,
            Operation::Pop => OperationKind::Pop,
            Operation::Shift => OperationKind::Shift,
        }
    }

    /// Build an operation from its name and JSON arguments.
    ///
    /// - `replace`: an object of key/value pairs, or an array set by index
    /// - `remove`: a key, an index, or an array of them
    /// - `splice`: `[index, delete, ...items]`
    /// - `append`, `prepend`: an array of items (a single value is one item)
    /// - `remove_self`, `pop`, `shift`: no arguments
    pub fn from_name(name: &str, args: Value) -> Result<Self, StoreError> {
        let kind: OperationKind = name.parse()?;
        Ok(match kind {
            OperationKind::Replace => match args {
                Value::Object(map) => Operation::Replace(
                    map.into_iter()
                        .map(|(k, v)| (PathStep::Key(k), Fragment::from(v)))
                        .collect(),
                ),
                Value::Array(items) => Operation::Replace(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (PathStep::Index(i), Fragment::from(v)))
                        .collect(),
                ),
                _ => return Err(StoreError::NotContainer),
            },
            OperationKind::RemoveKeys => Operation::RemoveKeys(match args {
                Value::Array(keys) => keys.iter().map(step_from_json).collect::<Result<_, _>>()?,
                key => vec![step_from_json(&key)?],
            }),
            OperationKind::RemoveSelf => Operation::RemoveSelf,
            OperationKind::Splice => {
                let Value::Array(args) = args else {
                    return Err(StoreError::NotContainer);
                };
                let mut args = args.into_iter();
                let index = count_from_json(args.next())?;
                let delete = count_from_json(args.next())?;
                Operation::Splice {
                    index,
                    delete,
                    insert: args.map(Fragment::from).collect(),
                }
            }
            OperationKind::Append => Operation::Append(items_from_json(args)),
            OperationKind::Prepend => Operation::Prepend(items_from_json(args)),
            OperationKind::Pop => Operation::Pop,
            OperationKind::Shift => Operation::Shift,
        })
    }
}

fn step_from_json(value: &Value) -> Result<PathStep, StoreError> {
    match value {
        Value::String(k) => Ok(PathStep::Key(k.clone())),
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .map(PathStep::Index)
            .ok_or_else(|| StoreError::InvalidKey(n.to_string())),
        other => Err(StoreError::InvalidKey(other.to_string())),
    }
}

fn count_from_json(value: Option<Value>) -> Result<usize, StoreError> {
    match value {
        None => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| StoreError::InvalidKey(n.to_string())),
        Some(other) => Err(StoreError::InvalidKey(other.to_string())),
    }
}

fn items_from_json(args: Value) -> Vec<Fragment> {
    match args {
        Value::Array(items) => items.into_iter().map(Fragment::from).collect(),
        Value::Null => Vec::new(),
        item => vec![Fragment::from(item)],
    }
}

/// Result of one applied operation.
#[derive(Debug, Clone)]
pub struct Applied {
    /// New view of the target node (the new root view for `RemoveSelf`).
    pub view: View,
    /// Items taken out by `Splice`, `Pop` and `Shift`.
    pub removed: Vec<Item>,
    /// `false` when the operation was a no-op and nothing was scheduled.
    pub changed: bool,
}

enum Outcome {
    Unchanged,
    Changed { removed: Vec<Item> },
}

enum Target {
    Key(String),
    Index(usize),
    Push,
}

impl Engine {
    pub(crate) fn apply(&mut self, target: &View, op: Operation) -> Result<Applied, StoreError> {
        let id = target.id();
        let kind = op.kind();
        if !target.belongs_to(&self.graph.store) || self.graph.node(id).is_none() {
            tracing::warn!(node = %id, op = %kind, "mutation through a stale view");
            return Err(StoreError::StaleReference(id));
        }

        let outcome = match op {
            Operation::Replace(entries) => self.replace(id, entries)?,
            Operation::RemoveKeys(keys) => self.remove_keys(id, keys)?,
            Operation::RemoveSelf => self.remove_self(id)?,
            Operation::Splice {
                index,
                delete,
                insert,
            } => self.splice(id, index, delete, insert)?,
            Operation::Append(items) => {
                let len = self.list_len(id, kind)?;
                self.splice(id, len, 0, items)?
            }
            Operation::Prepend(items) => {
                self.list_len(id, kind)?;
                self.splice(id, 0, 0, items)?
            }
            Operation::Pop => match self.list_len(id, kind)? {
                0 => Outcome::Unchanged,
                len => self.splice(id, len - 1, 1, Vec::new())?,
            },
            Operation::Shift => match self.list_len(id, kind)? {
                0 => Outcome::Unchanged,
                _ => self.splice(id, 0, 1, Vec::new())?,
            },
        };

        match outcome {
            Outcome::Unchanged => {
                tracing::trace!(node = %id, op = %kind, "no-op mutation");
                let view = if kind == OperationKind::RemoveSelf {
                    self.current.clone()
                } else {
                    self.view_of(id)?
                };
                Ok(Applied {
                    view,
                    removed: Vec::new(),
                    changed: false,
                })
            }
            Outcome::Changed { removed } => {
                let root = self.commit()?;
                tracing::debug!(node = %id, op = %kind, nodes = self.graph.len(), "applied mutation");
                let view = if kind == OperationKind::RemoveSelf {
                    root
                } else {
                    self.view_of(id)?
                };
                Ok(Applied {
                    view,
                    removed,
                    changed: true,
                })
            }
        }
    }

    /// Replace the root's contents, keeping the root's identity.
    ///
    /// A historical view of the root restores that exact generation; the
    /// current root view is a no-op.
    pub(crate) fn replace_all(&mut self, next: Fragment) -> Result<View, StoreError> {
        let root = self.graph.root;
        match next {
            Fragment::Scalar(_) => return Err(StoreError::NotContainer),
            Fragment::View(view) if view.belongs_to(&self.graph.store) && view.id() == root => {
                if View::ptr_eq(&view, &self.current) {
                    return Ok(view);
                }
                let body = self.graph.plan_body(&view, &mut Scope::restore(root))?;
                self.graph.adopt(root, view, body)?;
            }
            other => {
                let mut scope = Scope::write(HashSet::from([root]));
                let plan = match other {
                    Fragment::View(view) => self.graph.plan_body(&view, &mut scope)?,
                    fragment => self.graph.plan(fragment, &mut scope)?,
                };
                let children = self.graph.build_children(plan)?;
                self.graph.reset_children(root, children)?;
                self.graph.mark_stale(root);
            }
        }
        let view = self.commit()?;
        tracing::debug!(nodes = self.graph.len(), "replaced root contents");
        Ok(view)
    }

    /// Evict orphans, rebuild stale views and schedule notifications.
    fn commit(&mut self) -> Result<View, StoreError> {
        let evicted = self.graph.sweep();
        let root = self.graph.materialize(self.graph.root)?;
        for id in std::mem::take(&mut self.graph.refreshed) {
            let listening = self
                .graph
                .node(id)
                .is_some_and(|node| node.listener.is_some());
            if listening {
                self.scheduler.schedule(Notify::Node(id));
            }
        }
        self.scheduler.schedule(Notify::Root);
        if evicted > 0 {
            tracing::trace!(evicted, "swept orphaned nodes");
        }
        self.current = root.clone();
        Ok(root)
    }

    fn view_of(&self, id: NodeId) -> Result<View, StoreError> {
        self.graph
            .live(id)?
            .view
            .clone()
            .ok_or(StoreError::StaleReference(id))
    }

    fn list_len(&self, id: NodeId, kind: OperationKind) -> Result<usize, StoreError> {
        match &self.graph.live(id)?.children {
            Children::List(items) => Ok(items.len()),
            Children::Map(_) => Err(StoreError::UnsupportedOperation {
                op: kind.as_str(),
                kind: NodeKind::Map,
            }),
        }
    }

    fn replace(
        &mut self,
        id: NodeId,
        entries: Vec<(PathStep, Fragment)>,
    ) -> Result<Outcome, StoreError> {
        if entries.is_empty() {
            return Ok(Outcome::Unchanged);
        }
        let node = self.graph.live(id)?;
        let kind = node.kind();
        let mut len = node.children.len();

        let mut resolved = Vec::with_capacity(entries.len());
        for (step, value) in entries {
            let target = match kind {
                NodeKind::Map => Target::Key(step.to_key()),
                NodeKind::List => {
                    let index = step
                        .to_index()
                        .ok_or_else(|| StoreError::InvalidKey(step.to_string()))?;
                    if index < len {
                        Target::Index(index)
                    } else if index == len {
                        len += 1;
                        Target::Push
                    } else {
                        return Err(StoreError::IndexOutOfBounds { index, len });
                    }
                }
            };
            resolved.push((target, value));
        }

        let mut scope = Scope::write(self.graph.ancestors_or_self(id));
        let plans = resolved
            .into_iter()
            .map(|(target, value)| Ok::<_, StoreError>((target, self.graph.plan(value, &mut scope)?)))
            .collect::<Result<Vec<(Target, Plan)>, _>>()?;

        for (target, plan) in plans {
            let slot = self.graph.build(plan)?;
            match target {
                Target::Key(key) => {
                    self.graph.put_map(id, key, slot)?;
                }
                Target::Index(index) => {
                    self.graph.put_list(id, index, slot)?;
                }
                Target::Push => {
                    let end = self.graph.live(id)?.children.len();
                    self.graph.splice_list(id, end, 0, vec![slot])?;
                }
            }
        }
        self.graph.mark_stale(id);
        Ok(Outcome::Changed {
            removed: Vec::new(),
        })
    }

    fn remove_keys(&mut self, id: NodeId, keys: Vec<PathStep>) -> Result<Outcome, StoreError> {
        match &self.graph.live(id)?.children {
            Children::Map(entries) => {
                let mut present: Vec<String> = Vec::new();
                for key in keys.iter().map(PathStep::to_key) {
                    if entries.contains_key(&key) && !present.contains(&key) {
                        present.push(key);
                    }
                }
                if present.is_empty() {
                    return Ok(Outcome::Unchanged);
                }
                for key in present {
                    self.graph.remove_map_key(id, &key)?;
                }
            }
            Children::List(items) => {
                let len = items.len();
                let present: BTreeSet<usize> = keys
                    .iter()
                    .filter_map(PathStep::to_index)
                    .filter(|&i| i < len)
                    .collect();
                if present.is_empty() {
                    return Ok(Outcome::Unchanged);
                }
                for index in present.into_iter().rev() {
                    self.graph.splice_list(id, index, 1, Vec::new())?;
                }
            }
        }
        self.graph.mark_stale(id);
        Ok(Outcome::Changed {
            removed: Vec::new(),
        })
    }

    fn remove_self(&mut self, id: NodeId) -> Result<Outcome, StoreError> {
        let node = self.graph.live(id)?;
        if id == self.graph.root {
            return Err(StoreError::UnsupportedOperation {
                op: OperationKind::RemoveSelf.as_str(),
                kind: node.kind(),
            });
        }
        let mut edges = Vec::with_capacity(node.parents.len());
        for (parent, keys) in &node.parents {
            let kind = self
                .graph
                .node(*parent)
                .map(|p| p.kind())
                .ok_or_else(|| StoreError::PathNotFound(format!("parent {parent} of {id} is not in the index")))?;
            edges.push((*parent, kind, keys.clone()));
        }

        for (parent, kind, keys) in edges {
            match kind {
                NodeKind::Map => {
                    for key in keys {
                        self.graph.remove_map_key(parent, &key.to_key())?;
                    }
                }
                NodeKind::List => {
                    let mut indices: Vec<usize> = keys.iter().filter_map(PathStep::to_index).collect();
                    indices.sort_unstable_by(|a, b| b.cmp(a));
                    for index in indices {
                        self.graph.splice_list(parent, index, 1, Vec::new())?;
                    }
                }
            }
            self.graph.mark_stale(parent);
        }
        Ok(Outcome::Changed {
            removed: Vec::new(),
        })
    }

    fn splice(
        &mut self,
        id: NodeId,
        index: usize,
        delete: usize,
        insert: Vec<Fragment>,
    ) -> Result<Outcome, StoreError> {
        let len = self.list_len(id, OperationKind::Splice)?;
        let start = index.min(len);
        let delete = delete.min(len - start);
        if delete == 0 && insert.is_empty() {
            return Ok(Outcome::Unchanged);
        }

        let removed = match self.graph.materialize(id)?.body() {
            Body::List(items) => items[start..start + delete].to_vec(),
            Body::Map(_) => Vec::new(),
        };
        let mut scope = Scope::write(self.graph.ancestors_or_self(id));
        let plans = insert
            .into_iter()
            .map(|fragment| self.graph.plan(fragment, &mut scope))
            .collect::<Result<Vec<_>, _>>()?;

        let slots = plans
            .into_iter()
            .map(|plan| self.graph.build(plan))
            .collect::<Result<Vec<_>, _>>()?;
        self.graph.splice_list(id, start, delete, slots)?;
        self.graph.mark_stale(id);
        Ok(Outcome::Changed { removed })
    }
}
