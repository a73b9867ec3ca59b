//! Observable, persistent in-memory tree store.
//!
//! A [`Store`] holds a tree of maps and lists. Reading hands out immutable
//! [`View`]s; every mutation produces a new root view that shares every
//! untouched subtree with the previous one, so identity comparison tells what
//! changed. A subtree may be placed at several locations at once and stays a
//! single node: updating it through any of its views refreshes every place it
//! appears.
//!
//! Notifications are coalesced. Mutations schedule the store's root event and
//! the `"update"` event of every node listener whose subtree changed; a
//! [`Store::flush`] delivers each of them once with the latest view.
//!
//! ```
//! use serde_json::json;
//! use snaptree::Store;
//!
//! let store = Store::new(json!({"a": 1, "b": {"x": [1, 2]}})).unwrap();
//! let before = store.current();
//! let list = before.child("b").unwrap().child("x").unwrap();
//! let list = list.push(3).unwrap();
//! assert_eq!(list.value(), json!([1, 2, 3]));
//! assert_eq!(store.current().value(), json!({"a": 1, "b": {"x": [1, 2, 3]}}));
//! assert_eq!(before.value(), json!({"a": 1, "b": {"x": [1, 2]}}));
//! ```

pub mod config;
pub mod error;
mod graph;
pub mod ops;
pub mod pointer;
mod store;
pub mod value;
mod view;

pub use config::{FlushMode, StoreConfig};
pub use error::{NodeKind, StoreError};
pub use graph::NodeId;
pub use ops::{Applied, Operation, OperationKind};
pub use pointer::{format_pointer, parse_pointer};
pub use snaptree_events::{Emitter, HandlerId, Scheduler, UPDATE_EVENT};
pub use store::Store;
pub use value::{Fragment, Item, PathStep, Scalar};
pub use view::{Entries, View};

/// Shorthand for [`Store::new`].
pub fn create_store(initial: impl Into<Fragment>) -> Result<Store, StoreError> {
    Store::new(initial)
}

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
