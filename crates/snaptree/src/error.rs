use std::fmt;

use thiserror::Error;

use crate::graph::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Map,
    List,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Map => "map",
            NodeKind::List => "list",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("operation `{op}` is not supported on a {kind} node")]
    UnsupportedOperation { op: &'static str, kind: NodeKind },
    #[error("view {0} no longer maps to a live node")]
    StaleReference(NodeId),
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("expected a map or a list value")]
    NotContainer,
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("invalid list index: {0}")]
    InvalidKey(String),
    #[error("invalid pointer: {0}")]
    InvalidPointer(String),
    #[error("node {0} would become its own descendant")]
    CycleDetected(NodeId),
    #[error("invalid store config: {0}")]
    Config(#[from] serde_json::Error),
}

impl StoreError {
    /// Errors that indicate a broken engine invariant rather than misuse.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::PathNotFound(_))
    }
}
