//! JSON Pointer (RFC 6901) rendering of tree paths.
//!
//! Numeric tokens parse as [`PathStep::Index`]; a map lookup accepts an index
//! step as its decimal key, so `/items/0` and `/by_id/0` both resolve.

use crate::error::StoreError;
use crate::value::{canonical_index, PathStep};

pub fn parse_pointer(pointer: &str) -> Result<Vec<PathStep>, StoreError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(StoreError::InvalidPointer(pointer.to_string()));
    };
    Ok(rest
        .split('/')
        .map(|token| match canonical_index(token) {
            Some(idx) => PathStep::Index(idx),
            // `~1` first, so `~01` decodes to `~1`
            None => PathStep::Key(token.replace("~1", "/").replace("~0", "~")),
        })
        .collect())
}

pub fn format_pointer(path: &[PathStep]) -> String {
    let mut out = String::new();
    for step in path {
        out.push('/');
        match step {
            PathStep::Key(k) => out.push_str(&k.replace('~', "~0").replace('/', "~1")),
            PathStep::Index(i) => out.push_str(&i.to_string()),
        }
    }
    out
}
