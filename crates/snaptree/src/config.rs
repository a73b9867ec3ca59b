//! Store configuration.

use serde::{Deserialize, Serialize};
use snaptree_events::UPDATE_EVENT;

use crate::error::StoreError;

/// When scheduled notifications are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Notifications wait for an explicit [`Store::flush`](crate::Store::flush).
    #[default]
    Deferred,
    /// Every successful top-level mutation call flushes before returning.
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub flush: FlushMode,
    /// Name of the store-wide event fired after the root changes.
    pub root_event: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flush: FlushMode::Deferred,
            root_event: UPDATE_EVENT.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn immediate() -> Self {
        Self {
            flush: FlushMode::Immediate,
            ..Self::default()
        }
    }

    pub fn from_json(input: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(input)?)
    }
}
