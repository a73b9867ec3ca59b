use std::hash::Hash;

use indexmap::IndexSet;

/// Coalescing notification queue.
///
/// Each key is either idle or scheduled. [`Scheduler::schedule`] moves an
/// idle key to scheduled and reports `true`; scheduling a key that is already
/// waiting is a no-op. [`Scheduler::take_batch`] returns every waiting key in
/// first-scheduled order and puts them all back to idle, so anything
/// scheduled while the batch is being delivered lands in the next batch.
#[derive(Debug, Clone)]
pub struct Scheduler<K> {
    pending: IndexSet<K>,
}

impl<K> Default for Scheduler<K> {
    fn default() -> Self {
        Self {
            pending: IndexSet::new(),
        }
    }
}

impl<K: Hash + Eq> Scheduler<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, key: K) -> bool {
        self.pending.insert(key)
    }

    pub fn is_scheduled(&self, key: &K) -> bool {
        self.pending.contains(key)
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn take_batch(&mut self) -> Vec<K> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}
