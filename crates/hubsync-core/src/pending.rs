// ── Pending-value buffer ──
//
// Live values that arrive before their tree node exists. Keyed by tree
// path, last write wins. Drained per device as the reconciler makes paths
// known, and once completely when the first full pass finishes. The
// initialized flag never goes back to false.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct PendingBuffer {
    initialized: bool,
    values: IndexMap<String, Value>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the first full synchronization pass has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Hold `value` for `path`, replacing any earlier pending value.
    pub fn hold(&mut self, path: impl Into<String>, value: Value) {
        self.values.insert(path.into(), value);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.values.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    /// Remove and return every pending value whose path is in `known`.
    pub fn take_known(&mut self, known: &HashSet<String>) -> Vec<(String, Value)> {
        let mut taken = Vec::new();
        self.values.retain(|path, value| {
            if known.contains(path) {
                taken.push((path.clone(), std::mem::take(value)));
                false
            } else {
                true
            }
        });
        taken
    }

    /// Flip to initialized and hand back everything still pending.
    ///
    /// Only the first call returns values; afterwards nothing is ever
    /// buffered again.
    pub fn mark_initialized(&mut self) -> Vec<(String, Value)> {
        if self.initialized {
            return Vec::new();
        }
        self.initialized = true;
        self.values.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
