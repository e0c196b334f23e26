// ── In-memory object store ──
//
// DashMap-backed `ObjectStore`. Used by tests and the CLI, and exportable
// as a JSON tree file so a sync can be inspected or resumed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use super::ObjectStore;
use super::object::{ObjectKind, StateChange, StateValue, TreeObject};
use crate::error::StoreError;

const STATE_CHANNEL_CAPACITY: usize = 1024;

/// Serializable form of the whole tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    #[serde(default)]
    pub objects: BTreeMap<String, TreeObject>,
    #[serde(default)]
    pub states: BTreeMap<String, StateValue>,
}

/// Concurrent in-memory tree.
pub struct MemoryStore {
    objects: DashMap<String, TreeObject>,
    states: DashMap<String, StateValue>,
    changes: broadcast::Sender<StateChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            objects: DashMap::new(),
            states: DashMap::new(),
            changes,
        }
    }

    /// Load a previously exported tree.
    pub fn from_snapshot(snapshot: TreeSnapshot) -> Self {
        let store = Self::new();
        store.import(snapshot);
        store
    }

    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        Ok(Self::from_snapshot(serde_json::from_str(text)?))
    }

    /// Add every node and value from `snapshot`, replacing same-id entries.
    pub fn import(&self, snapshot: TreeSnapshot) {
        for (id, object) in snapshot.objects {
            self.objects.insert(id, object);
        }
        for (id, state) in snapshot.states {
            self.states.insert(id, state);
        }
    }

    pub fn export(&self) -> TreeSnapshot {
        TreeSnapshot {
            objects: self
                .objects
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
            states: self
                .states
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    /// Sorted ids of every node of the given kind.
    pub fn ids_of_kind(&self, kind: ObjectKind) -> Vec<String> {
        let mut ids: Vec<String> = self
            .objects
            .iter()
            .filter(|r| r.value().kind == kind)
            .map(|r| r.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, id: &str) -> Result<Option<TreeObject>, StoreError> {
        Ok(self.objects.get(id).map(|r| r.value().clone()))
    }

    async fn set_object(&self, id: &str, object: TreeObject) -> Result<(), StoreError> {
        self.objects.insert(id.to_owned(), object);
        Ok(())
    }

    async fn set_object_not_exists(
        &self,
        id: &str,
        object: TreeObject,
    ) -> Result<bool, StoreError> {
        match self.objects.entry(id.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(object);
                Ok(true)
            }
        }
    }

    async fn extend_object(
        &self,
        id: &str,
        partial: TreeObject,
    ) -> Result<TreeObject, StoreError> {
        let mut entry = self
            .objects
            .entry(id.to_owned())
            .or_insert_with(|| partial.clone());
        entry.extend(partial);
        Ok((*entry).clone())
    }

    async fn set_state(&self, id: &str, value: Value, ack: bool) -> Result<(), StoreError> {
        if !self.objects.contains_key(id) {
            return Err(StoreError::NotFound { id: id.to_owned() });
        }

        let state = StateValue {
            val: value,
            ack,
            ts: Utc::now(),
        };
        self.states.insert(id.to_owned(), state.clone());
        // Nobody listening is fine.
        let _ = self.changes.send(StateChange {
            id: id.to_owned(),
            state,
        });
        Ok(())
    }

    async fn get_state(&self, id: &str) -> Result<Option<StateValue>, StoreError> {
        Ok(self.states.get(id).map(|r| r.value().clone()))
    }

    fn subscribe_states(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}
