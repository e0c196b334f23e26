// Test double: a `MemoryStore` that refuses writes to chosen ids.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{MemoryStore, ObjectStore, StateChange, StateValue, TreeObject};
use crate::error::StoreError;

#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    refused: Mutex<HashSet<String>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write to `id` until [`recover`](Self::recover).
    pub fn refuse(&self, id: &str) {
        self.refused.lock().unwrap().insert(id.to_owned());
    }

    pub fn recover(&self, id: &str) {
        self.refused.lock().unwrap().remove(id);
    }

    fn check(&self, id: &str) -> Result<(), StoreError> {
        if self.refused.lock().unwrap().contains(id) {
            return Err(StoreError::Unavailable(format!("write to {id} refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn get_object(&self, id: &str) -> Result<Option<TreeObject>, StoreError> {
        self.inner.get_object(id).await
    }

    async fn set_object(&self, id: &str, object: TreeObject) -> Result<(), StoreError> {
        self.check(id)?;
        self.inner.set_object(id, object).await
    }

    async fn set_object_not_exists(
        &self,
        id: &str,
        object: TreeObject,
    ) -> Result<bool, StoreError> {
        self.check(id)?;
        self.inner.set_object_not_exists(id, object).await
    }

    async fn extend_object(&self, id: &str, partial: TreeObject) -> Result<TreeObject, StoreError> {
        self.check(id)?;
        self.inner.extend_object(id, partial).await
    }

    async fn set_state(&self, id: &str, value: Value, ack: bool) -> Result<(), StoreError> {
        self.check(id)?;
        self.inner.set_state(id, value, ack).await
    }

    async fn get_state(&self, id: &str) -> Result<Option<StateValue>, StoreError> {
        self.inner.get_state(id).await
    }

    fn subscribe_states(&self) -> broadcast::Receiver<StateChange> {
        self.inner.subscribe_states()
    }
}
