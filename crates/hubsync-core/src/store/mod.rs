// ── Persisted object tree ──
//
// The engine's view of the host store: an async document store keyed by
// full object id, with additive `extend` semantics and a broadcast of
// every state write.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod failing;
mod memory;
mod object;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::StoreError;

pub use memory::{MemoryStore, TreeSnapshot};
pub use object::{Common, Native, ObjectKind, StateChange, StateValue, TreeObject};

/// Async key/document store holding the object tree.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get_object(&self, id: &str) -> Result<Option<TreeObject>, StoreError>;

    /// Create or replace a node.
    async fn set_object(&self, id: &str, object: TreeObject) -> Result<(), StoreError>;

    /// Create a node only if none exists. Returns `true` if it was created.
    async fn set_object_not_exists(&self, id: &str, object: TreeObject)
    -> Result<bool, StoreError>;

    /// Additively merge `partial` into a node, creating it if absent.
    async fn extend_object(&self, id: &str, partial: TreeObject)
    -> Result<TreeObject, StoreError>;

    /// Write a state value. The node must exist.
    async fn set_state(&self, id: &str, value: Value, ack: bool) -> Result<(), StoreError>;

    async fn get_state(&self, id: &str) -> Result<Option<StateValue>, StoreError>;

    /// Every subsequent state write, acknowledged or not.
    fn subscribe_states(&self) -> broadcast::Receiver<StateChange>;
}
