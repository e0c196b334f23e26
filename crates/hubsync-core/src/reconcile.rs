// ── Tree reconciler ──
//
// Materializes one hub device as device/channel/state nodes. Every node
// goes through read-then-create-or-extend, so repeated passes refresh
// engine-owned fields and leave everything else alone. Per-node failures
// are logged and skipped.

use std::collections::HashSet;

use hubsync_api::{Capability, Device, Link, State};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::metadata::{MetadataContext, MetadataResolver};
use crate::path;
use crate::pending::PendingBuffer;
use crate::rooms::RoomIndex;
use crate::store::{ObjectStore, TreeObject};

/// Outcome of one device pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// `None` when the device had nothing to expose.
    pub device_path: Option<String>,
    /// Nodes created or extended.
    pub nodes: usize,
    /// Acknowledged values written.
    pub values: usize,
    /// Node or value writes that failed.
    pub failed: usize,
}

impl SyncReport {
    pub fn skipped(&self) -> bool {
        self.device_path.is_none()
    }
}

/// Writes hub devices into the object tree.
pub struct TreeReconciler<'a, S: ?Sized> {
    store: &'a S,
    metadata: &'a dyn MetadataResolver,
    config: &'a EngineConfig,
    pending: Option<&'a PendingBuffer>,
}

impl<'a, S> TreeReconciler<'a, S>
where
    S: ObjectStore + ?Sized,
{
    pub fn new(store: &'a S, metadata: &'a dyn MetadataResolver, config: &'a EngineConfig) -> Self {
        Self {
            store,
            metadata,
            config,
            pending: None,
        }
    }

    /// Leave snapshot values unwritten where a newer live value is
    /// buffered; the buffer flush writes those instead.
    pub fn with_pending(mut self, pending: &'a PendingBuffer) -> Self {
        self.pending = Some(pending);
        self
    }

    /// Reconcile one device.
    ///
    /// Every path written is added to `known`; channel paths (or state
    /// paths for capabilities without a channel) are recorded in `rooms`.
    pub async fn sync_device(
        &self,
        device: &Device,
        known: &mut HashSet<String>,
        rooms: &mut RoomIndex,
    ) -> SyncReport {
        let device_states: Vec<&State> = device
            .states
            .iter()
            .filter(|s| self.config.is_device_state(&s.name))
            .collect();

        if !device.has_capability_states() && device_states.is_empty() {
            debug!(device = %device.id, name = %device.name, "device has no states, skipping");
            return SyncReport::default();
        }

        let device_path = path::device_path(device);
        let room = path::room_key(device);
        let mut report = SyncReport {
            device_path: Some(device_path.clone()),
            ..SyncReport::default()
        };

        let node = TreeObject::device(&device.name, device.link(), &device.device_type);
        self.track(&mut report, &device_path, self.upsert(&device_path, node).await);
        known.insert(device_path.clone());

        for state in device_states {
            let state_path = path::device_state_path(&device_path, &state.name);
            self.sync_state(
                &mut report,
                &state_path,
                state,
                MetadataContext::Device,
                device.link(),
            )
            .await;
            known.insert(state_path);
        }

        for capability in device.capabilities.iter().filter(|c| !c.states.is_empty()) {
            self.sync_capability(&mut report, &device_path, &room, capability, known, rooms)
                .await;
        }

        debug!(
            device = %device_path,
            nodes = report.nodes,
            values = report.values,
            failed = report.failed,
            "device reconciled"
        );
        report
    }

    /// Make sure a device-level state node exists, e.g. for a synthetic
    /// fault flag. Returns its tree path.
    pub async fn ensure_device_state(
        &self,
        device: &Device,
        state_name: &str,
    ) -> Result<String, StoreError> {
        let device_path = path::device_path(device);
        let state_path = path::device_state_path(&device_path, state_name);
        let meta = self.metadata.metadata_for(state_name, MetadataContext::Device);

        self.upsert(
            &device_path,
            TreeObject::device(&device.name, device.link(), &device.device_type),
        )
        .await?;
        self.upsert(
            &state_path,
            TreeObject::state(state_name, &meta, Some(device.link())),
        )
        .await?;
        Ok(state_path)
    }

    /// Write an acknowledged value to an existing node.
    pub async fn write_value(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.store
            .set_state(&self.config.object_id(path), value, true)
            .await
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn sync_capability(
        &self,
        report: &mut SyncReport,
        device_path: &str,
        room: &str,
        capability: &Capability,
        known: &mut HashSet<String>,
        rooms: &mut RoomIndex,
    ) {
        let context = capability
            .channel_name()
            .unwrap_or(self.config.fallback_context.as_str());

        let channel = path::channel_path(device_path, capability);
        if let (Some(channel_path), Some(name)) = (&channel, capability.channel_name()) {
            let node = TreeObject::channel(name, capability.link());
            self.track(report, channel_path, self.upsert(channel_path, node).await);
            known.insert(channel_path.clone());
            rooms.record(room, self.config.object_id(channel_path));
        }

        for state in &capability.states {
            let state_path = path::capability_state_path(device_path, capability, &state.name);
            self.sync_state(
                report,
                &state_path,
                state,
                MetadataContext::Capability(context),
                capability.link(),
            )
            .await;
            if channel.is_none() {
                rooms.record(room, self.config.object_id(&state_path));
            }
            known.insert(state_path);
        }
    }

    async fn sync_state(
        &self,
        report: &mut SyncReport,
        state_path: &str,
        state: &State,
        context: MetadataContext<'_>,
        owner: Link,
    ) {
        let meta = self.metadata.metadata_for(&state.name, context);
        let node = TreeObject::state(&state.name, &meta, Some(owner));
        if !self.track(report, state_path, self.upsert(state_path, node).await) {
            return;
        }
        if self.pending.is_some_and(|p| p.contains(state_path)) {
            debug!(path = %state_path, "newer live value pending, skipping snapshot value");
            return;
        }

        match self.write_value(state_path, state.value.clone()).await {
            Ok(()) => report.values += 1,
            Err(e) => {
                warn!(path = %state_path, error = %e, "state value write failed");
                report.failed += 1;
            }
        }
    }

    /// Create the node if absent, otherwise extend it.
    async fn upsert(&self, path: &str, object: TreeObject) -> Result<(), StoreError> {
        let id = self.config.object_id(path);
        if self.store.get_object(&id).await?.is_none()
            && self.store.set_object_not_exists(&id, object.clone()).await?
        {
            return Ok(());
        }
        self.store.extend_object(&id, object).await.map(|_| ())
    }

    fn track(&self, report: &mut SyncReport, path: &str, result: Result<(), StoreError>) -> bool {
        match result {
            Ok(()) => {
                report.nodes += 1;
                true
            }
            Err(e) => {
                warn!(path = %path, error = %e, "node upsert failed");
                report.failed += 1;
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::StaticMetadata;
    use crate::store::failing::FailingStore;
    use crate::store::{MemoryStore, ObjectKind};
    use hubsync_api::Location;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn thermostat() -> Device {
        Device {
            id: "d1".into(),
            name: "Thermostat 1".into(),
            device_type: "RST".into(),
            location: Some(Location {
                id: "l1".into(),
                name: "Living Room".into(),
            }),
            capabilities: vec![
                Capability {
                    id: "c1".into(),
                    device: Link::Device("d1".into()),
                    config_name: Some("Climate".into()),
                    states: vec![State::new("pointTemperature", 21.0)],
                },
                Capability {
                    id: "c2".into(),
                    device: Link::Device("d1".into()),
                    config_name: None,
                    states: vec![State::new("humidity", 40)],
                },
            ],
            states: vec![
                State::new("isReachable", true),
                State::new("serialNumber", "X1"),
            ],
        }
    }

    #[tokio::test]
    async fn creates_device_channel_and_state_nodes() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let reconciler = TreeReconciler::new(&store, &StaticMetadata, &config);
        let mut known = HashSet::new();
        let mut rooms = RoomIndex::new();

        let report = reconciler
            .sync_device(&thermostat(), &mut known, &mut rooms)
            .await;

        assert_eq!(report.device_path.as_deref(), Some("Living-Room.Thermostat-1"));
        assert_eq!(report.failed, 0);
        assert_eq!(report.values, 3);

        let device = store
            .get_object("hubsync.0.Living-Room.Thermostat-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device.kind, ObjectKind::Device);

        let channel = store
            .get_object("hubsync.0.Living-Room.Thermostat-1.Climate")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel.kind, ObjectKind::Channel);

        let setpoint = store
            .get_object("hubsync.0.Living-Room.Thermostat-1.Climate.PointTemperature")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(setpoint.native.link, Some(Link::Capability("c1".into())));
        assert_eq!(setpoint.native.state.as_deref(), Some("pointTemperature"));
        assert!(setpoint.common.is_writable());

        let value = store
            .get_state("hubsync.0.Living-Room.Thermostat-1.Humidity")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.val, json!(40));
        assert!(value.ack);

        // Not allow-listed.
        assert!(!known.contains("Living-Room.Thermostat-1.SerialNumber"));
        assert!(known.contains("Living-Room.Thermostat-1.IsReachable"));

        assert_eq!(
            rooms.members("Living-Room").unwrap().iter().collect::<Vec<_>>(),
            vec![
                "hubsync.0.Living-Room.Thermostat-1.Climate",
                "hubsync.0.Living-Room.Thermostat-1.Humidity",
            ]
        );
    }

    #[tokio::test]
    async fn resync_preserves_custom_fields() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let reconciler = TreeReconciler::new(&store, &StaticMetadata, &config);
        let device = thermostat();

        reconciler
            .sync_device(&device, &mut HashSet::new(), &mut RoomIndex::new())
            .await;

        let id = "hubsync.0.Living-Room.Thermostat-1.Climate.PointTemperature";
        let mut edited = store.get_object(id).await.unwrap().unwrap();
        edited.common.custom.insert("history".into(), json!({ "enabled": true }));
        store.set_object(id, edited).await.unwrap();

        reconciler
            .sync_device(&device, &mut HashSet::new(), &mut RoomIndex::new())
            .await;

        let node = store.get_object(id).await.unwrap().unwrap();
        assert_eq!(node.common.custom["history"], json!({ "enabled": true }));
        assert_eq!(node.common.role.as_deref(), Some("level.temperature"));
    }

    #[tokio::test]
    async fn device_without_states_is_skipped() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let reconciler = TreeReconciler::new(&store, &StaticMetadata, &config);
        let mut device = thermostat();
        for capability in &mut device.capabilities {
            capability.states.clear();
        }
        device.states = vec![State::new("serialNumber", "X1")];

        let mut known = HashSet::new();
        let report = reconciler
            .sync_device(&device, &mut known, &mut RoomIndex::new())
            .await;

        assert!(report.skipped());
        assert!(store.is_empty());
        assert!(known.is_empty());
    }

    #[tokio::test]
    async fn failed_node_does_not_stop_its_siblings() {
        let store = FailingStore::new();
        let setpoint = "hubsync.0.Living-Room.Thermostat-1.Climate.PointTemperature";
        store.refuse(setpoint);
        let config = EngineConfig::default();
        let reconciler = TreeReconciler::new(&store, &StaticMetadata, &config);
        let mut known = HashSet::new();

        let report = reconciler
            .sync_device(&thermostat(), &mut known, &mut RoomIndex::new())
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.nodes, 4);
        assert_eq!(report.values, 2);
        assert!(store.get_object(setpoint).await.unwrap().is_none());

        let humidity = store
            .get_state("hubsync.0.Living-Room.Thermostat-1.Humidity")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(humidity.val, json!(40));
        let reachable = store
            .get_state("hubsync.0.Living-Room.Thermostat-1.IsReachable")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reachable.val, json!(true));
        assert!(known.contains("Living-Room.Thermostat-1.Climate.PointTemperature"));
    }

    #[tokio::test]
    async fn failed_value_write_keeps_the_node() {
        let store = FailingStore::new();
        let config = EngineConfig::default();
        let reconciler = TreeReconciler::new(&store, &StaticMetadata, &config);
        let device = thermostat();
        reconciler
            .sync_device(&device, &mut HashSet::new(), &mut RoomIndex::new())
            .await;

        let humidity = "hubsync.0.Living-Room.Thermostat-1.Humidity";
        store.refuse(humidity);
        let result = reconciler
            .write_value("Living-Room.Thermostat-1.Humidity", json!(55))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        let value = store.get_state(humidity).await.unwrap().unwrap();
        assert_eq!(value.val, json!(40));
        assert!(store.get_object(humidity).await.unwrap().is_some());
    }
}
