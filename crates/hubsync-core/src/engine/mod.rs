// ── Synchronization engine ──
//
// One owner for all engine state: the pending buffer, the known-path set,
// the room index and the connectivity flag. `run()` drives a single
// select loop over hub events, local store writes, watchdog reconnect
// requests and host commands, so none of that state needs a lock.

use std::collections::HashSet;
use std::sync::Arc;

use hubsync_api::{
    Capability, Device, HubClient, HubEvent, HubMessage, HubSubscription, MessageKind, Resolved,
};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{
    AuthStart, CommandEnvelope, CommandResult, EngineCommand, EngineStatus, SyncSummary,
};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::metadata::{MetadataResolver, NodeMetadata, StaticMetadata, ValueType};
use crate::path;
use crate::pending::PendingBuffer;
use crate::reconcile::{SyncReport, TreeReconciler};
use crate::rooms::RoomIndex;
use crate::store::{ObjectStore, StateChange, TreeObject};
use crate::watchdog::{ReconnectRequest, Watchdog, WatchdogPhase};

mod dispatch;

pub use dispatch::DispatchOutcome;

/// Tree path of the connectivity indicator.
pub const INFO_CONNECTION: &str = "info.connection";
/// Tree path of the last live event timestamp.
pub const INFO_LAST_EVENT: &str = "info.lastEvent";

const COMMAND_CHANNEL_SIZE: usize = 32;
const RECONNECT_CHANNEL_SIZE: usize = 4;

/// Resources that exist only between `start()` and `stop()`.
struct RunState {
    cancel: CancellationToken,
    watchdog: Watchdog,
}

/// The device state synchronization engine.
pub struct Engine<H, S> {
    config: EngineConfig,
    hub: Arc<H>,
    store: Arc<S>,
    metadata: Arc<dyn MetadataResolver>,

    pending: PendingBuffer,
    known: HashSet<String>,
    rooms: RoomIndex,

    connected: watch::Sender<bool>,
    initialized: watch::Sender<bool>,
    reconnect_tx: mpsc::Sender<ReconnectRequest>,
    reconnect_rx: Option<mpsc::Receiver<ReconnectRequest>>,
    command_rx: Option<mpsc::Receiver<CommandEnvelope>>,
    events: Option<HubSubscription>,
    root: CancellationToken,
    run: Option<RunState>,
}

/// Cloneable host-side handle on a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<CommandEnvelope>,
    connected: watch::Receiver<bool>,
    initialized: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl<H, S> Engine<H, S>
where
    H: HubClient,
    S: ObjectStore,
{
    pub fn new(config: EngineConfig, hub: Arc<H>, store: Arc<S>) -> (Self, EngineHandle) {
        let (connected, connected_rx) = watch::channel(false);
        let (initialized, initialized_rx) = watch::channel(false);
        let (reconnect_tx, reconnect_rx) = mpsc::channel(RECONNECT_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let root = CancellationToken::new();

        let handle = EngineHandle {
            command_tx,
            connected: connected_rx,
            initialized: initialized_rx,
            cancel: root.clone(),
        };

        let engine = Self {
            config,
            hub,
            store,
            metadata: Arc::new(StaticMetadata),
            pending: PendingBuffer::new(),
            known: HashSet::new(),
            rooms: RoomIndex::new(),
            connected,
            initialized,
            reconnect_tx,
            reconnect_rx: Some(reconnect_rx),
            command_rx: Some(command_rx),
            events: None,
            root,
            run: None,
        };
        (engine, handle)
    }

    /// Replace the built-in metadata table.
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataResolver>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.pending.is_initialized()
    }

    pub fn pending(&self) -> &PendingBuffer {
        &self.pending
    }

    pub fn is_known(&self, path: &str) -> bool {
        self.known.contains(path)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Reset connectivity, create the info nodes, arm the watchdog,
    /// subscribe to the hub and initialize it.
    pub async fn start(&mut self) -> Result<(), CoreError> {
        if self.run.is_some() {
            return Ok(());
        }

        self.ensure_info_nodes().await?;
        self.set_connected(false).await;

        let cancel = self.root.child_token();
        let watchdog = Watchdog::arm(
            self.config.watchdog,
            self.connected.subscribe(),
            self.reconnect_tx.clone(),
            &cancel,
        );
        self.events = Some(self.hub.subscribe());
        self.run = Some(RunState { cancel, watchdog });

        info!(namespace = %self.config.namespace, "engine started");
        self.init_hub().await;
        Ok(())
    }

    /// Disarm the watchdog, drop the hub subscription and close the hub.
    pub async fn stop(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        run.cancel.cancel();
        run.watchdog.disarm().await;
        if let Some(events) = self.events.take() {
            events.cancel();
        }
        self.hub.finalize().await;
        self.set_connected(false).await;
        info!("engine stopped");
    }

    /// Start, process events until the handle shuts the engine down (or the
    /// hub stream ends), then stop.
    pub async fn run(mut self) -> Result<(), CoreError> {
        self.start().await?;

        let mut events = self.events.take().ok_or(CoreError::EngineStopped)?;
        let mut reconnects = self.reconnect_rx.take().ok_or(CoreError::EngineStopped)?;
        let mut commands = self.command_rx.take().ok_or(CoreError::EngineStopped)?;
        let mut local = self.store.subscribe_states();
        let cancel = self.root.clone();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(request) = reconnects.recv() => self.on_reconnect(request).await,
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("hub event stream ended");
                        break;
                    };
                    self.on_hub_event(event).await;
                }
                change = local.recv() => match change {
                    Ok(change) => self.on_store_change(change).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "local state subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                envelope = commands.recv() => {
                    let Some(envelope) = envelope else { break };
                    let result = self.on_command(envelope.command).await;
                    let _ = envelope.response_tx.send(result);
                }
            }
        }

        events.cancel();
        self.stop().await;
        Ok(())
    }

    // ── Synchronization ──────────────────────────────────────────────

    /// Full pass over a hub snapshot.
    ///
    /// Each device is reconciled and its now-known pending values flushed;
    /// then rooms are committed and the buffer is drained for good.
    pub async fn synchronize(&mut self, devices: &[Arc<Device>]) -> SyncSummary {
        let mut summary = SyncSummary::default();

        for device in devices {
            let report = self.reconcile_device(device).await;
            summary.devices += 1;
            if report.skipped() {
                summary.skipped += 1;
            }
            summary.nodes += report.nodes;
            summary.values += report.values;
            summary.failed += report.failed;
        }

        let rooms = self.rooms.commit(&*self.store).await;
        summary.rooms_created = rooms.created.len();
        summary.rooms_extended = rooms.extended.len();
        summary.failed += rooms.failed.len();

        let leftover = self.pending.mark_initialized();
        summary.drained = leftover.len();
        for (path, value) in leftover {
            self.write_ack(&path, value).await;
        }
        self.initialized.send_replace(true);

        info!(
            devices = summary.devices,
            skipped = summary.skipped,
            nodes = summary.nodes,
            failed = summary.failed,
            "synchronization pass complete"
        );
        summary
    }

    /// Reconcile one device, then flush its pending values.
    async fn reconcile_device(&mut self, device: &Device) -> SyncReport {
        let report = TreeReconciler::new(&*self.store, &*self.metadata, &self.config)
            .with_pending(&self.pending)
            .sync_device(device, &mut self.known, &mut self.rooms)
            .await;

        for (path, value) in self.pending.take_known(&self.known) {
            debug!(path = %path, "flushing buffered value");
            self.write_ack(&path, value).await;
        }
        report
    }

    /// Re-run the reconciler for one device and commit its rooms.
    pub(crate) async fn refresh_device(&mut self, device: &Device) -> SyncReport {
        let report = self.reconcile_device(device).await;
        self.rooms.commit(&*self.store).await;
        report
    }

    // ── Hub events ───────────────────────────────────────────────────

    async fn on_hub_event(&mut self, event: HubEvent) {
        debug!(kind = event.kind(), "hub event");

        match event {
            HubEvent::Open => {
                info!("hub connection open");
                self.set_connected(true).await;
            }
            HubEvent::InitializationComplete => {
                self.set_connected(true).await;
                let devices = self.hub.devices();
                info!(devices = devices.len(), "hub initialization complete");
                self.synchronize(&devices).await;
            }
            HubEvent::Close => {
                warn!("hub connection closed");
                self.set_connected(false).await;
            }
            HubEvent::Reconnect => info!("hub is reconnecting"),
            HubEvent::Error(message) => {
                error!(error = %message, "hub error");
                self.set_connected(false).await;
            }
            HubEvent::Warning(message) => warn!(message = %message, "hub warning"),
            HubEvent::Debug(message) => debug!(message = %message, "hub"),
            HubEvent::NeedsAuthorization => {
                warn!("hub needs authorization; start the authorization flow");
                self.set_connected(false).await;
            }
            HubEvent::NeedsMobileAccess => {
                warn!("hub account needs mobile access enabled");
                self.set_connected(false).await;
            }
            HubEvent::InvalidAuthorization => {
                warn!("hub rejected the stored authorization; authorize again");
                self.set_connected(false).await;
            }
            HubEvent::StateChanged(capability) => {
                self.touch_last_event().await;
                self.on_state_changed(&capability).await;
            }
            HubEvent::MessageCreated(message) => {
                self.touch_last_event().await;
                self.on_device_message(&message, true).await;
            }
            HubEvent::MessageDeleted(message) => {
                self.touch_last_event().await;
                self.on_device_message(&message, false).await;
            }
        }
    }

    async fn on_state_changed(&mut self, capability: &Capability) {
        let Some(device) = self.hub.device_by_capability(capability) else {
            debug!(capability = %capability.id, "state change for unknown device");
            return;
        };

        let device_path = path::device_path(&device);
        let updates: Vec<(String, Value)> = capability
            .states
            .iter()
            .map(|s| {
                (
                    path::capability_state_path(&device_path, capability, &s.name),
                    s.value.clone(),
                )
            })
            .collect();

        if !self.pending.is_initialized() {
            for (path, value) in updates {
                debug!(path = %path, "buffering value until first sync completes");
                self.pending.hold(path, value);
            }
            return;
        }

        if updates.iter().all(|(path, _)| self.known.contains(path)) {
            for (path, value) in updates {
                self.write_ack(&path, value).await;
            }
        } else {
            info!(device = %device_path, "state change for new paths, reconciling device");
            self.refresh_device(&device).await;
        }
    }

    async fn on_device_message(&mut self, message: &HubMessage, active: bool) {
        let state = match &message.kind {
            MessageKind::DeviceLowBattery => "lowBattery",
            MessageKind::DeviceUnreachable => "unreachable",
            MessageKind::Other(kind) => {
                debug!(kind = %kind, id = %message.id, "ignoring hub message");
                return;
            }
        };

        for link in &message.devices {
            let Some(Resolved::Device(device)) = self.hub.resolve_link(link) else {
                debug!(link = %link, "message references unknown device");
                continue;
            };

            let ensured = TreeReconciler::new(&*self.store, &*self.metadata, &self.config)
                .ensure_device_state(&device, state)
                .await;
            match ensured {
                Ok(path) => {
                    self.known.insert(path.clone());
                    self.deliver(path, Value::Bool(active)).await;
                }
                Err(e) => warn!(device = %device.id, state, error = %e, "fault state node failed"),
            }
        }
    }

    // ── Local writes and commands ────────────────────────────────────

    async fn on_store_change(&mut self, change: StateChange) {
        let Some(path) = self.config.relative_path(&change.id) else {
            return;
        };
        if path.starts_with("info.") {
            return;
        }

        match self
            .on_local_write(&change.id, change.state.val, change.state.ack)
            .await
        {
            Ok(outcome) => debug!(id = %change.id, ?outcome, "local write handled"),
            Err(e) => warn!(id = %change.id, error = %e, "local write not applied"),
        }
    }

    async fn on_reconnect(&mut self, request: ReconnectRequest) {
        info!(?request, "re-initializing hub");
        self.init_hub().await;
    }

    async fn on_command(&mut self, command: EngineCommand) -> Result<CommandResult, CoreError> {
        match command {
            EngineCommand::StartAuth => self.start_auth().map(CommandResult::AuthStarted),
            EngineCommand::Resync => {
                let devices = self.hub.devices();
                Ok(CommandResult::Synced(self.synchronize(&devices).await))
            }
            EngineCommand::Status => Ok(CommandResult::Status(self.status())),
        }
    }

    fn start_auth(&self) -> Result<AuthStart, CoreError> {
        let uri = self.hub.authorization_uri()?;
        let pending = self.hub.start_authorization();
        let reconnect = self.reconnect_tx.clone();
        let cancel = self.root.child_token();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                result = pending.completed() => match result {
                    Ok(()) => {
                        info!("authorization completed");
                        let _ = reconnect.send(ReconnectRequest::AuthorizationCompleted).await;
                    }
                    Err(e) => warn!(error = %e, "authorization flow did not complete"),
                },
            }
        });

        info!(uri = %uri, "authorization flow started");
        Ok(AuthStart {
            uri: uri.to_string(),
        })
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            connected: *self.connected.borrow(),
            initialized: self.pending.is_initialized(),
            pending: self.pending.len(),
            known_paths: self.known.len(),
            watchdog: self
                .run
                .as_ref()
                .map_or(WatchdogPhase::Unarmed, |run| run.watchdog.phase()),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn init_hub(&mut self) {
        if let Err(e) = self.hub.init().await {
            if e.is_auth_failure() {
                warn!(error = %e, "hub init needs authorization");
            } else if e.is_transient() {
                warn!(error = %e, "hub init failed, waiting for reconnect");
            } else {
                error!(error = %e, "hub init failed");
            }
            self.set_connected(false).await;
        }
    }

    /// Write now, or hold until the first full pass completes.
    async fn deliver(&mut self, path: String, value: Value) {
        if self.pending.is_initialized() {
            self.write_ack(&path, value).await;
        } else {
            self.pending.hold(path, value);
        }
    }

    async fn write_ack(&self, path: &str, value: Value) {
        let id = self.config.object_id(path);
        if let Err(e) = self.store.set_state(&id, value, true).await {
            warn!(path = %path, error = %e, "state write failed");
        }
    }

    async fn ensure_info_nodes(&self) -> Result<(), CoreError> {
        let nodes = [
            (
                INFO_CONNECTION,
                "connection",
                NodeMetadata::read_only(ValueType::Boolean, "indicator.connected"),
            ),
            (
                INFO_LAST_EVENT,
                "lastEvent",
                NodeMetadata::read_only(ValueType::String, "value.time"),
            ),
        ];
        for (path, name, meta) in nodes {
            self.store
                .extend_object(&self.config.object_id(path), TreeObject::state(name, &meta, None))
                .await?;
        }
        Ok(())
    }

    async fn set_connected(&mut self, connected: bool) {
        let previous = self.connected.send_replace(connected);
        if previous != connected {
            debug!(connected, "connectivity changed");
        }
        self.write_ack(INFO_CONNECTION, Value::Bool(connected)).await;
    }

    async fn touch_last_event(&self) {
        let now = chrono::Utc::now().to_rfc3339();
        self.write_ack(INFO_LAST_EVENT, Value::String(now)).await;
    }
}

// ── Handle ───────────────────────────────────────────────────────────

impl EngineHandle {
    /// Begin the authorization flow; returns the URI the user must open.
    ///
    /// The engine re-initializes the hub once the flow completes.
    pub async fn start_auth(&self) -> Result<AuthStart, CoreError> {
        match self.execute(EngineCommand::StartAuth).await? {
            CommandResult::AuthStarted(start) => Ok(start),
            _ => Err(CoreError::EngineStopped),
        }
    }

    pub async fn resync(&self) -> Result<SyncSummary, CoreError> {
        match self.execute(EngineCommand::Resync).await? {
            CommandResult::Synced(summary) => Ok(summary),
            _ => Err(CoreError::EngineStopped),
        }
    }

    pub async fn status(&self) -> Result<EngineStatus, CoreError> {
        match self.execute(EngineCommand::Status).await? {
            CommandResult::Status(status) => Ok(status),
            _ => Err(CoreError::EngineStopped),
        }
    }

    /// Send a command to the engine loop and await its reply.
    pub async fn execute(&self, command: EngineCommand) -> Result<CommandResult, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::EngineStopped)?;

        rx.await.map_err(|_| CoreError::EngineStopped)?
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.borrow()
    }

    /// Resolve once the first full synchronization pass has completed.
    pub async fn wait_initialized(&self) -> Result<(), CoreError> {
        let mut rx = self.initialized.clone();
        rx.wait_for(|initialized| *initialized)
            .await
            .map(|_| ())
            .map_err(|_| CoreError::EngineStopped)
    }

    /// Ask the engine loop to stop. `run()` returns after teardown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use hubsync_api::{Link, Location, ReplayHub, State};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn lamp() -> Device {
        Device {
            id: "d1".into(),
            name: "Lamp".into(),
            device_type: "PSS".into(),
            location: Some(Location {
                id: "l1".into(),
                name: "Hall".into(),
            }),
            capabilities: vec![Capability {
                id: "c1".into(),
                device: Link::Device("d1".into()),
                config_name: Some("Switch".into()),
                states: vec![State::new("onState", false)],
            }],
            states: vec![],
        }
    }

    fn engine(hub: &ReplayHub) -> (Engine<ReplayHub, MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let (engine, _handle) = Engine::new(
            EngineConfig::default(),
            Arc::new(hub.clone()),
            Arc::clone(&store),
        );
        (engine, store)
    }

    #[tokio::test]
    async fn values_before_first_pass_are_buffered() {
        let hub = ReplayHub::new(vec![lamp()]);
        let (mut engine, store) = engine(&hub);

        let capability = hub.push_state("c1", "onState", json!(true)).unwrap();
        engine.on_state_changed(&capability).await;

        assert!(engine.pending().contains("Hall.Lamp.Switch.OnState"));
        assert!(store.get_state("hubsync.0.Hall.Lamp.Switch.OnState").await.unwrap().is_none());

        let devices = hub.devices();
        engine.synchronize(&devices).await;

        assert!(engine.pending().is_empty());
        assert!(engine.is_initialized());
        let value = store
            .get_state("hubsync.0.Hall.Lamp.Switch.OnState")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.val, json!(true));
        assert!(value.ack);
    }

    #[tokio::test]
    async fn device_messages_set_fault_states() {
        let hub = ReplayHub::new(vec![lamp()]);
        let (mut engine, store) = engine(&hub);
        let devices = hub.devices();
        engine.synchronize(&devices).await;

        let message = HubMessage {
            id: "m1".into(),
            kind: MessageKind::DeviceLowBattery,
            devices: vec![Link::Device("d1".into())],
        };
        engine.on_device_message(&message, true).await;
        let state = store.get_state("hubsync.0.Hall.Lamp.LowBattery").await.unwrap().unwrap();
        assert_eq!(state.val, json!(true));

        engine.on_device_message(&message, false).await;
        let state = store.get_state("hubsync.0.Hall.Lamp.LowBattery").await.unwrap().unwrap();
        assert_eq!(state.val, json!(false));
    }

    #[tokio::test]
    async fn start_creates_info_nodes_and_stop_disarms() {
        let hub = ReplayHub::new(vec![]);
        let (mut engine, store) = engine(&hub);

        engine.start().await.unwrap();
        assert_eq!(engine.status().watchdog, WatchdogPhase::Armed);
        let connection = store.get_state("hubsync.0.info.connection").await.unwrap().unwrap();
        assert_eq!(connection.val, json!(false));

        engine.stop().await;
        assert_eq!(engine.status().watchdog, WatchdogPhase::Unarmed);
    }
}
