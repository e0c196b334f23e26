//! Replay hub: a [`HubClient`] backed by a recorded device snapshot.
//!
//! Used by tests and by the CLI `sync` command. `init()` publishes `Open`
//! and `InitializationComplete` (or `NeedsAuthorization` when the replay
//! is configured as unauthorized); scripted [`ReplayEvent`]s can then be
//! played into the stream. Capability writes are recorded and echoed back
//! as `StateChanged`, like a real hub would push them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::{AuthorizationPending, HubClient, Resolved};
use crate::error::Error;
use crate::event::{EVENT_CHANNEL_CAPACITY, HubEvent, HubMessage, HubSubscription};
use crate::model::{Capability, Device, Link};

const AUTHORIZATION_ENDPOINT: &str = "https://auth.hub.invalid/authorize";
const DEFAULT_CLIENT_ID: &str = "hubsync";

// ── Recorded data ────────────────────────────────────────────────────

/// A recorded hub session: the device snapshot plus events to replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplaySnapshot {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub events: Vec<ReplayEvent>,
}

impl ReplaySnapshot {
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.chars().take(256).collect(),
        })
    }
}

/// A scripted hub event in serializable form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReplayEvent {
    Open,
    Close,
    StateChanged {
        capability: String,
        state: String,
        value: serde_json::Value,
    },
    MessageCreated {
        message: HubMessage,
    },
    MessageDeleted {
        message: HubMessage,
    },
    Warning {
        message: String,
    },
}

/// A capability write the replay hub accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityWrite {
    pub capability: String,
    pub state: String,
    pub value: serde_json::Value,
}

// ── ReplayHub ────────────────────────────────────────────────────────

/// In-process hub client. Cheaply cloneable; clones share state.
#[derive(Clone, Debug)]
pub struct ReplayHub {
    inner: Arc<ReplayInner>,
}

#[derive(Debug)]
struct ReplayInner {
    devices: DashMap<String, Arc<Device>>,
    capabilities: DashMap<String, Arc<Capability>>,
    events: broadcast::Sender<HubEvent>,
    cancel: CancellationToken,
    authorization_uri: Mutex<String>,
    authorized: AtomicBool,
    reject_writes: AtomicBool,
    init_calls: AtomicUsize,
    writes: Mutex<Vec<CapabilityWrite>>,
    pending_auth: Mutex<Option<oneshot::Sender<Result<(), Error>>>>,
}

impl ReplayHub {
    pub fn new(devices: Vec<Device>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let hub = Self {
            inner: Arc::new(ReplayInner {
                devices: DashMap::new(),
                capabilities: DashMap::new(),
                events,
                cancel: CancellationToken::new(),
                authorization_uri: Mutex::new(format!(
                    "{AUTHORIZATION_ENDPOINT}?client_id={DEFAULT_CLIENT_ID}"
                )),
                authorized: AtomicBool::new(true),
                reject_writes: AtomicBool::new(false),
                init_calls: AtomicUsize::new(0),
                writes: Mutex::new(Vec::new()),
                pending_auth: Mutex::new(None),
            }),
        };
        for device in devices {
            hub.upsert_device(device);
        }
        hub
    }

    /// Start unauthorized: `init()` reports `NeedsAuthorization` until
    /// [`complete_authorization`](Self::complete_authorization) is called.
    pub fn unauthorized(self) -> Self {
        self.inner.authorized.store(false, Ordering::SeqCst);
        self
    }

    /// Point the authorization flow at a registered client.
    ///
    /// The redirect lands on `https://<redirect_host>/callback` when a host
    /// is given.
    pub fn with_client(self, client_id: &str, redirect_host: Option<&str>) -> Result<Self, Error> {
        let mut uri = Url::parse(AUTHORIZATION_ENDPOINT)?;
        {
            let mut query = uri.query_pairs_mut();
            query.append_pair("client_id", client_id);
            if let Some(host) = redirect_host {
                query.append_pair("redirect_uri", &format!("https://{host}/callback"));
            }
        }
        if let Ok(mut slot) = self.inner.authorization_uri.lock() {
            *slot = uri.into();
        }
        Ok(self)
    }

    /// Make every subsequent capability write fail with [`Error::Rejected`].
    pub fn reject_writes(&self, reject: bool) {
        self.inner.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of times `init()` has been called.
    pub fn init_calls(&self) -> usize {
        self.inner.init_calls.load(Ordering::SeqCst)
    }

    /// Capability writes accepted so far.
    pub fn writes(&self) -> Vec<CapabilityWrite> {
        self.inner
            .writes
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    /// Add or replace a device and index its capabilities.
    pub fn upsert_device(&self, device: Device) {
        for capability in &device.capabilities {
            self.inner
                .capabilities
                .insert(capability.id.clone(), Arc::new(capability.clone()));
        }
        self.inner.devices.insert(device.id.clone(), Arc::new(device));
    }

    /// Forget a capability, as the hub does when a device is re-included.
    pub fn remove_capability(&self, id: &str) {
        self.inner.capabilities.remove(id);
    }

    /// Publish an event to all subscribers.
    pub fn emit(&self, event: HubEvent) {
        // No subscribers is fine; the event is simply dropped.
        let _ = self.inner.events.send(event);
    }

    /// Update a capability state and publish `StateChanged`.
    pub fn push_state(
        &self,
        capability_id: &str,
        state: &str,
        value: serde_json::Value,
    ) -> Option<Arc<Capability>> {
        let updated = self.apply_state(capability_id, state, value)?;
        self.emit(HubEvent::StateChanged(Arc::clone(&updated)));
        Some(updated)
    }

    /// Play a scripted event.
    pub fn play(&self, event: &ReplayEvent) {
        match event {
            ReplayEvent::Open => self.emit(HubEvent::Open),
            ReplayEvent::Close => self.emit(HubEvent::Close),
            ReplayEvent::StateChanged {
                capability,
                state,
                value,
            } => {
                if self.push_state(capability, state, value.clone()).is_none() {
                    tracing::debug!(capability = %capability, "replay: unknown capability");
                }
            }
            ReplayEvent::MessageCreated { message } => {
                self.emit(HubEvent::MessageCreated(message.clone()));
            }
            ReplayEvent::MessageDeleted { message } => {
                self.emit(HubEvent::MessageDeleted(message.clone()));
            }
            ReplayEvent::Warning { message } => self.emit(HubEvent::Warning(message.clone())),
        }
    }

    /// Finish a pending authorization flow successfully.
    pub fn complete_authorization(&self) {
        self.inner.authorized.store(true, Ordering::SeqCst);
        let sender = self
            .inner
            .pending_auth
            .lock()
            .ok()
            .and_then(|mut pending| pending.take());
        if let Some(tx) = sender {
            let _ = tx.send(Ok(()));
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn apply_state(
        &self,
        capability_id: &str,
        state: &str,
        value: serde_json::Value,
    ) -> Option<Arc<Capability>> {
        let current = self.inner.capabilities.get(capability_id)?.value().clone();

        let mut capability = (*current).clone();
        match capability.states.iter_mut().find(|s| s.name == state) {
            Some(existing) => existing.value = value,
            None => capability.states.push(crate::model::State::new(state, value)),
        }
        let capability = Arc::new(capability);
        self.inner
            .capabilities
            .insert(capability_id.to_owned(), Arc::clone(&capability));

        // Keep the owning device's copy in step.
        let device_id = capability.device.id().to_owned();
        if let Some(mut entry) = self.inner.devices.get_mut(&device_id) {
            let mut device = (**entry).clone();
            if let Some(slot) = device.capabilities.iter_mut().find(|c| c.id == capability_id) {
                *slot = (*capability).clone();
            }
            *entry = Arc::new(device);
        }

        Some(capability)
    }
}

#[async_trait]
impl HubClient for ReplayHub {
    async fn init(&self) -> Result<(), Error> {
        self.inner.init_calls.fetch_add(1, Ordering::SeqCst);

        if !self.inner.authorized.load(Ordering::SeqCst) {
            self.emit(HubEvent::NeedsAuthorization);
            return Ok(());
        }

        self.emit(HubEvent::Open);
        self.emit(HubEvent::InitializationComplete);
        Ok(())
    }

    async fn finalize(&self) {
        self.emit(HubEvent::Close);
        self.inner.cancel.cancel();
    }

    fn authorization_uri(&self) -> Result<Url, Error> {
        let uri = self
            .inner
            .authorization_uri
            .lock()
            .map_err(|_| Error::Transport("authorization state poisoned".into()))?;
        Ok(Url::parse(&uri)?)
    }

    fn start_authorization(&self) -> AuthorizationPending {
        let (tx, pending) = AuthorizationPending::channel();
        if let Ok(mut slot) = self.inner.pending_auth.lock() {
            *slot = Some(tx);
        }
        pending
    }

    fn devices(&self) -> Vec<Arc<Device>> {
        let mut devices: Vec<Arc<Device>> = self
            .inner
            .devices
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    fn resolve_link(&self, link: &Link) -> Option<Resolved> {
        match link {
            Link::Device(id) => self
                .inner
                .devices
                .get(id)
                .map(|d| Resolved::Device(Arc::clone(d.value()))),
            Link::Capability(id) => self
                .inner
                .capabilities
                .get(id)
                .map(|c| Resolved::Capability(Arc::clone(c.value()))),
            Link::Location(_) => None,
        }
    }

    async fn set_capability_state(
        &self,
        capability: &Capability,
        state: &str,
        value: serde_json::Value,
    ) -> Result<(), Error> {
        if self.inner.reject_writes.load(Ordering::SeqCst) {
            return Err(Error::Rejected {
                capability: capability.id.clone(),
                state: state.to_owned(),
                message: "replay hub is rejecting writes".into(),
            });
        }

        if let Ok(mut writes) = self.inner.writes.lock() {
            writes.push(CapabilityWrite {
                capability: capability.id.clone(),
                state: state.to_owned(),
                value: value.clone(),
            });
        }

        self.push_state(&capability.id, state, value);
        Ok(())
    }

    fn subscribe(&self) -> HubSubscription {
        HubSubscription::new(self.inner.events.subscribe(), self.inner.cancel.child_token())
    }
}
