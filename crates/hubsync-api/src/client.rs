// ── Hub client trait ──
//
// The engine talks to the hub only through this trait. Session handling,
// transport and the authorization handshake live behind it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use url::Url;

use crate::error::Error;
use crate::event::HubSubscription;
use crate::model::{Capability, Device, Link};

/// Result of resolving a [`Link`].
#[derive(Debug, Clone)]
pub enum Resolved {
    Device(Arc<Device>),
    Capability(Arc<Capability>),
}

/// Completion signal for an out-of-band authorization flow.
///
/// Returned by [`HubClient::start_authorization`]; resolves once the user
/// has completed the redirect and the hub holds a fresh session.
pub struct AuthorizationPending {
    rx: oneshot::Receiver<Result<(), Error>>,
}

impl AuthorizationPending {
    /// Create a pending flow and the sender the client completes it with.
    pub fn channel() -> (oneshot::Sender<Result<(), Error>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Wait for the flow to finish. A dropped sender counts as aborted.
    pub async fn completed(self) -> Result<(), Error> {
        self.rx.await.unwrap_or(Err(Error::AuthorizationAborted))
    }
}

/// Opaque client for a smart-home hub.
#[async_trait]
pub trait HubClient: Send + Sync + 'static {
    /// Open the session and load the device snapshot.
    ///
    /// Progress is reported through events: `Open`, then
    /// `InitializationComplete`, or one of the authorization events.
    async fn init(&self) -> Result<(), Error>;

    /// Close the session.
    async fn finalize(&self);

    /// URI the user must visit to authorize this client.
    fn authorization_uri(&self) -> Result<Url, Error>;

    /// Begin waiting for the authorization redirect.
    fn start_authorization(&self) -> AuthorizationPending;

    /// Current device snapshot.
    fn devices(&self) -> Vec<Arc<Device>>;

    fn resolve_link(&self, link: &Link) -> Option<Resolved>;

    fn device_by_capability(&self, capability: &Capability) -> Option<Arc<Device>> {
        match self.resolve_link(&capability.device)? {
            Resolved::Device(device) => Some(device),
            Resolved::Capability(_) => None,
        }
    }

    fn capability_by_id(&self, id: &str) -> Option<Arc<Capability>> {
        match self.resolve_link(&Link::Capability(id.to_owned()))? {
            Resolved::Capability(capability) => Some(capability),
            Resolved::Device(_) => None,
        }
    }

    /// Write a state value on a capability.
    async fn set_capability_state(
        &self,
        capability: &Capability,
        state: &str,
        value: serde_json::Value,
    ) -> Result<(), Error>;

    /// Subscribe to the hub event stream.
    fn subscribe(&self) -> HubSubscription;
}
