//! Hub event stream.
//!
//! The hub client publishes [`HubEvent`]s through a
//! [`tokio::sync::broadcast`] channel. Consumers hold a
//! [`HubSubscription`], which yields events until the client drops the
//! sender or the subscription is cancelled.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::model::{Capability, Link};

// ── Broadcast channel capacity ───────────────────────────────────────

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── HubEvent ─────────────────────────────────────────────────────────

/// Everything the hub client can tell its consumer.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// The hub connection is open.
    Open,
    /// The hub connection closed.
    Close,
    /// The client is re-establishing its connection on its own.
    Reconnect,
    Error(String),
    Warning(String),
    Debug(String),
    /// No session available; a human must run the authorization flow.
    NeedsAuthorization,
    /// The account needs mobile access enabled.
    NeedsMobileAccess,
    /// The stored session was rejected.
    InvalidAuthorization,
    /// A capability pushed new state values. Carries the updated capability.
    StateChanged(Arc<Capability>),
    /// The hub finished loading its full device snapshot.
    InitializationComplete,
    MessageCreated(HubMessage),
    MessageDeleted(HubMessage),
}

impl HubEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Reconnect => "reconnect",
            Self::Error(_) => "error",
            Self::Warning(_) => "warning",
            Self::Debug(_) => "debug",
            Self::NeedsAuthorization => "needsAuthorization",
            Self::NeedsMobileAccess => "needsMobileAccess",
            Self::InvalidAuthorization => "invalidAuthorization",
            Self::StateChanged(_) => "stateChanged",
            Self::InitializationComplete => "initializationComplete",
            Self::MessageCreated(_) => "messageCreated",
            Self::MessageDeleted(_) => "messageDeleted",
        }
    }
}

// ── HubMessage ───────────────────────────────────────────────────────

/// A hub notification attached to one or more devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub devices: Vec<Link>,
}

/// Message categories. Only device faults are mapped into the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    DeviceLowBattery,
    DeviceUnreachable,
    Other(String),
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "DeviceLowBattery" => Self::DeviceLowBattery,
            "DeviceUnreachable" => Self::DeviceUnreachable,
            _ => Self::Other(s),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::DeviceLowBattery => "DeviceLowBattery".into(),
            MessageKind::DeviceUnreachable => "DeviceUnreachable".into(),
            MessageKind::Other(s) => s,
        }
    }
}

// ── HubSubscription ──────────────────────────────────────────────────

/// Cancellable handle on the hub event stream.
pub struct HubSubscription {
    rx: broadcast::Receiver<HubEvent>,
    cancel: CancellationToken,
}

impl HubSubscription {
    pub fn new(rx: broadcast::Receiver<HubEvent>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the subscription is cancelled or the hub client
    /// has been dropped. Lagged receivers skip ahead with a warning.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                result = self.rx.recv() => match result {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "hub subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Stop receiving events. Pending and future `recv` calls return `None`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_round_trips_known_and_unknown() {
        let msg: HubMessage = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "type": "DeviceLowBattery",
            "devices": ["/device/d1"]
        }))
        .unwrap();
        assert_eq!(msg.kind, MessageKind::DeviceLowBattery);
        assert_eq!(msg.devices, vec![Link::Device("d1".into())]);

        let other = MessageKind::from("ShcUpdateAvailable".to_string());
        assert_eq!(String::from(other), "ShcUpdateAvailable");
    }

    #[tokio::test]
    async fn cancelled_subscription_returns_none() {
        let (tx, rx) = broadcast::channel(4);
        let mut sub = HubSubscription::new(rx, CancellationToken::new());

        tx.send(HubEvent::Open).unwrap();
        assert!(matches!(sub.recv().await, Some(HubEvent::Open)));

        sub.cancel();
        tx.send(HubEvent::Close).unwrap();
        assert!(sub.recv().await.is_none());
        assert!(sub.is_cancelled());
    }

    #[tokio::test]
    async fn closed_channel_ends_subscription() {
        let (tx, rx) = broadcast::channel::<HubEvent>(4);
        let mut sub = HubSubscription::new(rx, CancellationToken::new());
        drop(tx);
        assert!(sub.recv().await.is_none());
    }
}
