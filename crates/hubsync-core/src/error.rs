// ── Core error types ──
//
// Engine-facing errors from hubsync-core. Consumers never see raw hub
// client errors; the `From<hubsync_api::Error>` impl translates them into
// the categories the engine actually acts on.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Hub errors ───────────────────────────────────────────────────
    #[error("Hub authorization needed: {message}")]
    AuthorizationRequired { message: String },

    #[error("Hub disconnected: {reason}")]
    HubDisconnected { reason: String },

    #[error("Hub rejected write of '{state}' on capability {capability}: {message}")]
    Rejected {
        capability: String,
        state: String,
        message: String,
    },

    #[error("Hub error: {message}")]
    Hub { message: String },

    // ── Tree errors ──────────────────────────────────────────────────
    #[error("Tree node not found: {id}")]
    NodeNotFound { id: String },

    #[error("Tree node {id} has no hub linkage")]
    MissingLinkage { id: String },

    #[error("Capability not found on hub: {identifier}")]
    CapabilityNotFound { identifier: String },

    #[error("Device not found on hub: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Engine is not running")]
    EngineStopped,
}

/// Failures reported by an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {id}")]
    NotFound { id: String },

    #[error("Store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing storage could not be reached or written.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

// ── Conversion from hub-layer errors ─────────────────────────────────

impl From<hubsync_api::Error> for CoreError {
    fn from(err: hubsync_api::Error) -> Self {
        use hubsync_api::Error as Api;

        match err {
            Api::AuthorizationRequired | Api::AuthorizationAborted | Api::SessionExpired => {
                CoreError::AuthorizationRequired {
                    message: err.to_string(),
                }
            }
            Api::MobileAccessRequired => CoreError::AuthorizationRequired {
                message: "Mobile access must be enabled for this hub account".into(),
            },
            Api::InvalidAuthorization { message } => CoreError::AuthorizationRequired { message },
            Api::NotConnected => CoreError::HubDisconnected {
                reason: "not connected".into(),
            },
            Api::Transport(reason) => CoreError::HubDisconnected { reason },
            Api::Rejected {
                capability,
                state,
                message,
            } => CoreError::Rejected {
                capability,
                state,
                message,
            },
            Api::InvalidUrl(_) | Api::InvalidLink(_) | Api::Deserialization { .. } => {
                CoreError::Hub {
                    message: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_write_keeps_its_target() {
        let err: CoreError = hubsync_api::Error::Rejected {
            capability: "c1".into(),
            state: "onState".into(),
            message: "device busy".into(),
        }
        .into();

        match err {
            CoreError::Rejected { capability, state, .. } => {
                assert_eq!(capability, "c1");
                assert_eq!(state, "onState");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn auth_failures_map_to_authorization_required() {
        let err: CoreError = hubsync_api::Error::MobileAccessRequired.into();
        assert!(matches!(err, CoreError::AuthorizationRequired { .. }));

        let err: CoreError = hubsync_api::Error::Transport("reset".into()).into();
        assert!(matches!(err, CoreError::HubDisconnected { .. }));
    }
}
