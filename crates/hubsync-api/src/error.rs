use thiserror::Error;

/// Top-level error type for the `hubsync-api` crate.
///
/// Covers every failure the hub client surface can report: authorization,
/// transport, capability writes and malformed hub data.
/// `hubsync-core` maps these into engine-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authorization ───────────────────────────────────────────────
    /// The hub has no usable session and the user must authorize again.
    #[error("Authorization required -- start the authorization flow")]
    AuthorizationRequired,

    /// The hub account needs mobile access enabled before it can be used.
    #[error("Mobile access must be enabled for this hub account")]
    MobileAccessRequired,

    /// The stored authorization was rejected by the hub.
    #[error("Invalid authorization: {message}")]
    InvalidAuthorization { message: String },

    /// The out-of-band authorization flow ended without completing.
    #[error("Authorization flow aborted before completion")]
    AuthorizationAborted,

    /// Session has expired and must be refreshed.
    #[error("Session expired -- re-authorization required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// The hub connection is not open.
    #[error("Hub is not connected")]
    NotConnected,

    /// Connection-level failure reported by the hub client.
    #[error("Hub transport error: {0}")]
    Transport(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Capabilities ────────────────────────────────────────────────
    /// The hub refused a capability state write.
    #[error("Hub rejected write of '{state}' on capability {capability}: {message}")]
    Rejected {
        capability: String,
        state: String,
        message: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// A link string did not match `/<kind>/<id>`.
    #[error("Invalid hub link: {0}")]
    InvalidLink(String),

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error needs a human to re-run authorization.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationRequired
                | Self::MobileAccessRequired
                | Self::InvalidAuthorization { .. }
                | Self::SessionExpired
        )
    }

    /// Returns `true` if this is a transient error the watchdog will recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Transport(_))
    }
}
