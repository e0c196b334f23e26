//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError`, `ConfigError` and hub client errors into user-facing
//! errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use hubsync_config::ConfigError;
use hubsync_core::{CoreError, StoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Hub ──────────────────────────────────────────────────────────
    #[error("Hub authorization required: {message}")]
    #[diagnostic(
        code(hubsync::auth_required),
        help(
            "The hub session is not authorized.\n\
             Configure hub.client_id and a client secret, then start the authorization flow."
        )
    )]
    AuthRequired { message: String },

    #[error("Hub connection lost: {reason}")]
    #[diagnostic(code(hubsync::disconnected))]
    Disconnected { reason: String },

    #[error("Hub rejected '{state}' on capability {capability}: {message}")]
    #[diagnostic(code(hubsync::rejected))]
    Rejected {
        capability: String,
        state: String,
        message: String,
    },

    #[error("Invalid hub session recording: {message}")]
    #[diagnostic(
        code(hubsync::snapshot),
        help("Expected a JSON object with \"devices\" and optional \"events\" arrays.")
    )]
    Snapshot { message: String },

    // ── Tree ─────────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(hubsync::not_found))]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("Tree store error: {message}")]
    #[diagnostic(
        code(hubsync::store),
        help("Check that the tree file was written by `hubsync sync`.")
    )]
    Store { message: String },

    // ── Engine ───────────────────────────────────────────────────────
    #[error("Engine failure: {message}")]
    #[diagnostic(code(hubsync::engine))]
    Engine { message: String },

    #[error("Hub did not finish initializing within {seconds}s")]
    #[diagnostic(
        code(hubsync::timeout),
        help("Increase the wait with --timeout, or check that the recording is authorized.")
    )]
    Timeout { seconds: u64 },

    // ── Validation / configuration ───────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hubsync::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(
        code(hubsync::config),
        help("Inspect the effective configuration with: hubsync config show")
    )]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(hubsync::io))]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(hubsync::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthRequired { .. } => exit_code::AUTH,
            Self::Disconnected { .. } => exit_code::CONNECTION,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Snapshot { .. } => exit_code::USAGE,
            Self::Config(err) => match err {
                ConfigError::Validation { .. } => exit_code::USAGE,
                ConfigError::NoCredentials => exit_code::AUTH,
                _ => exit_code::GENERAL,
            },
            _ => exit_code::GENERAL,
        }
    }
}

// ── Upstream error mapping ───────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthorizationRequired { message } => CliError::AuthRequired { message },

            CoreError::HubDisconnected { reason } => CliError::Disconnected { reason },

            CoreError::Rejected {
                capability,
                state,
                message,
            } => CliError::Rejected {
                capability,
                state,
                message,
            },

            CoreError::NodeNotFound { id } => CliError::NotFound {
                resource_type: "node".into(),
                identifier: id,
            },

            CoreError::CapabilityNotFound { identifier } => CliError::NotFound {
                resource_type: "capability".into(),
                identifier,
            },

            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
            },

            CoreError::MissingLinkage { id } => CliError::Validation {
                field: "node".into(),
                reason: format!("{id} has no hub linkage"),
            },

            CoreError::Store(err) => err.into(),

            CoreError::Hub { message } => CliError::Engine { message },

            CoreError::EngineStopped => CliError::Engine {
                message: "engine stopped before the command completed".into(),
            },
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => CliError::NotFound {
                resource_type: "node".into(),
                identifier: id,
            },
            other => CliError::Store {
                message: other.to_string(),
            },
        }
    }
}

impl From<hubsync_api::Error> for CliError {
    fn from(err: hubsync_api::Error) -> Self {
        match err {
            hubsync_api::Error::Deserialization { message, .. } => CliError::Snapshot { message },
            other => CoreError::from(other).into(),
        }
    }
}
