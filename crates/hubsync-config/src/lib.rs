//! Configuration for the hubsync CLI.
//!
//! A TOML file in the platform config directory, merged with defaults and
//! `HUBSYNC_`-prefixed environment variables, then translated into
//! `hubsync_core::EngineConfig`. The hub client secret is resolved through
//! env → keyring → plaintext.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hubsync_core::config::{DEFAULT_DEVICE_STATES, DEFAULT_FALLBACK_CONTEXT, DEFAULT_NAMESPACE};
use hubsync_core::{EngineConfig, HubSettings, WatchdogConfig};

/// Environment variable checked first for the hub client secret.
pub const CLIENT_SECRET_ENV: &str = "HUBSYNC_CLIENT_SECRET";

const KEYRING_SERVICE: &str = "hubsync";
const KEYRING_SECRET_KEY: &str = "hub/client-secret";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no hub client secret configured")]
    NoCredentials,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Store namespace every tree id is prefixed with.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub watchdog: WatchdogOptions,

    #[serde(default)]
    pub sync: SyncOptions,

    #[serde(default)]
    pub hub: HubOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            watchdog: WatchdogOptions::default(),
            sync: SyncOptions::default(),
            hub: HubOptions::default(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WatchdogOptions {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

impl Default for WatchdogOptions {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            grace_period_secs: default_grace_period(),
        }
    }
}

fn default_check_interval() -> u64 {
    300
}
fn default_grace_period() -> u64 {
    30
}

/// What gets mirrored into the tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncOptions {
    /// Device-level states exposed alongside capability states.
    #[serde(default = "default_device_states")]
    pub device_states: Vec<String>,

    /// Metadata context for capabilities without a config name.
    #[serde(default = "default_fallback_context")]
    pub fallback_context: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            device_states: default_device_states(),
            fallback_context: default_fallback_context(),
        }
    }
}

fn default_device_states() -> Vec<String> {
    DEFAULT_DEVICE_STATES.iter().map(|s| (*s).to_owned()).collect()
}
fn default_fallback_context() -> String {
    DEFAULT_FALLBACK_CONTEXT.into()
}

/// Hub authorization settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HubOptions {
    pub redirect_host: Option<String>,

    pub client_id: Option<String>,

    /// Client secret in plaintext. Keyring or env var take precedence.
    pub client_secret: Option<String>,

    /// Environment variable name containing the client secret.
    pub client_secret_env: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "hubsync", "hubsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hubsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from `path` (missing file = defaults) + `HUBSYNC_` environment.
///
/// Nested keys use a double underscore:
/// `HUBSYNC_WATCHDOG__GRACE_PERIOD_SECS=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed("HUBSYNC_")
                .ignore(&["CLIENT_SECRET", "CONFIG", "LOG"])
                .split("__"),
        );

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the hub client secret: env var → keyring → plaintext.
pub fn resolve_client_secret(hub: &HubOptions) -> Result<SecretString, ConfigError> {
    // 1. Env var (configured name first, then the fixed one)
    let env_names = hub
        .client_secret_env
        .as_deref()
        .into_iter()
        .chain(std::iter::once(CLIENT_SECRET_ENV));
    for name in env_names {
        if let Ok(val) = std::env::var(name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_SECRET_KEY) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref secret) = hub.client_secret {
        return Ok(SecretString::from(secret.clone()));
    }

    Err(ConfigError::NoCredentials)
}

// ── Translation ─────────────────────────────────────────────────────

/// Validate the file model and build an `EngineConfig`.
///
/// A missing client secret is not an error here; the hub decides whether
/// it needs one.
pub fn to_engine_config(cfg: &Config) -> Result<EngineConfig, ConfigError> {
    validate(cfg)?;

    let client_secret = match resolve_client_secret(&cfg.hub) {
        Ok(secret) => Some(secret),
        Err(ConfigError::NoCredentials) => None,
        Err(e) => return Err(e),
    };

    Ok(EngineConfig {
        namespace: cfg.namespace.clone(),
        watchdog: WatchdogConfig {
            check_interval: Duration::from_secs(cfg.watchdog.check_interval_secs),
            grace_period: Duration::from_secs(cfg.watchdog.grace_period_secs),
        },
        device_states: cfg.sync.device_states.clone(),
        fallback_context: cfg.sync.fallback_context.clone(),
        hub: HubSettings {
            redirect_host: cfg.hub.redirect_host.clone(),
            client_id: cfg.hub.client_id.clone(),
            client_secret,
        },
    })
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let ns = cfg.namespace.trim();
    if ns.is_empty() || ns.contains(char::is_whitespace) || ns.ends_with('.') {
        return Err(ConfigError::Validation {
            field: "namespace".into(),
            reason: format!("expected a dotted identifier like 'hubsync.0', got '{}'", cfg.namespace),
        });
    }
    if cfg.watchdog.check_interval_secs == 0 {
        return Err(ConfigError::Validation {
            field: "watchdog.check_interval_secs".into(),
            reason: "must be greater than zero".into(),
        });
    }
    if cfg.watchdog.grace_period_secs == 0 {
        return Err(ConfigError::Validation {
            field: "watchdog.grace_period_secs".into(),
            reason: "must be greater than zero".into(),
        });
    }
    if cfg.sync.fallback_context.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "sync.fallback_context".into(),
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}
