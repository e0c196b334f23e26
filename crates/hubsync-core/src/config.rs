// ── Runtime engine configuration ──
//
// These types describe how the engine maps the hub into the tree and how
// it watches the connection. They never touch disk: hubsync-config (or a
// test) builds an `EngineConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;

/// Default store namespace; every tree id is prefixed with it.
pub const DEFAULT_NAMESPACE: &str = "hubsync.0";

/// Metadata context tag for capability states without a config name.
pub const DEFAULT_FALLBACK_CONTEXT: &str = "default";

/// Device-level states exposed in the tree unless configured otherwise.
pub const DEFAULT_DEVICE_STATES: &[&str] = &["isReachable", "firmwareVersion", "updateState"];

/// Two-tier connection watchdog timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Period of the liveness check.
    pub check_interval: Duration,
    /// Confirmation delay before a reconnect is requested.
    pub grace_period: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(300),
            grace_period: Duration::from_secs(30),
        }
    }
}

/// Settings handed to the hub client for its authorization flow.
#[derive(Debug, Clone, Default)]
pub struct HubSettings {
    /// Host the authorization redirect lands on.
    pub redirect_host: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
}

/// Configuration for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Store namespace (e.g. `hubsync.0`).
    pub namespace: String,
    pub watchdog: WatchdogConfig,
    /// Device-level state names mirrored into the tree.
    pub device_states: Vec<String>,
    /// Metadata context for capability states without a config name.
    pub fallback_context: String,
    pub hub: HubSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            watchdog: WatchdogConfig::default(),
            device_states: DEFAULT_DEVICE_STATES.iter().map(|s| (*s).to_owned()).collect(),
            fallback_context: DEFAULT_FALLBACK_CONTEXT.into(),
            hub: HubSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Fully-qualified store id for a tree path.
    pub fn object_id(&self, path: &str) -> String {
        format!("{}.{path}", self.namespace)
    }

    /// Tree path for a store id in this namespace, if it belongs here.
    pub fn relative_path<'a>(&self, id: &'a str) -> Option<&'a str> {
        id.strip_prefix(self.namespace.as_str())?.strip_prefix('.')
    }

    pub fn is_device_state(&self, name: &str) -> bool {
        self.device_states.iter().any(|s| s == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_namespace() {
        let config = EngineConfig::default();
        let id = config.object_id("Bath.Heater.Value");
        assert_eq!(id, "hubsync.0.Bath.Heater.Value");
        assert_eq!(config.relative_path(&id), Some("Bath.Heater.Value"));
        assert_eq!(config.relative_path("hubsync.01.Bath"), None);
        assert_eq!(config.relative_path("other.0.Bath"), None);
    }

    #[test]
    fn default_watchdog_is_five_minutes_plus_thirty_seconds() {
        let wd = WatchdogConfig::default();
        assert_eq!(wd.check_interval, Duration::from_secs(300));
        assert_eq!(wd.grace_period, Duration::from_secs(30));
    }
}
