// ── Hub object model ──
//
// Devices, capabilities and their states as the hub reports them.
// Cross references between objects are `Link`s (`/device/<id>`,
// `/capability/<id>`, `/location/<id>`), resolved through the client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ── Link ────────────────────────────────────────────────────────────

/// Reference from one hub object to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Link {
    Device(String),
    Capability(String),
    Location(String),
}

impl Link {
    /// The opaque id part of the link.
    pub fn id(&self) -> &str {
        match self {
            Self::Device(id) | Self::Capability(id) | Self::Location(id) => id,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(id) => write!(f, "/device/{id}"),
            Self::Capability(id) => write!(f, "/capability/{id}"),
            Self::Location(id) => write!(f, "/location/{id}"),
        }
    }
}

impl FromStr for Link {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim_start_matches('/').splitn(2, '/');
        let kind = parts.next().unwrap_or_default();
        let id = parts.next().unwrap_or_default();
        if id.is_empty() || id.contains('/') {
            return Err(Error::InvalidLink(s.to_owned()));
        }
        match kind {
            "device" => Ok(Self::Device(id.to_owned())),
            "capability" => Ok(Self::Capability(id.to_owned())),
            "location" => Ok(Self::Location(id.to_owned())),
            _ => Err(Error::InvalidLink(s.to_owned())),
        }
    }
}

impl TryFrom<String> for Link {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Link> for String {
    fn from(link: Link) -> Self {
        link.to_string()
    }
}

// ── Location ────────────────────────────────────────────────────────

/// A room as configured on the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
}

// ── State ───────────────────────────────────────────────────────────

/// A single named value on a device or capability.
///
/// The name is the hub's stable semantic key. Writability is not part of
/// the hub model; it is derived from the name by the metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl State {
    pub fn new(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ── Capability ──────────────────────────────────────────────────────

/// A facet of a device grouping related states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    /// Owning device. Only ever resolved, never followed for mutation.
    pub device: Link,
    /// Display name from the capability config; drives the channel segment.
    #[serde(default)]
    pub config_name: Option<String>,
    #[serde(default)]
    pub states: Vec<State>,
}

impl Capability {
    pub fn link(&self) -> Link {
        Link::Capability(self.id.clone())
    }

    /// The config name, untrimmed, unless it is blank.
    ///
    /// Surrounding spaces are kept and sanitize into hyphens; a name of
    /// only whitespace yields no channel.
    pub fn channel_name(&self) -> Option<&str> {
        self.config_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }
}

// ── Device ──────────────────────────────────────────────────────────

/// A hub-managed unit with a location and capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    /// Hub product type, e.g. `"RST"` or `"WDS"`.
    #[serde(default, rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Device-scoped diagnostic states (reachability, firmware, ...).
    #[serde(default)]
    pub states: Vec<State>,
}

impl Device {
    pub fn link(&self) -> Link {
        Link::Device(self.id.clone())
    }

    pub fn has_capability_states(&self) -> bool {
        self.capabilities.iter().any(|c| !c.states.is_empty())
    }

    pub fn capability(&self, id: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn link_parses_with_and_without_leading_slash() {
        assert_eq!(
            "/device/abc".parse::<Link>().unwrap(),
            Link::Device("abc".into())
        );
        assert_eq!(
            "capability/42".parse::<Link>().unwrap(),
            Link::Capability("42".into())
        );
    }

    #[test]
    fn link_rejects_unknown_kind_and_missing_id() {
        assert!("/room/abc".parse::<Link>().is_err());
        assert!("/device/".parse::<Link>().is_err());
        assert!("/device/a/b".parse::<Link>().is_err());
    }

    #[test]
    fn device_deserializes_with_defaults() {
        let json = serde_json::json!({
            "id": "d1",
            "name": "Thermostat 1",
            "type": "RST",
            "capabilities": [{
                "id": "c1",
                "device": "/device/d1",
                "config_name": "Climate",
                "states": [{ "name": "pointTemperature", "value": 21.5 }]
            }]
        });

        let device: Device = serde_json::from_value(json).unwrap();
        assert_eq!(device.device_type, "RST");
        assert!(device.location.is_none());
        assert!(device.states.is_empty());
        assert!(device.has_capability_states());
        assert_eq!(device.capabilities[0].device, Link::Device("d1".into()));
        assert_eq!(device.capabilities[0].channel_name(), Some("Climate"));
    }

    #[test]
    fn blank_config_name_has_no_channel() {
        let cap = Capability {
            id: "c1".into(),
            device: Link::Device("d1".into()),
            config_name: Some("   ".into()),
            states: vec![],
        };
        assert_eq!(cap.channel_name(), None);
    }
}
