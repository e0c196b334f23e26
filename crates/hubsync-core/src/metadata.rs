// ── State metadata ──
//
// Display metadata (type, role, unit, range, writability) for a state
// node, looked up by semantic state name plus context. The lookup table is
// data, not logic; the engine only depends on the `MetadataResolver` trait.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Value type of a state node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Number,
    String,
    Mixed,
}

/// Where a state lives, passed to the resolver alongside its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataContext<'a> {
    /// Device-scoped diagnostic state.
    Device,
    /// Capability state; carries the config name (or the fallback tag).
    Capability(&'a str),
}

/// Metadata for one state node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub value_type: ValueType,
    pub role: String,
    pub unit: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub read: bool,
    pub write: bool,
    /// Enumerated values: raw value -> label.
    pub states: Option<BTreeMap<String, String>>,
}

impl NodeMetadata {
    pub fn read_only(value_type: ValueType, role: &str) -> Self {
        Self {
            value_type,
            role: role.to_owned(),
            unit: None,
            min: None,
            max: None,
            read: true,
            write: false,
            states: None,
        }
    }

    pub fn writable(value_type: ValueType, role: &str) -> Self {
        Self {
            write: true,
            ..Self::read_only(value_type, role)
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_owned());
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_states(mut self, states: &[(&str, &str)]) -> Self {
        self.states = Some(
            states
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        );
        self
    }
}

/// Name + context → metadata lookup.
pub trait MetadataResolver: Send + Sync {
    fn metadata_for(&self, state_name: &str, context: MetadataContext<'_>) -> NodeMetadata;
}

/// Built-in table covering the common hub state names.
///
/// Unknown names map to a read-only string with role `"unknown"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticMetadata;

impl MetadataResolver for StaticMetadata {
    fn metadata_for(&self, state_name: &str, context: MetadataContext<'_>) -> NodeMetadata {
        use ValueType::{Boolean, Number, String};

        match state_name {
            "onState" => NodeMetadata::writable(Boolean, "switch"),
            "dimLevel" => NodeMetadata::writable(Number, "level.dimmer")
                .with_unit("%")
                .with_range(0.0, 100.0),
            "shutterLevel" => NodeMetadata::writable(Number, "level.blind")
                .with_unit("%")
                .with_range(0.0, 100.0),
            "pointTemperature" | "setpointTemperature" => {
                NodeMetadata::writable(Number, "level.temperature")
                    .with_unit("°C")
                    .with_range(6.0, 30.0)
            }
            "temperature" => NodeMetadata::read_only(Number, "value.temperature").with_unit("°C"),
            "humidity" => NodeMetadata::read_only(Number, "value.humidity")
                .with_unit("%")
                .with_range(0.0, 100.0),
            "luminance" => NodeMetadata::read_only(Number, "value.brightness").with_unit("%"),
            "operationMode" => NodeMetadata::writable(String, "state")
                .with_states(&[("Auto", "Automatic"), ("Manu", "Manual")]),
            "isOpen" => NodeMetadata::read_only(Boolean, "sensor.window"),
            "isSmokeAlarm" => NodeMetadata::read_only(Boolean, "sensor.alarm.fire"),
            "lastKeyPressCounter" | "lastPressedButtonIndex" => {
                NodeMetadata::read_only(Number, "value")
            }
            "isReachable" => NodeMetadata::read_only(Boolean, "indicator.reachable"),
            "unreachable" => NodeMetadata::read_only(Boolean, "indicator.maintenance.unreach"),
            "lowBattery" => NodeMetadata::read_only(Boolean, "indicator.lowbat"),
            "firmwareVersion" => NodeMetadata::read_only(String, "info.firmware"),
            "updateState" => NodeMetadata::read_only(String, "info.status"),
            "lastChanged" | "nextSunrise" | "nextSunset" => {
                NodeMetadata::read_only(String, "value.datetime")
            }
            "value" => value_for_context(context),
            _ => NodeMetadata::read_only(String, "unknown"),
        }
    }
}

/// `value` is overloaded across capability kinds; the config name decides.
fn value_for_context(context: MetadataContext<'_>) -> NodeMetadata {
    match context {
        MetadataContext::Capability(name) if name.to_lowercase().contains("dimmer") => {
            NodeMetadata::writable(ValueType::Number, "level.dimmer")
                .with_unit("%")
                .with_range(0.0, 100.0)
        }
        MetadataContext::Capability(name) if name.to_lowercase().contains("switch") => {
            NodeMetadata::writable(ValueType::Boolean, "switch")
        }
        _ => NodeMetadata::read_only(ValueType::Boolean, "sensor"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn known_names_resolve() {
        let meta = StaticMetadata.metadata_for("pointTemperature", MetadataContext::Capability("Climate"));
        assert_eq!(meta.value_type, ValueType::Number);
        assert!(meta.write);
        assert_eq!(meta.unit.as_deref(), Some("°C"));
        assert_eq!(meta.min, Some(6.0));
    }

    #[test]
    fn unknown_names_are_read_only_strings() {
        let meta = StaticMetadata.metadata_for("somethingNew", MetadataContext::Device);
        assert_eq!(meta, NodeMetadata::read_only(ValueType::String, "unknown"));
    }

    #[test]
    fn value_depends_on_context() {
        let dimmer = StaticMetadata.metadata_for("value", MetadataContext::Capability("Hall Dimmer"));
        assert_eq!(dimmer.value_type, ValueType::Number);
        assert!(dimmer.write);

        let sensor = StaticMetadata.metadata_for("value", MetadataContext::Capability("Motion"));
        assert_eq!(sensor.value_type, ValueType::Boolean);
        assert!(!sensor.write);
    }

    #[test]
    fn value_type_displays_lowercase() {
        assert_eq!(ValueType::Boolean.to_string(), "boolean");
        assert_eq!("number".parse::<ValueType>().ok(), Some(ValueType::Number));
    }
}
