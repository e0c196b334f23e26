// ── Tree object documents ──
//
// The shape of a persisted tree node: `{ type, common, native }`.
// `common` holds display metadata the engine owns plus any custom fields
// a human added; `native` holds the hub linkage. `extend` is the additive
// merge every upsert goes through.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hubsync_api::Link;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::{NodeMetadata, ValueType};

/// Node kind in the object tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ObjectKind {
    Device,
    Channel,
    State,
    Enum,
}

/// Display metadata and user-owned fields of a node.
///
/// Every engine-owned field is optional so a partial document only
/// overwrites what it carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Common {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<BTreeMap<String, String>>,
    /// Enum members (full store ids). Only set on `enum` nodes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    /// Fields not owned by the engine; preserved across syncs.
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

impl Common {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn from_metadata(name: impl Into<String>, meta: &NodeMetadata) -> Self {
        Self {
            name: Some(name.into()),
            value_type: Some(meta.value_type),
            role: Some(meta.role.clone()),
            unit: meta.unit.clone(),
            min: meta.min,
            max: meta.max,
            read: Some(meta.read),
            write: Some(meta.write),
            states: meta.states.clone(),
            ..Self::default()
        }
    }

    /// Whether a local write to this node should reach the hub.
    pub fn is_writable(&self) -> bool {
        self.write.unwrap_or(false)
    }

    fn merge(&mut self, other: Common) {
        merge_option(&mut self.name, other.name);
        merge_option(&mut self.value_type, other.value_type);
        merge_option(&mut self.role, other.role);
        merge_option(&mut self.unit, other.unit);
        merge_option(&mut self.min, other.min);
        merge_option(&mut self.max, other.max);
        merge_option(&mut self.read, other.read);
        merge_option(&mut self.write, other.write);
        merge_option(&mut self.states, other.states);
        for member in other.members {
            if !self.members.contains(&member) {
                self.members.push(member);
            }
        }
        self.custom.extend(other.custom);
    }
}

/// Hub linkage of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Native {
    /// Owning hub object: `/device/<id>` or `/capability/<id>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
    /// Semantic state name on the hub, for state nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Hub product type, for device nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Native {
    fn merge(&mut self, other: Native) {
        merge_option(&mut self.link, other.link);
        merge_option(&mut self.state, other.state);
        merge_option(&mut self.device_type, other.device_type);
        self.extra.extend(other.extra);
    }
}

fn merge_option<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// A persisted tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeObject {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    #[serde(default)]
    pub common: Common,
    #[serde(default)]
    pub native: Native,
}

impl TreeObject {
    pub fn device(name: &str, link: Link, device_type: &str) -> Self {
        Self {
            kind: ObjectKind::Device,
            common: Common::named(name),
            native: Native {
                link: Some(link),
                device_type: Some(device_type.to_owned()),
                ..Native::default()
            },
        }
    }

    pub fn channel(name: &str, link: Link) -> Self {
        Self {
            kind: ObjectKind::Channel,
            common: Common::named(name),
            native: Native {
                link: Some(link),
                ..Native::default()
            },
        }
    }

    /// State node linked to its hub owner under the semantic `state` name.
    pub fn state(state: &str, meta: &NodeMetadata, link: Option<Link>) -> Self {
        Self {
            kind: ObjectKind::State,
            common: Common::from_metadata(state, meta),
            native: Native {
                link,
                state: Some(state.to_owned()),
                ..Native::default()
            },
        }
    }

    pub fn room(name: &str, members: Vec<String>) -> Self {
        Self {
            kind: ObjectKind::Enum,
            common: Common {
                members,
                ..Common::named(name)
            },
            native: Native::default(),
        }
    }

    /// Merge `partial` into this node.
    ///
    /// `Some` fields in `partial` replace ours; everything else is kept.
    /// Enum members are unioned, custom fields merged key by key.
    pub fn extend(&mut self, partial: TreeObject) {
        self.kind = partial.kind;
        self.common.merge(partial.common);
        self.native.merge(partial.native);
    }
}

/// A state value with its acknowledgement flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateValue {
    pub val: Value,
    /// `true` when the engine wrote it from hub truth.
    pub ack: bool,
    pub ts: DateTime<Utc>,
}

/// Broadcast for every state write to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub id: String,
    pub state: StateValue,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataContext, MetadataResolver, StaticMetadata};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn extend_keeps_custom_fields() {
        let mut existing: TreeObject = serde_json::from_value(json!({
            "type": "state",
            "common": { "name": "old", "role": "switch", "smartName": "Lamp" },
            "native": { "link": "/capability/c1", "note": "hand edited" }
        }))
        .unwrap();

        let meta = StaticMetadata.metadata_for("onState", MetadataContext::Capability("Light"));
        existing.extend(TreeObject::state(
            "onState",
            &meta,
            Some(Link::Capability("c1".into())),
        ));

        assert_eq!(existing.common.name.as_deref(), Some("onState"));
        assert_eq!(existing.common.custom["smartName"], json!("Lamp"));
        assert_eq!(existing.native.extra["note"], json!("hand edited"));
        assert_eq!(existing.native.state.as_deref(), Some("onState"));
        assert!(existing.common.is_writable());
    }

    #[test]
    fn extend_unions_members() {
        let mut room = TreeObject::room("Kitchen", vec!["X.A".into()]);
        room.extend(TreeObject::room("Kitchen", vec!["X.B".into(), "X.A".into()]));
        assert_eq!(room.common.members, vec!["X.A", "X.B"]);
    }

    #[test]
    fn serializes_in_store_shape() {
        let obj = TreeObject::channel("Climate", Link::Capability("c1".into()));
        let value = serde_json::to_value(&obj).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "channel",
                "common": { "name": "Climate" },
                "native": { "link": "/capability/c1" }
            })
        );
    }
}
