// ── Tree path derivation ──
//
// Pure functions from hub identity to tree paths:
// `Room.DeviceName[.ChannelName].StateName`. The same inputs always give
// the same bytes, which is what lets repeated syncs extend existing nodes
// instead of creating new ones.

use hubsync_api::{Capability, Device};

/// Room used for devices without a location.
pub const FALLBACK_ROOM: &str = "Virtual";

/// The device's location display name, or [`FALLBACK_ROOM`].
pub fn room_name_for(device: &Device) -> &str {
    device
        .location
        .as_ref()
        .map_or(FALLBACK_ROOM, |location| location.name.as_str())
}

/// Sanitized room name, as used for the room index.
pub fn room_key(device: &Device) -> String {
    sanitize(room_name_for(device))
}

/// Normalize a name into path form.
///
/// Runs of spaces become one hyphen, repeated hyphens collapse (`---`
/// then `--`), `ß` becomes `ss`, one trailing `.` is dropped and the
/// first character is upper-cased.
pub fn sanitize(name: &str) -> String {
    let mut hyphenated = String::with_capacity(name.len());
    let mut in_spaces = false;
    for ch in name.chars() {
        if ch == ' ' {
            if !in_spaces {
                hyphenated.push('-');
            }
            in_spaces = true;
        } else {
            in_spaces = false;
            hyphenated.push(ch);
        }
    }

    let mut clean = hyphenated
        .replace("---", "-")
        .replace("--", "-")
        .replace('ß', "ss");
    if clean.ends_with('.') {
        clean.pop();
    }

    capitalize(&clean)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `Room.DeviceName` for a device.
///
/// The room is sanitized on its own first, so a trailing `.` on the room
/// name cannot leave an empty segment after the join.
pub fn device_path(device: &Device) -> String {
    sanitize(&format!("{}.{}", room_key(device), device.name))
}

/// Channel node path for a capability, if its config name yields a segment.
pub fn channel_path(device_path: &str, capability: &Capability) -> Option<String> {
    capability
        .channel_name()
        .map(|name| format!("{device_path}.{}", sanitize(name)))
}

/// Path of a capability state, under its channel when the capability has one.
pub fn capability_state_path(device_path: &str, capability: &Capability, state_name: &str) -> String {
    match channel_path(device_path, capability) {
        Some(channel) => format!("{channel}.{}", sanitize(state_name)),
        None => device_state_path(device_path, state_name),
    }
}

/// Path of a device-level state.
pub fn device_state_path(device_path: &str, state_name: &str) -> String {
    format!("{device_path}.{}", sanitize(state_name))
}
