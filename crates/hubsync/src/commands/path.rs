//! `hubsync path`: derive a tree path without touching a hub.

use hubsync_api::{Capability, Device, Link, Location};
use hubsync_core::path;
use serde::Serialize;

use crate::cli::{GlobalOpts, PathArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct DerivedPath {
    room: String,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

pub fn handle(args: &PathArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.device.trim().is_empty() {
        return Err(CliError::Validation {
            field: "device".into(),
            reason: "device name must not be empty".into(),
        });
    }

    let device = Device {
        id: "cli".into(),
        name: args.device.clone(),
        device_type: String::new(),
        location: args.room.as_ref().map(|name| Location {
            id: "cli".into(),
            name: name.clone(),
        }),
        capabilities: Vec::new(),
        states: Vec::new(),
    };
    let capability = Capability {
        id: "cli".into(),
        device: Link::Device("cli".into()),
        config_name: args.channel.clone(),
        states: Vec::new(),
    };

    let device_path = path::device_path(&device);
    let derived = match &args.state {
        Some(state) => path::capability_state_path(&device_path, &capability, state),
        None => path::channel_path(&device_path, &capability).unwrap_or(device_path),
    };

    let id = if args.id {
        Some(util::engine_config(global)?.object_id(&derived))
    } else {
        None
    };

    let result = DerivedPath {
        room: path::room_key(&device),
        path: derived,
        id,
    };
    let out = output::render_single(
        &global.output,
        &result,
        |r| Ok(r.id.clone().unwrap_or_else(|| r.path.clone())),
        |r| r.id.clone().unwrap_or_else(|| r.path.clone()),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
