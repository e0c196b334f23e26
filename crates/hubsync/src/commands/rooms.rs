//! `hubsync rooms`: list room enumerations stored in a tree file.

use hubsync_core::{ObjectKind, ObjectStore};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{GlobalOpts, RoomsArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct RoomView {
    id: String,
    name: String,
    members: Vec<String>,
}

#[derive(Tabled)]
struct RoomRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Room")]
    name: String,
    #[tabled(rename = "Members")]
    members: String,
}

impl From<&RoomView> for RoomRow {
    fn from(r: &RoomView) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            members: r.members.join("\n"),
        }
    }
}

pub async fn handle(args: &RoomsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if !args.tree.exists() {
        return Err(CliError::NotFound {
            resource_type: "tree file".into(),
            identifier: args.tree.display().to_string(),
        });
    }
    let store = util::open_tree(&args.tree)?;

    let mut rooms = Vec::new();
    for id in store.ids_of_kind(ObjectKind::Enum) {
        let Some(object) = store.get_object(&id).await? else {
            continue;
        };
        rooms.push(RoomView {
            name: object.common.name.unwrap_or_else(|| id.clone()),
            members: object.common.members,
            id,
        });
    }

    let out = output::render_list(&global.output, &rooms, |r| RoomRow::from(r), |r| r.id.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
