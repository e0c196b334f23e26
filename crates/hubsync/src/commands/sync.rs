//! `hubsync sync`: replay a recorded hub session through the engine.
//!
//! The recording's devices back a replay hub; the engine runs its normal
//! loop against an in-memory tree (optionally seeded from `--tree`), the
//! scripted events are played once the first pass completes, and the
//! resulting tree is written back and listed.

use std::sync::Arc;
use std::time::Duration;

use hubsync_api::{Device, ReplayHub, ReplaySnapshot};
use hubsync_config::ConfigError;
use hubsync_core::{Engine, EngineStatus, HubSettings, MemoryStore, ObjectKind, TreeObject};
use serde::Serialize;
use tabled::Tabled;
use tracing::{debug, info};

use crate::cli::{GlobalOpts, NodeKindFilter, SyncArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct NodeView {
    id: String,
    kind: ObjectKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ack: Option<bool>,
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl NodeView {
    fn row(&self, color: bool) -> NodeRow {
        NodeRow {
            id: self.id.clone(),
            kind: output::paint_kind(&self.kind.to_string(), color),
            role: self.role.clone().unwrap_or_default(),
            value: self.value.as_ref().map(ToString::to_string).unwrap_or_default(),
        }
    }
}

fn matches_kind(kind: ObjectKind, filter: Option<NodeKindFilter>) -> bool {
    match filter {
        None => true,
        Some(NodeKindFilter::Device) => kind == ObjectKind::Device,
        Some(NodeKindFilter::Channel) => kind == ObjectKind::Channel,
        Some(NodeKindFilter::State) => kind == ObjectKind::State,
        Some(NodeKindFilter::Enum) => kind == ObjectKind::Enum,
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: SyncArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let text = std::fs::read_to_string(&args.snapshot)?;
    let snapshot = ReplaySnapshot::from_json(&text)?;
    let config = util::engine_config(global)?;

    let store = Arc::new(match &args.tree {
        Some(path) => util::open_tree(path)?,
        None => MemoryStore::new(),
    });

    let hub = replay_hub(snapshot.devices, &config.hub)?;
    let (engine, handle) = Engine::new(config, Arc::new(hub.clone()), Arc::clone(&store));
    let task = tokio::spawn(engine.run());

    match tokio::time::timeout(Duration::from_secs(args.timeout), handle.wait_initialized()).await
    {
        Ok(result) => result?,
        Err(_) => {
            handle.shutdown();
            return Err(CliError::Timeout {
                seconds: args.timeout,
            });
        }
    }

    for event in &snapshot.events {
        hub.play(event);
        // Round-trip through the command queue so the event is handled
        // before the next one is played.
        handle.status().await?;
    }
    let status: EngineStatus = handle.status().await?;
    debug!(?status, "replay finished");

    handle.shutdown();
    task.await.map_err(|e| CliError::Engine {
        message: e.to_string(),
    })??;

    if let Some(path) = &args.tree {
        util::save_tree(&store, path)?;
        info!(path = %path.display(), nodes = store.len(), "tree written");
    }

    let nodes = collect_nodes(&store, args.kind);
    let color = output::should_color(&global.color);
    let out = output::render_list(&global.output, &nodes, |n| n.row(color), |n| n.id.clone())?;
    output::print_output(&out, global.quiet);

    if !global.quiet {
        eprintln!(
            "{} {} nodes, {} known paths, {} events replayed",
            output::success_mark(color),
            nodes.len(),
            status.known_paths,
            snapshot.events.len()
        );
    }
    Ok(())
}

/// Replay hub for the recorded devices, registered with the configured client.
///
/// A configured client id needs a client secret to finish the code exchange.
fn replay_hub(devices: Vec<Device>, settings: &HubSettings) -> Result<ReplayHub, CliError> {
    let hub = ReplayHub::new(devices);
    let Some(client_id) = settings.client_id.as_deref() else {
        return Ok(hub);
    };
    if settings.client_secret.is_none() {
        return Err(ConfigError::NoCredentials.into());
    }
    debug!(client_id, redirect_host = ?settings.redirect_host, "registering hub client");
    Ok(hub.with_client(client_id, settings.redirect_host.as_deref())?)
}

fn collect_nodes(store: &MemoryStore, filter: Option<NodeKindFilter>) -> Vec<NodeView> {
    let mut tree = store.export();
    tree.objects
        .into_iter()
        .filter(|(_, object)| matches_kind(object.kind, filter))
        .map(|(id, object)| {
            let TreeObject { kind, common, .. } = object;
            let state = tree.states.remove(&id);
            NodeView {
                id,
                kind,
                name: common.name,
                role: common.role,
                value: state.as_ref().map(|s| s.val.clone()),
                ack: state.map(|s| s.ack),
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hubsync_api::HubClient;
    use secrecy::SecretString;

    use crate::error::exit_code;

    fn settings(client_id: Option<&str>, secret: Option<&str>) -> HubSettings {
        HubSettings {
            redirect_host: Some("hub.local".into()),
            client_id: client_id.map(String::from),
            client_secret: secret.map(|s| SecretString::from(s.to_owned())),
        }
    }

    #[test]
    fn configured_client_reaches_authorization_uri() {
        let hub = replay_hub(Vec::new(), &settings(Some("61768662"), Some("s3cret"))).unwrap();
        let uri = hub.authorization_uri().unwrap();
        assert!(uri.as_str().contains("client_id=61768662"));
        assert!(uri.as_str().contains("redirect_uri="));
    }

    #[test]
    fn client_without_secret_is_refused() {
        let err = replay_hub(Vec::new(), &settings(Some("61768662"), None)).unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::NoCredentials)));
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn no_client_keeps_default_authorization() {
        let hub = replay_hub(Vec::new(), &settings(None, None)).unwrap();
        assert!(hub.authorization_uri().unwrap().as_str().contains("client_id=hubsync"));
    }
}
