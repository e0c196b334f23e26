#![allow(clippy::unwrap_used)]

// Engine behavior end to end: a replay hub, an in-memory tree and the real
// run loop.

use std::sync::Arc;
use std::time::Duration;

use hubsync_api::{Capability, Device, HubEvent, Link, Location, ReplayHub, State};
use hubsync_core::{
    Engine, EngineConfig, EngineHandle, MemoryStore, ObjectStore, TreeObject, WatchdogPhase,
    room_enum_id,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::task::JoinHandle;

const SWITCH: &str = "hubsync.0.Hall.Lamp.Switch.OnState";

fn lamp() -> Device {
    Device {
        id: "d1".into(),
        name: "Lamp".into(),
        device_type: "PSS".into(),
        location: Some(Location {
            id: "l1".into(),
            name: "Hall".into(),
        }),
        capabilities: vec![Capability {
            id: "c1".into(),
            device: Link::Device("d1".into()),
            config_name: Some("Switch".into()),
            states: vec![State::new("onState", false)],
        }],
        states: vec![],
    }
}

fn empty_remote() -> Device {
    Device {
        id: "d2".into(),
        name: "Remote".into(),
        device_type: "ISR2".into(),
        location: Some(Location {
            id: "l1".into(),
            name: "Hall".into(),
        }),
        capabilities: vec![Capability {
            id: "c2".into(),
            device: Link::Device("d2".into()),
            config_name: Some("Buttons".into()),
            states: vec![],
        }],
        states: vec![State::new("serialNumber", "914110000123")],
    }
}

fn spawn(
    hub: &ReplayHub,
    store: &Arc<MemoryStore>,
) -> (EngineHandle, JoinHandle<Result<(), hubsync_core::CoreError>>) {
    let (engine, handle) = Engine::new(
        EngineConfig::default(),
        Arc::new(hub.clone()),
        Arc::clone(store),
    );
    (handle, tokio::spawn(engine.run()))
}

async fn shutdown(handle: EngineHandle, task: JoinHandle<Result<(), hubsync_core::CoreError>>) {
    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn buffered_value_is_written_exactly_once() {
    let hub = ReplayHub::new(vec![lamp()]).unauthorized();
    let store = Arc::new(MemoryStore::new());
    let mut writes = store.subscribe_states();
    let (handle, task) = spawn(&hub, &store);

    // Not initialized: the hub asked for authorization instead.
    let status = handle.status().await.unwrap();
    assert!(!status.initialized);
    assert!(!status.connected);

    hub.push_state("c1", "onState", json!(true));
    assert_eq!(handle.status().await.unwrap().pending, 1);

    let auth = handle.start_auth().await.unwrap();
    assert!(auth.uri.starts_with("https://"));
    hub.complete_authorization();

    tokio::time::timeout(Duration::from_secs(5), handle.wait_initialized())
        .await
        .unwrap()
        .unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.pending, 0);
    assert!(status.connected);
    assert_eq!(hub.init_calls(), 2);

    let mut switch_writes = Vec::new();
    while let Ok(change) = writes.try_recv() {
        if change.id == SWITCH {
            switch_writes.push(change.state);
        }
    }
    assert_eq!(switch_writes.len(), 1);
    assert_eq!(switch_writes[0].val, json!(true));
    assert!(switch_writes[0].ack);

    shutdown(handle, task).await;
}

#[tokio::test]
async fn acknowledged_writes_never_reach_the_hub() {
    let hub = ReplayHub::new(vec![lamp()]);
    let store = Arc::new(MemoryStore::new());
    let (handle, task) = spawn(&hub, &store);
    handle.wait_initialized().await.unwrap();

    store.set_state(SWITCH, json!(true), true).await.unwrap();
    handle.status().await.unwrap();
    assert!(hub.writes().is_empty());

    // A user write goes out once; the hub's echo comes back acknowledged
    // and is not forwarded again.
    store.set_state(SWITCH, json!(true), false).await.unwrap();
    handle.status().await.unwrap();
    handle.status().await.unwrap();
    assert_eq!(hub.writes().len(), 1);

    let state = store.get_state(SWITCH).await.unwrap().unwrap();
    assert!(state.ack);
    assert_eq!(state.val, json!(true));

    shutdown(handle, task).await;
}

#[tokio::test]
async fn room_membership_is_only_ever_added() {
    let hub = ReplayHub::new(vec![lamp()]);
    let store = Arc::new(MemoryStore::new());
    store
        .set_object(&room_enum_id("Hall"), TreeObject::room("Hall", vec!["X.A".into()]))
        .await
        .unwrap();

    let (handle, task) = spawn(&hub, &store);
    handle.wait_initialized().await.unwrap();
    handle.resync().await.unwrap();

    let room = store.get_object("enum.rooms.hall").await.unwrap().unwrap();
    assert_eq!(room.common.members, vec!["X.A", "hubsync.0.Hall.Lamp.Switch"]);

    shutdown(handle, task).await;
}

#[tokio::test]
async fn device_without_states_produces_no_nodes() {
    let hub = ReplayHub::new(vec![lamp(), empty_remote()]);
    let store = Arc::new(MemoryStore::new());
    let (handle, task) = spawn(&hub, &store);
    handle.wait_initialized().await.unwrap();

    let summary = handle.resync().await.unwrap();
    assert_eq!(summary.devices, 2);
    assert_eq!(summary.skipped, 1);
    assert!(
        store
            .export()
            .objects
            .keys()
            .all(|id| !id.contains("Remote"))
    );

    shutdown(handle, task).await;
}

#[tokio::test]
async fn live_update_for_new_capability_reconciles_device() {
    let hub = ReplayHub::new(vec![lamp()]);
    let store = Arc::new(MemoryStore::new());
    let (handle, task) = spawn(&hub, &store);
    handle.wait_initialized().await.unwrap();

    let mut device = lamp();
    device.capabilities.push(Capability {
        id: "c9".into(),
        device: Link::Device("d1".into()),
        config_name: Some("Power Meter".into()),
        states: vec![State::new("powerConsumptionWatt", 12.5)],
    });
    hub.upsert_device(device);
    hub.push_state("c9", "powerConsumptionWatt", json!(13.0));
    handle.status().await.unwrap();

    let value = store
        .get_state("hubsync.0.Hall.Lamp.Power-Meter.PowerConsumptionWatt")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value.val, json!(13.0));
    assert!(store.get_state("hubsync.0.info.lastEvent").await.unwrap().is_some());

    shutdown(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn watchdog_reconnects_once_after_grace() {
    let hub = ReplayHub::new(vec![lamp()]);
    let store = Arc::new(MemoryStore::new());
    let (handle, task) = spawn(&hub, &store);
    handle.wait_initialized().await.unwrap();

    hub.emit(HubEvent::Close);
    handle.status().await.unwrap();
    assert!(!handle.is_connected());

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(handle.status().await.unwrap().watchdog, WatchdogPhase::Grace);
    assert_eq!(hub.init_calls(), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    handle.status().await.unwrap();
    assert_eq!(hub.init_calls(), 2);
    assert!(handle.is_connected());

    shutdown(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn watchdog_stands_down_when_hub_recovers() {
    let hub = ReplayHub::new(vec![lamp()]);
    let store = Arc::new(MemoryStore::new());
    let (handle, task) = spawn(&hub, &store);
    handle.wait_initialized().await.unwrap();

    hub.emit(HubEvent::Close);
    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(handle.status().await.unwrap().watchdog, WatchdogPhase::Grace);

    hub.emit(HubEvent::Open);
    handle.status().await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.watchdog, WatchdogPhase::Armed);
    assert_eq!(hub.init_calls(), 1);

    shutdown(handle, task).await;
}
