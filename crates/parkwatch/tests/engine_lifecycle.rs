//! End-to-end engine behavior against a fake remote channel served over HTTP.

use std::sync::Arc;
use std::time::Duration;

use parkwatch::{ChannelConfig, CommandError, Engine, EngineConfig, HttpChannel, SlotId, SyncHealth};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine_for(server: &MockServer) -> Engine {
    let config = ChannelConfig::new(&server.uri(), "2962592", "WRITEKEY");
    let channel = HttpChannel::new(config).unwrap();
    let engine_config = EngineConfig {
        expiry_interval: Duration::from_millis(10),
        poll_interval: Duration::from_secs(60),
        ..EngineConfig::default()
    };
    Engine::new(engine_config, Arc::new(channel)).unwrap()
}

async fn mount_feed(server: &MockServer, feeds: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/channels/2962592/feeds.json"))
        .and(query_param("results", "10"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "feeds": feeds })),
        )
        .mount(server)
        .await;
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn startup_poll_reconstructs_remote_occupancy() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        serde_json::json!([
            {"created_at": "2025-05-01T10:00:00Z", "entry_id": 1, "field1": "100", "field2": "100", "field3": "0"},
            {"created_at": "2025-05-01T10:00:15Z", "entry_id": 2, "field1": "", "field2": "0", "field3": null},
            {"created_at": "2025-05-01T10:00:30Z", "entry_id": 3, "field1": "", "field2": "", "field3": ""}
        ]),
    )
    .await;

    let engine = engine_for(&server);
    engine.start();
    wait_until(|| engine.snapshots().sync_status().last_synced_at.is_some()).await;
    engine.stop().await;

    let slots = engine.snapshots().current_slots();
    let reserved: Vec<bool> = slots.iter().map(|s| s.is_reserved()).collect();
    assert_eq!(reserved, vec![true, false, false]);

    let snapshot = engine.snapshots().snapshot();
    assert_eq!(snapshot.available, 2);
    assert_eq!(snapshot.sync.health(), SyncHealth::Synced);

    let history = engine.snapshots().recent_observations(10);
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].entry_id, Some(3));
    assert_eq!(history[0].field(1), Some("100"));
}

#[tokio::test]
async fn reservation_is_written_and_expires_locally() {
    let server = MockServer::start().await;
    mount_feed(&server, serde_json::json!([])).await;

    Mock::given(method("GET"))
        .and(path("/update"))
        .and(query_param("api_key", "WRITEKEY"))
        .and(query_param("field2", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_string("41"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    let slot = engine.commands().reserve(SlotId::new(2), 15).unwrap();
    assert!(slot.is_reserved());

    wait_until(|| engine.snapshots().sync_status().last_write_at.is_some()).await;
    let status = engine.snapshots().sync_status();
    assert_eq!(status.pending_writes, 0);
    assert!(status.error.is_none());

    assert_eq!(
        engine.commands().reserve(SlotId::new(99), 30).unwrap_err(),
        CommandError::UnknownSlot(SlotId::new(99))
    );
    assert_eq!(
        engine.commands().reserve(SlotId::new(1), 0).unwrap_err(),
        CommandError::InvalidDuration(0)
    );

    server.verify().await;
}

#[tokio::test]
async fn unreachable_remote_degrades_without_losing_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/2962592/feeds.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/update"))
        .respond_with(ResponseTemplate::new(200).set_body_string("0"))
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    engine.commands().reserve(SlotId::new(3), 60).unwrap();

    wait_until(|| engine.snapshots().sync_status().pending_writes == 0).await;
    let err = engine.poll_once().await.unwrap_err();
    assert_eq!(err.to_string(), "remote channel returned HTTP 500");

    let status = engine.snapshots().sync_status();
    assert_eq!(status.health(), SyncHealth::Degraded);
    assert!(!status.loading);
    assert!(
        engine
            .snapshots()
            .slot(SlotId::new(3))
            .unwrap()
            .is_reserved()
    );
}
