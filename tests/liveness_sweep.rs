mod common;

use chrono::{Duration as Delta, Utc};
use common::{fast_link, store, wait_until, REFERENCE_PACKET};
use relaytwin::device::DeviceSet;
use relaytwin::link::{
    LineSink, LinkSettings, MockConnector, MockTransport, SerialLink, TelemetryIngest,
    TransportSlot,
};
use relaytwin::protocol::parse_telemetry;
use relaytwin::store::{DeviceStore, StoreSettings};
use std::sync::Arc;
use std::time::Duration;

fn stale_store() -> Arc<DeviceStore> {
    let store = store();
    let record = parse_telemetry(REFERENCE_PACKET, store.devices()).unwrap();
    store
        .apply_at(&record, Utc::now() - Delta::seconds(11))
        .unwrap();
    assert!(store.state("R2").unwrap().connected);
    store
}

#[test]
fn ingest_tick_drops_silent_robots() {
    let store = store();
    let ingest = TelemetryIngest::new(store.clone());
    let record = parse_telemetry(REFERENCE_PACKET, store.devices()).unwrap();
    let seen = Utc::now() - Delta::seconds(11);
    store.apply_at(&record, seen).unwrap();
    assert!(store.state("R2").unwrap().connected);

    ingest.on_tick(Utc::now());
    let r2 = store.state("R2").unwrap();
    assert!(!r2.connected);
    // disconnect keeps the last reported values
    assert_eq!(r2.speed, 200);
    assert_eq!(r2.last_seen, Some(seen));
}

#[test]
fn recent_robots_stay_connected() {
    let store = store();
    let ingest = TelemetryIngest::new(store.clone());
    let record = parse_telemetry(REFERENCE_PACKET, store.devices()).unwrap();
    store
        .apply_at(&record, Utc::now() - Delta::milliseconds(9_900))
        .unwrap();
    ingest.on_tick(Utc::now());
    assert!(store.state("R2").unwrap().connected);
}

#[test]
fn configured_window_is_honoured() {
    let settings = StoreSettings {
        liveness_timeout: Duration::from_secs(2),
        ..StoreSettings::default()
    };
    let store = DeviceStore::new(DeviceSet::new(["R1", "R2"]), settings);
    let record = parse_telemetry(REFERENCE_PACKET, store.devices()).unwrap();
    let t0 = Utc::now();
    store.apply_at(&record, t0).unwrap();
    assert!(store.sweep_liveness(t0 + Delta::seconds(2)).is_empty());
    let dropped = store.sweep_liveness(t0 + Delta::milliseconds(2_001));
    assert_eq!(dropped.iter().map(|d| d.as_str()).collect::<Vec<_>>(), ["R2"]);
}

#[tokio::test]
async fn idle_link_still_sweeps() {
    let store = stale_store();
    let mock = MockTransport::new("mock0");
    let slot = TransportSlot::new();
    let link = SerialLink::new(
        Box::new(MockConnector::new(mock)),
        slot.clone(),
        Arc::new(TelemetryIngest::new(store.clone())),
        fast_link(),
    );
    tokio::spawn(link.run());

    assert!(wait_until(|| slot.is_open(), Duration::from_secs(2)).await);
    assert!(
        wait_until(
            || !store.state("R2").unwrap().connected,
            Duration::from_secs(2)
        )
        .await
    );
    assert!(slot.is_open());
}

#[tokio::test]
async fn sweeps_continue_during_reconnect_backoff() {
    let store = stale_store();
    let connector = MockConnector::new(MockTransport::new("mock0"));
    connector.set_available(false);
    let slot = TransportSlot::new();
    let settings = LinkSettings {
        reconnect_backoff: Duration::from_secs(5),
        ..fast_link()
    };
    let link = SerialLink::new(
        Box::new(connector),
        slot.clone(),
        Arc::new(TelemetryIngest::new(store.clone())),
        settings,
    );
    tokio::spawn(link.run());

    // well inside the first backoff window
    assert!(
        wait_until(
            || !store.state("R2").unwrap().connected,
            Duration::from_secs(2)
        )
        .await
    );
    assert!(!slot.is_open());
}
