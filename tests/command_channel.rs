mod common;

use common::store;
use relaytwin::api::{CommandRequest, TelemetryApi};
use relaytwin::link::{CommandChannel, MockTransport, TransportSlot};
use relaytwin::TwinError;
use std::time::{Duration, Instant};

#[tokio::test]
async fn broadcast_goes_out_in_order_with_gap() {
    let store = store();
    let slot = TransportSlot::new();
    let mock = MockTransport::new("mock0");
    slot.install(Box::new(mock.clone()));
    let commands =
        CommandChannel::new(store.clone(), slot).with_broadcast_gap(Duration::from_millis(20));

    let started = Instant::now();
    commands.start_all().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(40));

    assert_eq!(mock.written_text(), "R1:START\nR2:START\nR3:START\n");
    for id in ["R1", "R2", "R3"] {
        let messages = store.state(id).unwrap().messages.to_vec();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "[CMD] START");
    }
}

#[tokio::test]
async fn broadcast_stops_when_link_drops() {
    let store = store();
    let slot = TransportSlot::new();
    let commands = CommandChannel::new(store.clone(), slot);
    let err = commands.broadcast("STOP").await.unwrap_err();
    assert!(matches!(err, TwinError::TransportUnavailable));
    assert!(store.state("R1").unwrap().messages.is_empty());
}

#[test]
fn api_boundary_round_trip() {
    let store = store();
    let slot = TransportSlot::new();
    let mock = MockTransport::new("mock0");
    let api = TelemetryApi::new(
        store.clone(),
        CommandChannel::new(store.clone(), slot.clone()),
        slot.clone(),
    );

    let req = CommandRequest {
        device: "R3".into(),
        command: "TURN LEFT".into(),
    };
    assert_eq!(api.command(&req).unwrap_err().status, 503);

    slot.install(Box::new(mock.clone()));
    let resp = api.command(&req).unwrap();
    assert_eq!(resp.sent, "R3:TURN LEFT");
    assert_eq!(mock.written(), b"R3:TURN LEFT\n".to_vec());

    api.stop("R1").unwrap();
    assert!(mock.written_text().ends_with("R1:STOP\n"));
    assert_eq!(api.start("R4").unwrap_err().status, 404);

    let snap = api.device("R3").unwrap();
    assert_eq!(snap.messages.last().unwrap().text, "[CMD] TURN LEFT");
}

#[test]
fn concurrent_senders_never_interleave_lines() {
    let store = store();
    let slot = TransportSlot::new();
    let mock = MockTransport::new("mock0");
    slot.install(Box::new(mock.clone()));
    let commands = CommandChannel::new(store, slot);

    let handles: Vec<_> = ["R1", "R2", "R3"]
        .into_iter()
        .map(|id| {
            let commands = commands.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    commands.send(id, &format!("PING {i}")).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let text = mock.written_text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 150);
    for line in lines {
        let (id, rest) = line.split_once(':').unwrap();
        assert!(["R1", "R2", "R3"].contains(&id));
        assert!(rest.starts_with("PING "));
    }
}
