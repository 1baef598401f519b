mod common;

use common::{fast_link, wait_until};
use relaytwin::api::{CalibrationSignal, DebugApi};
use relaytwin::calibration::{DebugState, ADC_MAX};
use relaytwin::link::{CommandChannel, MockConnector, MockTransport, SerialLink, TransportSlot};
use relaytwin::protocol::SENSOR_COUNT;
use std::sync::Arc;
use std::time::Duration;

struct Rig {
    api: DebugApi,
    state: Arc<DebugState>,
    mock: MockTransport,
}

async fn rig() -> Rig {
    let state = Arc::new(DebugState::new());
    let mock = MockTransport::new("/dev/ttyACM0");
    let slot = TransportSlot::new();
    let link = SerialLink::new(
        Box::new(MockConnector::new(mock.clone())),
        slot.clone(),
        state.clone(),
        fast_link(),
    );
    tokio::spawn(link.run());
    assert!(wait_until(|| slot.is_open(), Duration::from_secs(2)).await);
    Rig {
        api: DebugApi::new(state.clone(), CommandChannel::raw(slot)),
        state,
        mock,
    }
}

#[tokio::test]
async fn calibration_session_over_the_link() {
    let rig = rig().await;
    assert!(rig.api.snapshot().link.serial_connected);

    rig.api.calibration(CalibrationSignal::Start, "l");
    assert_eq!(rig.mock.written_text(), "l");

    rig.mock.push_inbound(b"  S0 (A0): 500\n  S0 (A0): 520\n  S0 (A0): 480\n");
    rig.mock.push_inbound(b"RAW:600,610,620,630,640,650,660,670\n");
    assert!(
        wait_until(
            || rig.state.snapshot().frame.raw_line.starts_with("RAW:"),
            Duration::from_secs(2)
        )
        .await
    );

    let stopped = rig.api.calibration(CalibrationSignal::Stop, "l");
    let cal = stopped.calibration.unwrap();
    assert_eq!((cal.min[0], cal.max[0]), (480, 600));
    assert_eq!((cal.min[7], cal.max[7]), (670, 670));

    // frozen after stop
    rig.mock.push_inbound(b"RAW:1,1,1,1,1,1,1,1\n");
    assert!(
        wait_until(
            || rig.state.snapshot().frame.sensors[0] == 1,
            Duration::from_secs(2)
        )
        .await
    );
    let code = rig.api.calibration_code();
    assert_eq!(code.min[0], 480);
    assert!(code
        .code
        .contains("static int sensorMin[LINE_SENSOR_COUNT] = {480, 610, 620, 630, 640, 650, 660, 670};"));

    rig.api.calibration(CalibrationSignal::Reset, "l");
    let snap = rig.api.snapshot();
    assert!(!snap.calibration.active);
    assert_eq!(snap.calibration.min, [ADC_MAX; SENSOR_COUNT]);
    assert_eq!(snap.calibration.max, [0; SENSOR_COUNT]);
}

#[tokio::test]
async fn pid_frames_update_the_mode() {
    let rig = rig().await;
    rig.mock
        .push_inbound(b"pos=4200 err=700 L=110 R=190\nSHARP pos=6800 RIGHT L=200 R=-200\n");
    assert!(
        wait_until(
            || rig.state.snapshot().frame.position == 6800,
            Duration::from_secs(2)
        )
        .await
    );
    let frame = rig.state.snapshot().frame;
    assert_eq!(frame.mode.to_string(), "SHARP RIGHT");
    assert_eq!(frame.error, 700);
    assert_eq!((frame.left_speed, frame.right_speed), (200, -200));

    rig.mock.push_inbound(b"LOST! Spinning LEFT\n");
    assert!(
        wait_until(
            || rig.state.snapshot().frame.mode.to_string() == "LOST LEFT",
            Duration::from_secs(2)
        )
        .await
    );
}

#[tokio::test]
async fn keepalive_only_while_calibrating() {
    let rig = rig().await;
    tokio::spawn(
        rig.api
            .clone()
            .keepalive("l".to_string(), Duration::from_millis(10)),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rig.mock.written().is_empty());

    rig.state.start_calibration();
    assert!(
        wait_until(
            || rig.mock.written().len() >= 2,
            Duration::from_secs(2)
        )
        .await
    );
    rig.state.stop_calibration();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let after_stop = rig.mock.written().len();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(rig.mock.written().len(), after_stop);
}
