//! Device lifecycle tests: controller + FSM + services against the mock board.

use smartbin::adapters::device_id::DeviceIdentity;
use smartbin::app::controller::DeviceController;
use smartbin::app::events::AppEvent;
use smartbin::app::ports::{HttpError, HttpMethod};
use smartbin::config::DeviceConfig;
use smartbin::error::{Error, SensorError};
use smartbin::fsm::StateId;
use smartbin::provisioning::SessionMode;

use crate::mock_hw::{LogSink, MockBoard, MockLoadCells, run_ticks};

const MAC: [u8; 6] = [0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC];
const RAW_EMPTY: i32 = 1000;

fn identity() -> DeviceIdentity {
    DeviceIdentity::from_mac(MAC)
}

fn boot(
    mut board: MockBoard,
    cells: MockLoadCells,
    config: DeviceConfig,
) -> (DeviceController<MockLoadCells>, MockBoard, LogSink) {
    let mut sink = LogSink::new();
    let mut ctrl = DeviceController::new(cells, config, identity(), &board);
    ctrl.init(&mut board, &mut sink).unwrap();
    (ctrl, board, sink)
}

fn transitions(sink: &LogSink) -> Vec<(StateId, StateId)> {
    sink.events
        .iter()
        .filter_map(|e| match e {
            AppEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

/// Boot an already provisioned device and drive it into OPERATING.
fn operating() -> (DeviceController<MockLoadCells>, MockBoard, LogSink) {
    let (mut ctrl, mut board, mut sink) =
        boot(MockBoard::provisioned(), MockLoadCells::with_connected(2, RAW_EMPTY), DeviceConfig::default());
    run_ticks(&mut ctrl, &mut board, &mut sink, 5, 100);
    assert_eq!(ctrl.state(), StateId::Operating);
    (ctrl, board, sink)
}

// ── Startup ───────────────────────────────────────────────────

#[test]
fn fresh_device_starts_provisioning_and_advertises() {
    let (mut ctrl, mut board, mut sink) =
        boot(MockBoard::new(), MockLoadCells::with_connected(2, RAW_EMPTY), DeviceConfig::default());

    assert!(matches!(
        sink.events[0],
        AppEvent::Started { state: StateId::Provisioning, sensors: 2 }
    ));

    run_ticks(&mut ctrl, &mut board, &mut sink, 1, 100);
    assert_eq!(ctrl.state(), StateId::Provisioning);
    assert!(board.transport_running);
    assert_eq!(board.advertised_name.as_deref(), Some("SmartBin_AABBCC"));
    assert!(ctrl.provisioning().is_active());
    assert_eq!(ctrl.provisioning().mode(), SessionMode::Provisioning);
    assert!(board.connect_calls.is_empty());
}

#[test]
fn provisioned_device_skips_provisioning() {
    let (ctrl, board, sink) =
        boot(MockBoard::provisioned(), MockLoadCells::with_connected(1, RAW_EMPTY), DeviceConfig::default());
    assert_eq!(ctrl.state(), StateId::Connecting);
    assert!(matches!(sink.events[0], AppEvent::Started { state: StateId::Connecting, sensors: 1 }));
    assert!(!board.transport_running);
}

#[test]
fn too_few_sensors_fails_init() {
    let mut board = MockBoard::new();
    let mut sink = LogSink::new();
    let config = DeviceConfig { min_required_sensors: 2, ..DeviceConfig::default() };
    let mut ctrl =
        DeviceController::new(MockLoadCells::with_connected(1, RAW_EMPTY), config, identity(), &board);

    let err = ctrl.init(&mut board, &mut sink).unwrap_err();
    assert_eq!(err, Error::Hardware(SensorError::InsufficientSensors { found: 1, required: 2 }));
    assert!(sink.events.is_empty());
}

#[test]
fn simulation_mode_enables_every_bin_without_hardware() {
    let config = DeviceConfig { simulate_sensors: true, ..DeviceConfig::default() };
    let (ctrl, _board, sink) = boot(MockBoard::new(), MockLoadCells::with_connected(0, 0), config);
    assert!(matches!(sink.events[0], AppEvent::Started { sensors: 6, .. }));
    assert_eq!(ctrl.sensors().connected_sensor_count(), 6);
}

// ── Connect → authenticate → operate ──────────────────────────

#[test]
fn provisioned_device_reaches_operating_and_submits() {
    let (ctrl, board, sink) = operating();

    assert_eq!(
        transitions(&sink),
        vec![
            (StateId::Connecting, StateId::Authenticating),
            (StateId::Authenticating, StateId::Operating),
        ]
    );
    assert_eq!(board.connect_calls, vec!["HomeNet".to_string()]);
    assert!(ctrl.client().is_authenticated());

    let health = &board.http_calls[0];
    assert_eq!(health.method, HttpMethod::Get);
    assert_eq!(health.url, "https://api.example.com/health");
    assert_eq!(health.bearer, "key-123");

    let submits = board.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].url, "https://api.example.com/api/v1/sensor-data");
    let body = submits[0].body.as_ref().unwrap();
    assert_eq!(body["device_id"], "smartbin_001122aabbcc");
    let data = body["sensor_data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["bin_id"], 0);
    assert_eq!(data[1]["bin_id"], 1);
    assert_eq!(data[0]["unit"], "kg");
}

#[test]
fn polls_once_per_interval() {
    let (mut ctrl, mut board, mut sink) = operating();
    run_ticks(&mut ctrl, &mut board, &mut sink, 9, 100);
    assert_eq!(board.submits().len(), 1);
    run_ticks(&mut ctrl, &mut board, &mut sink, 1, 100);
    assert_eq!(board.submits().len(), 2);
}

#[test]
fn connect_attempt_events_report_progress() {
    let (_ctrl, _board, sink) = operating();
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::ConnectAttempt { attempt: 1, max: 3 })));
    assert_eq!(sink.count(|e| matches!(e, AppEvent::Authenticated)), 1);
}

#[test]
fn readings_reflect_load_on_the_cell() {
    let cells = MockLoadCells::with_connected(2, RAW_EMPTY);
    let raw = cells.handle();
    let (mut ctrl, mut board, mut sink) = boot(MockBoard::provisioned(), cells, DeviceConfig::default());
    // Bin 1 ships with 1000 counts/kg; 2.5 kg on top of the tare.
    raw.borrow_mut()[1] = RAW_EMPTY + 2500;
    run_ticks(&mut ctrl, &mut board, &mut sink, 5, 100);

    let reading = ctrl.sensors().reading(1).unwrap();
    assert!(reading.valid);
    assert!((reading.weight_kg - 2.5).abs() < 1e-3);

    let body = board.submits()[0].body.clone().unwrap();
    assert!((body["sensor_data"][1]["weight"].as_f64().unwrap() - 2.5).abs() < 1e-3);
}

#[test]
fn submit_failure_is_reported_but_keeps_operating() {
    let (mut ctrl, mut board, mut sink) = operating();
    board.submit_status = 500;
    run_ticks(&mut ctrl, &mut board, &mut sink, 10, 100);

    assert_eq!(ctrl.state(), StateId::Operating);
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::SubmitFailed(Error::Http(HttpError::Status(500))))));
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::Readings(r) if !r.submitted)));
}

#[test]
fn link_loss_returns_to_connecting_and_recovers() {
    let (mut ctrl, mut board, mut sink) = operating();
    board.connected = false;

    run_ticks(&mut ctrl, &mut board, &mut sink, 1, 100);
    assert_eq!(ctrl.state(), StateId::Connecting);
    assert!(!ctrl.client().is_authenticated());

    run_ticks(&mut ctrl, &mut board, &mut sink, 4, 100);
    assert_eq!(ctrl.state(), StateId::Operating);
    assert_eq!(board.connect_calls.len(), 2);
}

// ── Failure paths ─────────────────────────────────────────────

#[test]
fn unreachable_network_exhausts_retries_then_restarts() {
    let mut board = MockBoard::provisioned();
    board.ap_reachable = false;
    let (mut ctrl, mut board, mut sink) =
        boot(board, MockLoadCells::with_connected(1, RAW_EMPTY), DeviceConfig::default());

    run_ticks(&mut ctrl, &mut board, &mut sink, 4, 1000);
    assert_eq!(ctrl.state(), StateId::Error);
    assert_eq!(board.connect_calls.len(), 3);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConnectFailed(_))), 3);
    assert_eq!(board.restarts, 0);

    run_ticks(&mut ctrl, &mut board, &mut sink, 40, 1000);
    assert_eq!(board.restarts, 1);
    assert!(ctrl.is_restart_issued());
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::RestartRequested { reason: "error cooldown elapsed" })));
}

#[test]
fn rejected_api_key_leads_to_error() {
    let mut board = MockBoard::provisioned();
    board.health_status = 401;
    let (mut ctrl, mut board, mut sink) =
        boot(board, MockLoadCells::with_connected(1, RAW_EMPTY), DeviceConfig::default());

    run_ticks(&mut ctrl, &mut board, &mut sink, 4, 100);
    assert_eq!(ctrl.state(), StateId::Error);
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::AuthFailed(Error::Http(HttpError::Status(401))))));
    assert!(board.submits().is_empty());
}

#[test]
fn unreachable_backend_leads_to_error() {
    let mut board = MockBoard::provisioned();
    board.http_offline = true;
    let (mut ctrl, mut board, mut sink) =
        boot(board, MockLoadCells::with_connected(1, RAW_EMPTY), DeviceConfig::default());

    run_ticks(&mut ctrl, &mut board, &mut sink, 4, 100);
    assert_eq!(ctrl.state(), StateId::Error);
}

#[test]
fn provisioning_timeout_restarts_device() {
    let (mut ctrl, mut board, mut sink) =
        boot(MockBoard::new(), MockLoadCells::with_connected(1, RAW_EMPTY), DeviceConfig::default());

    run_ticks(&mut ctrl, &mut board, &mut sink, 29, 10_000);
    assert_eq!(board.restarts, 0);

    run_ticks(&mut ctrl, &mut board, &mut sink, 3, 10_000);
    assert_eq!(board.restarts, 1);
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::RestartRequested { reason: "provisioning timeout" })));

    // Nothing runs after the restart was issued.
    let seen = sink.events.len();
    run_ticks(&mut ctrl, &mut board, &mut sink, 5, 10_000);
    assert_eq!(sink.events.len(), seen);
}

// ── Settings session ──────────────────────────────────────────

#[test]
fn operating_opens_settings_session() {
    let (ctrl, board, _sink) = operating();
    assert!(ctrl.provisioning().is_active());
    assert_eq!(ctrl.provisioning().mode(), SessionMode::Settings);
    assert!(board.transport_running);
}

#[test]
fn status_is_streamed_to_a_settings_client() {
    let (mut ctrl, mut board, mut sink) = operating();
    board.client_connect();
    run_ticks(&mut ctrl, &mut board, &mut sink, 10, 100);

    assert_eq!(board.responses[0]["status"], "ready");
    let status = board.statuses.last().unwrap();
    assert_eq!(status["type"], "device_status");
    assert_eq!(status["wifi_status"], "connected");
    assert_eq!(status["api_status"], "authenticated");
    assert_eq!(status["sensor_status"], "reading");
    assert_eq!(status["ble_status"], "active");
}
