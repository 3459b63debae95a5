//! Integration tests for the BLE provisioning flow.
//!
//! A simulated client connects to the advertised transport, writes JSON
//! commands and reads back the response records, exactly as the mobile
//! app does during first-time setup and later settings changes.

use serde_json::Value;
use smartbin::adapters::device_id::DeviceIdentity;
use smartbin::app::controller::DeviceController;
use smartbin::app::credentials::Credentials;
use smartbin::app::events::AppEvent;
use smartbin::app::ports::StoragePort;
use smartbin::config::{DEFAULT_API_BASE_URL, DEFAULT_SCALE_FACTORS, DeviceConfig, FIRMWARE_VERSION, keys};
use smartbin::fsm::StateId;
use smartbin::sensors::scale_store;

use crate::mock_hw::{LogSink, MockBoard, MockLoadCells, RawHandle, run_ticks};

const MAC: [u8; 6] = [0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC];
const RAW_EMPTY: i32 = 1000;

struct Session {
    ctrl: DeviceController<MockLoadCells>,
    board: MockBoard,
    sink: LogSink,
    raw: RawHandle,
}

impl Session {
    /// Fresh device, two load cells, client connected and greeted.
    fn open() -> Self {
        let cells = MockLoadCells::with_connected(2, RAW_EMPTY);
        let raw = cells.handle();
        let mut board = MockBoard::new();
        let mut sink = LogSink::new();
        let mut ctrl =
            DeviceController::new(cells, DeviceConfig::default(), DeviceIdentity::from_mac(MAC), &board);
        ctrl.init(&mut board, &mut sink).unwrap();
        run_ticks(&mut ctrl, &mut board, &mut sink, 1, 100);

        board.client_connect();
        run_ticks(&mut ctrl, &mut board, &mut sink, 1, 100);
        Self { ctrl, board, sink, raw }
    }

    fn send(&mut self, json: &str) -> Value {
        let before = self.board.responses.len();
        self.board.client_write(json);
        run_ticks(&mut self.ctrl, &mut self.board, &mut self.sink, 1, 100);
        assert_eq!(self.board.responses.len(), before + 1, "expected exactly one response");
        self.board.last_response().cloned().unwrap()
    }

    fn provision_wifi(&mut self) {
        let r = self.send(r#"{"command":"set_wifi","ssid":"HomeNet","password":"password123"}"#);
        assert_eq!(r["status"], "wifi_connected");
    }

    fn provision_api(&mut self) {
        let r = self.send(r#"{"command":"set_api","api_key":"key-123","api_url":"https://api.example.com"}"#);
        assert_eq!(r["status"], "api_connected");
    }
}

fn assert_error(response: &Value, message: &str) {
    assert_eq!(response["status"], "error");
    assert_eq!(response["message"], message);
}

// ── Session basics ────────────────────────────────────────────

#[test]
fn client_is_greeted_with_ready_record() {
    let s = Session::open();
    assert_eq!(s.board.responses.len(), 1);
    assert_eq!(s.board.responses[0]["status"], "ready");
    assert_eq!(s.board.responses[0]["message"], "Device ready for provisioning");
    assert!(s.ctrl.provisioning().is_client_connected());
}

#[test]
fn disconnect_resumes_advertising() {
    let mut s = Session::open();
    s.board.client_disconnect();
    run_ticks(&mut s.ctrl, &mut s.board, &mut s.sink, 1, 100);
    assert_eq!(s.board.advertise_calls, 1);
    assert!(!s.ctrl.provisioning().is_client_connected());
    assert!(s.ctrl.provisioning().is_active());
}

#[test]
fn malformed_and_unknown_commands_are_rejected() {
    let mut s = Session::open();
    assert_error(&s.send("{not json"), "Invalid JSON format");
    assert_error(&s.send(r#"{"command":"reboot"}"#), "Unknown command");
    assert_error(&s.send(r#"{"ssid":"x"}"#), "Unknown command");
    assert_eq!(s.sink.count(|e| matches!(e, AppEvent::CommandHandled { ok: false, .. })), 3);
}

#[test]
fn get_status_reports_device_info() {
    let mut s = Session::open();
    let r = s.send(r#"{"command":"get_status"}"#);
    assert_eq!(r["status"], "device_info");
    assert_eq!(r["device_name"], "SmartBin");
    assert_eq!(r["setup_complete"], false);
    assert_eq!(r["mac_address"], "00:11:22:AA:BB:CC");
    assert_eq!(r["wifi_connected"], false);
    assert_eq!(r["firmware_version"], FIRMWARE_VERSION);
    assert!(r.get("ip_address").is_none());

    s.provision_wifi();
    let r = s.send(r#"{"command":"get_status"}"#);
    assert_eq!(r["wifi_connected"], true);
    assert_eq!(r["ip_address"], "10.0.0.42");
}

#[test]
fn repeated_get_status_is_stable() {
    let mut s = Session::open();
    let first = s.send(r#"{"command":"get_status"}"#);
    let second = s.send(r#"{"command":"get_status"}"#);
    assert_eq!(first, second);
}

// ── WiFi ──────────────────────────────────────────────────────

#[test]
fn set_wifi_connects_and_persists() {
    let mut s = Session::open();
    let r = s.send(r#"{"command":"set_wifi","ssid":"HomeNet","password":"password123"}"#);
    assert_eq!(r["status"], "wifi_connected");
    assert_eq!(r["ip_address"], "10.0.0.42");

    let creds = Credentials::load(&s.board);
    assert_eq!(creds.wifi_ssid.as_str(), "HomeNet");
    assert_eq!(creds.wifi_password.as_str(), "password123");
}

#[test]
fn set_wifi_accepts_secret_alias_and_open_networks() {
    let mut s = Session::open();
    let r = s.send(r#"{"command":"set_wifi","ssid":"Cafe","secret":"password123"}"#);
    assert_eq!(r["status"], "wifi_connected");
    let r = s.send(r#"{"command":"set_wifi","ssid":"OpenNet"}"#);
    assert_eq!(r["status"], "wifi_connected");
    assert_eq!(Credentials::load(&s.board).wifi_password.as_str(), "");
}

#[test]
fn set_wifi_validates_input() {
    let mut s = Session::open();
    assert_error(&s.send(r#"{"command":"set_wifi","password":"password123"}"#), "SSID is required");
    let long_ssid = "x".repeat(33);
    assert_error(
        &s.send(&format!(r#"{{"command":"set_wifi","ssid":"{}"}}"#, long_ssid)),
        "SSID must be at most 32 bytes",
    );
    let long_password = "p".repeat(65);
    assert_error(
        &s.send(&format!(r#"{{"command":"set_wifi","ssid":"HomeNet","password":"{}"}}"#, long_password)),
        "Password must be at most 64 bytes",
    );
    assert!(s.board.connect_calls.is_empty());
}

#[test]
fn set_wifi_leaves_charset_and_short_secrets_to_the_access_point() {
    let mut s = Session::open();
    let r = s.send(r#"{"command":"set_wifi","ssid":"Café","password":"password123"}"#);
    assert_eq!(r["status"], "wifi_connected");
    let r = s.send(r#"{"command":"set_wifi","ssid":"HomeNet","password":"abcde"}"#);
    assert_eq!(r["status"], "wifi_connected");

    assert_eq!(s.board.connect_calls, vec!["Café".to_string(), "HomeNet".to_string()]);
    let creds = Credentials::load(&s.board);
    assert_eq!(creds.wifi_ssid.as_str(), "HomeNet");
    assert_eq!(creds.wifi_password.as_str(), "abcde");
}

#[test]
fn failed_test_connection_stores_nothing() {
    let mut s = Session::open();
    s.board.ap_reachable = false;
    let r = s.send(r#"{"command":"set_wifi","ssid":"HomeNet","password":"password123"}"#);
    assert_error(&r, "WiFi connection failed");
    assert!(!s.board.exists(keys::NAMESPACE, keys::WIFI_SSID));
}

// ── API ───────────────────────────────────────────────────────

#[test]
fn set_api_requires_wifi_first() {
    let mut s = Session::open();
    let r = s.send(r#"{"command":"set_api","api_key":"key-123"}"#);
    assert_error(&r, "WiFi must be connected before API setup");
    assert!(s.board.http_calls.is_empty());
}

#[test]
fn set_api_requires_key() {
    let mut s = Session::open();
    s.provision_wifi();
    assert_error(&s.send(r#"{"command":"set_api"}"#), "API key is required");
}

#[test]
fn set_api_verifies_and_persists() {
    let mut s = Session::open();
    s.provision_wifi();
    let r = s.send(r#"{"command":"set_api","api_key":"key-123","api_url":"https://api.example.com/"}"#);
    assert_eq!(r["status"], "api_connected");
    assert_eq!(r["device_id"], "smartbin_001122aabbcc");

    let call = s.board.http_calls.last().unwrap();
    assert_eq!(call.url, "https://api.example.com/health");
    assert_eq!(call.bearer, "key-123");

    let creds = Credentials::load(&s.board);
    assert_eq!(creds.api_key.as_str(), "key-123");
    assert_eq!(creds.device_id.as_str(), "smartbin_001122aabbcc");
}

#[test]
fn set_api_defaults_the_base_url() {
    let mut s = Session::open();
    s.provision_wifi();
    let r = s.send(r#"{"command":"set_api","api_key":"key-123"}"#);
    assert_eq!(r["status"], "api_connected");
    assert_eq!(s.board.http_calls.last().unwrap().url, format!("{}/health", DEFAULT_API_BASE_URL));
    assert_eq!(Credentials::load(&s.board).api_url.as_str(), DEFAULT_API_BASE_URL);
}

#[test]
fn rejected_api_key_is_not_stored() {
    let mut s = Session::open();
    s.provision_wifi();
    s.board.health_status = 403;
    let r = s.send(r#"{"command":"set_api","api_key":"bad-key"}"#);
    assert_error(&r, "API authentication failed");
    assert!(!s.board.exists(keys::NAMESPACE, keys::API_KEY));
}

// ── Setup completion ──────────────────────────────────────────

#[test]
fn complete_setup_requires_credentials() {
    let mut s = Session::open();
    assert_error(&s.send(r#"{"command":"complete_setup"}"#), "WiFi and API credentials required");
    s.provision_wifi();
    assert_error(&s.send(r#"{"command":"complete_setup"}"#), "WiFi and API credentials required");
    assert_eq!(s.ctrl.state(), StateId::Provisioning);
    assert!(!s.ctrl.provisioning().is_setup_complete());
}

#[test]
fn full_setup_hands_over_to_operating() {
    let mut s = Session::open();
    s.provision_wifi();
    s.provision_api();

    let r = s.send(r#"{"command":"complete_setup"}"#);
    assert_eq!(r["status"], "success");
    assert_eq!(r["message"], "Setup completed successfully");
    assert!(Credentials::load(&s.board).setup_complete);
    assert_eq!(s.ctrl.state(), StateId::Connecting);

    // The session winds down after the shutdown delay, then reopens in
    // settings mode once the device is operating.
    run_ticks(&mut s.ctrl, &mut s.board, &mut s.sink, 15, 100);
    assert_eq!(s.ctrl.state(), StateId::Operating);
    assert_eq!(s.board.stop_calls, 1);
    assert!(s.board.transport_running);
    assert_eq!(s.ctrl.provisioning().mode(), smartbin::provisioning::SessionMode::Settings);
    assert!(!s.board.submits().is_empty());
}

// ── Scale factors ─────────────────────────────────────────────

#[test]
fn get_all_scale_factors_lists_every_bin() {
    let mut s = Session::open();
    let r = s.send(r#"{"command":"get_all_scale_factors"}"#);
    assert_eq!(r["status"], "success");
    assert_eq!(r["connected_sensors"], 2);
    let factors = r["scale_factors"].as_array().unwrap();
    assert_eq!(factors.len(), 6);
    assert_eq!(factors[0]["scale_factor"], 140_400.0);
    assert_eq!(factors[0]["enabled"], true);
    assert_eq!(factors[5]["enabled"], false);
}

#[test]
fn set_scale_factor_persists_and_applies() {
    let mut s = Session::open();
    let r = s.send(r#"{"command":"set_scale_factor","bin_id":1,"scale_factor":2500}"#);
    assert_eq!(r["status"], "success");
    assert_eq!(r["bin_id"], 1);
    assert_eq!(scale_store::load(&s.board, 1), 2500.0);
    assert_eq!(s.ctrl.sensors().scale_factor(1), Some(2500.0));

    let r = s.send(r#"{"command":"get_scale_factor","bin_id":1}"#);
    assert_eq!(r["scale_factor"], 2500.0);
    assert_eq!(r["sensor_enabled"], true);
}

#[test]
fn set_scale_factor_validates_input() {
    let mut s = Session::open();
    assert_error(
        &s.send(r#"{"command":"set_scale_factor","bin_id":6,"scale_factor":2500}"#),
        "Invalid bin_id. Must be 0-5",
    );
    assert_error(
        &s.send(r#"{"command":"set_scale_factor","bin_id":-1,"scale_factor":2500}"#),
        "Invalid bin_id. Must be 0-5",
    );
    assert_error(
        &s.send(r#"{"command":"set_scale_factor","bin_id":1,"scale_factor":0}"#),
        "Invalid scale_factor. Must be between 0 and 100000",
    );
    assert_error(
        &s.send(r#"{"command":"set_scale_factor","bin_id":1,"scale_factor":100001}"#),
        "Invalid scale_factor. Must be between 0 and 100000",
    );
    // Rounds to exactly 100000 as f32, but is out of range as sent.
    assert_error(
        &s.send(r#"{"command":"set_scale_factor","bin_id":1,"scale_factor":100000.001}"#),
        "Invalid scale_factor. Must be between 0 and 100000",
    );
    assert_eq!(s.ctrl.sensors().scale_factor(1), Some(DEFAULT_SCALE_FACTORS[1]));
    assert_error(
        &s.send(r#"{"command":"set_scale_factor","bin_id":4,"scale_factor":2500}"#),
        "Sensor 4 is not enabled or detected",
    );
    assert_error(&s.send(r#"{"command":"set_scale_factor","bin_id":1}"#), "bin_id and scale_factor are required");
    assert!(!s.board.exists(keys::NAMESPACE, &scale_store::scale_key(1)));
}

#[test]
fn calibrate_sensor_derives_factor_from_known_weight() {
    let mut s = Session::open();
    // 5 kg at 2000 counts/kg on top of the tare captured at detection.
    s.raw.borrow_mut()[1] = RAW_EMPTY + 10_000;
    let r = s.send(r#"{"command":"calibrate_sensor","bin_id":1,"known_weight":5.0}"#);
    assert_eq!(r["status"], "success");
    assert_eq!(r["new_scale_factor"], 2000.0);
    assert_eq!(scale_store::load(&s.board, 1), 2000.0);
}

#[test]
fn calibrate_sensor_validates_input() {
    let mut s = Session::open();
    s.raw.borrow_mut()[1] = RAW_EMPTY + 10_000;
    for weight in ["0", "-5", "100.001", "101", "150"] {
        let r = s.send(&format!(r#"{{"command":"calibrate_sensor","bin_id":1,"known_weight":{}}}"#, weight));
        assert_error(&r, "Invalid known_weight. Must be between 0 and 100 kg");
        assert_eq!(s.ctrl.sensors().scale_factor(1), Some(DEFAULT_SCALE_FACTORS[1]));
        assert!(!s.board.exists(keys::NAMESPACE, &scale_store::scale_key(1)));
    }
    assert_error(
        &s.send(r#"{"command":"calibrate_sensor","bin_id":3,"known_weight":5}"#),
        "Sensor 3 is not enabled or detected",
    );
}

#[test]
fn calibrate_sensor_refuses_unloaded_cell() {
    let mut s = Session::open();
    // No load on the cell: the derived factor is zero and refused.
    let r = s.send(r#"{"command":"calibrate_sensor","bin_id":1,"known_weight":5}"#);
    assert_eq!(r["status"], "error");
    assert!(r["message"].as_str().unwrap().starts_with("Calibration failed"));
    assert_eq!(s.ctrl.sensors().scale_factor(1), Some(DEFAULT_SCALE_FACTORS[1]));
    assert!(!s.board.exists(keys::NAMESPACE, &scale_store::scale_key(1)));
}
