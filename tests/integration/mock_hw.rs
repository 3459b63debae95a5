//! Mock board for integration tests.
//!
//! One struct implements every device port plus `DelayNs`, backed by a
//! manual clock so tests control time exactly.  Every outbound call is
//! recorded so tests can assert on the full history without a radio.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use serde_json::Value;
use smartbin::app::controller::DeviceController;
use smartbin::app::credentials;
use smartbin::app::events::AppEvent;
use smartbin::app::ports::{
    ClockPort, ConnectivityError, ConnectivityPort, EventSink, HttpError, HttpMethod, HttpPort,
    HttpRequest, LoadCellPort, ProvisioningTransport, StorageError, StoragePort, SystemPort,
    TransportError, TransportEvent,
};
use smartbin::config::MAX_BINS;
use smartbin::error::SensorError;

pub const MOCK_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 42);

// ── HTTP call record ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: HttpMethod,
    pub url: String,
    pub bearer: String,
    pub body: Option<Value>,
}

// ── MockBoard ─────────────────────────────────────────────────

pub struct MockBoard {
    now_ns: u64,
    store: HashMap<String, Vec<u8>>,

    // WiFi
    pub ap_reachable: bool,
    pub connected: bool,
    pub connect_calls: Vec<String>,

    // HTTP
    pub health_status: u16,
    pub submit_status: u16,
    pub http_offline: bool,
    pub http_calls: Vec<HttpCall>,

    // BLE
    pub advertised_name: Option<String>,
    pub transport_running: bool,
    pub client: bool,
    pub advertise_calls: u32,
    pub stop_calls: u32,
    events: VecDeque<TransportEvent>,
    pub responses: Vec<Value>,
    pub statuses: Vec<Value>,

    pub restarts: u32,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new() -> Self {
        Self {
            now_ns: 0,
            store: HashMap::new(),
            ap_reachable: true,
            connected: false,
            connect_calls: Vec::new(),
            health_status: 200,
            submit_status: 201,
            http_offline: false,
            http_calls: Vec::new(),
            advertised_name: None,
            transport_running: false,
            client: false,
            advertise_calls: 0,
            stop_calls: 0,
            events: VecDeque::new(),
            responses: Vec::new(),
            statuses: Vec::new(),
            restarts: 0,
        }
    }

    /// A board whose storage already holds a finished setup.
    pub fn provisioned() -> Self {
        let mut board = Self::new();
        credentials::store_wifi(&mut board, "HomeNet", "password123").unwrap();
        credentials::store_api(&mut board, "key-123", "https://api.example.com", "smartbin_001122aabbcc")
            .unwrap();
        credentials::mark_setup_complete(&mut board).unwrap();
        board
    }

    pub fn advance(&mut self, ms: u64) {
        self.now_ns += ms * 1_000_000;
    }

    // ── BLE client simulation ────────────────────────────────

    pub fn client_connect(&mut self) {
        assert!(self.transport_running, "client connect while transport is down");
        self.client = true;
        self.events.push_back(TransportEvent::Connected);
    }

    pub fn client_disconnect(&mut self) {
        self.client = false;
        self.events.push_back(TransportEvent::Disconnected);
    }

    pub fn client_write(&mut self, json: &str) {
        self.events.push_back(TransportEvent::CommandReceived(json.as_bytes().to_vec()));
    }

    pub fn last_response(&self) -> Option<&Value> {
        self.responses.last()
    }

    pub fn submits(&self) -> Vec<&HttpCall> {
        self.http_calls.iter().filter(|c| c.method == HttpMethod::Post).collect()
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for MockBoard {
    fn uptime_ms(&self) -> u64 {
        self.now_ns / 1_000_000
    }
}

impl DelayNs for MockBoard {
    fn delay_ns(&mut self, ns: u32) {
        self.now_ns += u64::from(ns);
    }
}

impl SystemPort for MockBoard {
    fn restart(&mut self) {
        self.restarts += 1;
    }
}

impl StoragePort for MockBoard {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let v = self.store.get(&format!("{}::{}", namespace, key)).ok_or(StorageError::NotFound)?;
        if v.len() > buf.len() {
            return Err(StorageError::TooLarge);
        }
        buf[..v.len()].copy_from_slice(v);
        Ok(v.len())
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.store.insert(format!("{}::{}", namespace, key), data.to_vec());
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&format!("{}::{}", namespace, key))
    }
}

impl ConnectivityPort for MockBoard {
    fn connect(&mut self, ssid: &str, _password: &str, timeout_ms: u32) -> Result<(), ConnectivityError> {
        self.connect_calls.push(ssid.to_string());
        if self.ap_reachable {
            self.connected = true;
            Ok(())
        } else {
            self.connected = false;
            self.advance(u64::from(timeout_ms));
            Err(ConnectivityError::Timeout)
        }
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn ip_address(&self) -> Option<Ipv4Addr> {
        self.connected.then_some(MOCK_IP)
    }
}

impl HttpPort for MockBoard {
    fn request(&mut self, request: &HttpRequest<'_>) -> Result<u16, HttpError> {
        self.http_calls.push(HttpCall {
            method: request.method,
            url: request.url.to_string(),
            bearer: request.bearer.to_string(),
            body: request.body.map(|b| serde_json::from_slice(b).unwrap()),
        });
        if self.http_offline {
            return Err(HttpError::Connection);
        }
        Ok(match request.method {
            HttpMethod::Get => self.health_status,
            HttpMethod::Post => self.submit_status,
        })
    }
}

impl ProvisioningTransport for MockBoard {
    fn start(&mut self, name: &str) -> Result<(), TransportError> {
        self.advertised_name = Some(name.to_string());
        self.transport_running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_calls += 1;
        self.transport_running = false;
        self.client = false;
        self.events.clear();
    }

    fn advertise(&mut self) {
        self.advertise_calls += 1;
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }

    fn send_response(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.client {
            return Err(TransportError::NotConnected);
        }
        self.responses.push(serde_json::from_slice(payload).unwrap());
        Ok(())
    }

    fn send_status(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.client {
            return Err(TransportError::NotConnected);
        }
        self.statuses.push(serde_json::from_slice(payload).unwrap());
        Ok(())
    }
}

// ── MockLoadCells ─────────────────────────────────────────────

/// Shared raw values, so a test can change the load after the cells
/// have been moved into the controller.
pub type RawHandle = Rc<RefCell<[i32; MAX_BINS]>>;

/// Load cells that answer with a settable raw value per channel.
#[derive(Debug, Clone)]
pub struct MockLoadCells {
    pub present: [bool; MAX_BINS],
    raw: RawHandle,
}

#[allow(dead_code)]
impl MockLoadCells {
    /// `count` connected cells on the lowest channels, each reading `raw`.
    pub fn with_connected(count: usize, raw: i32) -> Self {
        Self {
            present: core::array::from_fn(|ch| ch < count),
            raw: Rc::new(RefCell::new([raw; MAX_BINS])),
        }
    }

    pub fn handle(&self) -> RawHandle {
        Rc::clone(&self.raw)
    }
}

impl LoadCellPort for MockLoadCells {
    fn is_ready(&mut self, channel: usize) -> bool {
        self.present.get(channel).copied().unwrap_or(false)
    }

    fn read_raw(&mut self, channel: usize) -> Result<i32, SensorError> {
        match self.present.get(channel) {
            Some(true) => Ok(self.raw.borrow()[channel]),
            Some(false) => Err(SensorError::NotReady),
            None => Err(SensorError::InvalidChannel),
        }
    }
}

// ── LogSink ───────────────────────────────────────────────────

pub struct LogSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl LogSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Loop driver ───────────────────────────────────────────────

/// Advance the clock by `step_ms` and tick, `ticks` times.
#[allow(dead_code)]
pub fn run_ticks<C: LoadCellPort>(
    ctrl: &mut DeviceController<C>,
    board: &mut MockBoard,
    sink: &mut LogSink,
    ticks: usize,
    step_ms: u64,
) {
    for _ in 0..ticks {
        board.advance(step_ms);
        ctrl.tick(board, sink);
    }
}
