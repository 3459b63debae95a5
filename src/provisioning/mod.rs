//! Provisioning service.
//!
//! Runs a command/response session over the [`ProvisioningTransport`]
//! (BLE GATT on hardware).  A client writes JSON commands; each one is
//! parsed, validated, executed against storage / network / sensors and
//! answered with a single JSON record.  The service also relays coarse
//! device status on a separate channel while a client is connected.
//!
//! ## Modes
//!
//! - **Provisioning**: first-time setup.  Ends with `complete_setup` or
//!   the provisioning timeout.
//! - **Settings**: reopened once the device is operating, for scale
//!   factor changes and re-provisioning.  Optional timeout.

pub mod protocol;

use log::{info, warn};
use serde_json::{Value, json};

use crate::app::credentials::{self, Credentials};
use crate::app::events::StatusReport;
use crate::app::ports::{
    ConnectivityPort, DevicePorts, HttpMethod, HttpPort, HttpRequest, LoadCellPort,
    ProvisioningTransport, StoragePort, TransportEvent,
};
use crate::adapters::device_id::DeviceIdentity;
use crate::config::{
    DEFAULT_API_BASE_URL, DEVICE_NAME, DeviceConfig, FIRMWARE_VERSION, HEALTH_ENDPOINT,
    MAX_BINS, MAX_CALIBRATION_WEIGHT_KG, MAX_SCALE_FACTOR, SETUP_SHUTDOWN_DELAY_MS,
};
use crate::sensors::SensorManager;
use protocol::{Command, error_response, parse_command, ready_response, success_response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Provisioning,
    Settings,
}

/// Outcome of one handled command, for the controller's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: &'static str,
    pub ok: bool,
}

pub struct ProvisioningService {
    identity: DeviceIdentity,
    active: bool,
    client_connected: bool,
    mode: SessionMode,
    started_ms: u64,
    setup_complete: bool,
    shutdown_at_ms: Option<u64>,
    provisioning_timeout_ms: u32,
    settings_timeout_ms: u32,
    connect_timeout_ms: u32,
    request_timeout_ms: u32,
}

impl ProvisioningService {
    pub fn new(identity: DeviceIdentity, config: &DeviceConfig, setup_complete: bool) -> Self {
        Self {
            identity,
            active: false,
            client_connected: false,
            mode: SessionMode::Provisioning,
            started_ms: 0,
            setup_complete,
            shutdown_at_ms: None,
            provisioning_timeout_ms: config.provisioning_timeout_ms,
            settings_timeout_ms: config.settings_timeout_ms,
            connect_timeout_ms: config.wifi_connect_timeout_ms,
            request_timeout_ms: config.api_request_timeout_ms,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Open a first-time setup session.  No-op while already active.
    pub fn start(&mut self, now_ms: u64, transport: &mut impl ProvisioningTransport) -> bool {
        self.open(SessionMode::Provisioning, now_ms, transport)
    }

    /// Open a post-setup settings session.  No-op while already active.
    pub fn start_settings(&mut self, now_ms: u64, transport: &mut impl ProvisioningTransport) -> bool {
        self.open(SessionMode::Settings, now_ms, transport)
    }

    pub fn stop(&mut self, transport: &mut impl ProvisioningTransport) {
        if !self.active {
            return;
        }
        transport.stop();
        self.active = false;
        self.client_connected = false;
        self.shutdown_at_ms = None;
        info!("PROV: stopped");
    }

    /// Housekeeping plus command dispatch.  Call once per loop iteration.
    pub fn update<C: LoadCellPort>(
        &mut self,
        now_ms: u64,
        io: &mut impl DevicePorts,
        sensors: &mut SensorManager<C>,
    ) -> heapless::Vec<CommandOutcome, 4> {
        let mut outcomes = heapless::Vec::new();
        if !self.active {
            return outcomes;
        }

        if self.shutdown_at_ms.is_some_and(|t| now_ms >= t) {
            info!("PROV: setup complete, shutting down");
            self.stop(io);
            return outcomes;
        }

        let timeout = match self.mode {
            SessionMode::Provisioning => self.provisioning_timeout_ms,
            SessionMode::Settings => self.settings_timeout_ms,
        };
        if timeout > 0 && now_ms.saturating_sub(self.started_ms) > u64::from(timeout) {
            warn!("PROV: session timed out");
            self.stop(io);
            return outcomes;
        }

        while let Some(event) = io.poll_event() {
            match event {
                TransportEvent::Connected => {
                    info!("PROV: client connected");
                    self.client_connected = true;
                    self.send(io, &ready_response());
                }
                TransportEvent::Disconnected => {
                    info!("PROV: client disconnected, advertising again");
                    self.client_connected = false;
                    io.advertise();
                }
                TransportEvent::CommandReceived(bytes) => {
                    let (response, outcome) = self.handle_command(&bytes, now_ms, io, sensors);
                    self.send(io, &response);
                    if outcomes.push(outcome).is_err() {
                        // Only the event log is truncated, the commands were answered.
                        warn!("PROV: command burst, outcome dropped");
                    }
                }
            }
        }
        outcomes
    }

    /// Relay a status record while a client is listening.
    pub fn broadcast_status(
        &mut self,
        report: &StatusReport,
        now_ms: u64,
        transport: &mut impl ProvisioningTransport,
    ) {
        if !self.active || !self.client_connected {
            return;
        }
        let record = json!({
            "type": "device_status",
            "wifi_status": report.wifi,
            "api_status": report.api,
            "sensor_status": report.sensors,
            "ble_status": "active",
            "timestamp": now_ms,
        });
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = transport.send_status(&bytes) {
                    warn!("PROV: status broadcast failed: {}", e);
                }
            }
            Err(_) => warn!("PROV: status record encoding failed"),
        }
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_client_connected(&self) -> bool {
        self.client_connected
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    // ── Command execution ────────────────────────────────────

    /// Parse and execute one command, returning the response record.
    pub fn handle_command<C: LoadCellPort>(
        &mut self,
        raw: &[u8],
        now_ms: u64,
        io: &mut impl DevicePorts,
        sensors: &mut SensorManager<C>,
    ) -> (Value, CommandOutcome) {
        let command = match parse_command(raw) {
            Ok(command) => command,
            Err(e) => {
                warn!("PROV: rejected command: {}", e.message());
                return (error_response(e.message()), CommandOutcome { command: "invalid", ok: false });
            }
        };
        let name = command.name();
        info!("PROV: {}", name);

        let response = match command {
            Command::SetWifi { ssid, password } => self.set_wifi(&ssid, &password, io),
            Command::SetApi { api_key, api_url } => self.set_api(&api_key, api_url.as_deref(), io),
            Command::GetStatus => Ok(self.device_info(&*io)),
            Command::CompleteSetup => self.complete_setup(now_ms, io),
            Command::SetScaleFactor { bin_id, scale_factor } => {
                set_scale_factor(bin_id, scale_factor, io, sensors)
            }
            Command::GetScaleFactor { bin_id } => get_scale_factor(bin_id, sensors),
            Command::GetAllScaleFactors => Ok(all_scale_factors(sensors)),
            Command::CalibrateSensor { bin_id, known_weight } => {
                calibrate_sensor(bin_id, known_weight, io, sensors)
            }
        };

        match response {
            Ok(record) => (record, CommandOutcome { command: name, ok: true }),
            Err(message) => {
                warn!("PROV: {} failed: {}", name, message);
                (error_response(&message), CommandOutcome { command: name, ok: false })
            }
        }
    }

    fn set_wifi(
        &mut self,
        ssid: &str,
        password: &str,
        io: &mut (impl ConnectivityPort + StoragePort),
    ) -> Result<Value, String> {
        if ssid.is_empty() {
            return Err("SSID is required".into());
        }
        credentials::validate_ssid(ssid)
            .map_err(|_| "SSID must be at most 32 bytes".to_string())?;
        credentials::validate_password(password)
            .map_err(|_| "Password must be at most 64 bytes".to_string())?;

        io.disconnect();
        if let Err(e) = io.connect(ssid, password, self.connect_timeout_ms) {
            warn!("PROV: test connection to '{}' failed: {}", ssid, e);
            return Err("WiFi connection failed".into());
        }
        credentials::store_wifi(io, ssid, password)
            .map_err(|_| "Failed to persist WiFi credentials".to_string())?;

        let ip = io.ip_address().map_or_else(|| "0.0.0.0".to_string(), |ip| ip.to_string());
        Ok(json!({ "status": "wifi_connected", "ip_address": ip }))
    }

    fn set_api(
        &mut self,
        api_key: &str,
        api_url: Option<&str>,
        io: &mut (impl ConnectivityPort + HttpPort + StoragePort),
    ) -> Result<Value, String> {
        if api_key.is_empty() {
            return Err("API key is required".into());
        }
        if !io.is_connected() {
            return Err("WiFi must be connected before API setup".into());
        }
        let api_url = api_url.unwrap_or(DEFAULT_API_BASE_URL);

        let url = format!("{}{}", api_url.trim_end_matches('/'), HEALTH_ENDPOINT);
        let status = io.request(&HttpRequest {
            method: HttpMethod::Get,
            url: &url,
            bearer: api_key,
            body: None,
            timeout_ms: self.request_timeout_ms,
        });
        match status {
            Ok(200) => {}
            Ok(code) => {
                warn!("PROV: API health check returned {}", code);
                return Err("API authentication failed".into());
            }
            Err(e) => {
                warn!("PROV: API health check failed: {}", e);
                return Err("API authentication failed".into());
            }
        }

        let device_id = self.identity.device_id.clone();
        credentials::store_api(io, api_key, api_url, &device_id)
            .map_err(|_| "Failed to persist API credentials".to_string())?;
        Ok(json!({ "status": "api_connected", "device_id": device_id.as_str() }))
    }

    fn device_info(&self, io: &impl ConnectivityPort) -> Value {
        let mut info = json!({
            "status": "device_info",
            "device_name": DEVICE_NAME,
            "setup_complete": self.setup_complete,
            "mac_address": self.identity.mac_string().as_str(),
            "wifi_connected": io.is_connected(),
            "firmware_version": FIRMWARE_VERSION,
        });
        if io.is_connected() {
            if let Some(ip) = io.ip_address() {
                info["ip_address"] = Value::String(ip.to_string());
            }
        }
        info
    }

    fn complete_setup(&mut self, now_ms: u64, io: &mut impl StoragePort) -> Result<Value, String> {
        let creds = Credentials::load(&*io);
        if !creds.has_wifi() || !creds.has_api() {
            return Err("WiFi and API credentials required".into());
        }
        credentials::mark_setup_complete(io).map_err(|_| "Failed to persist setup state".to_string())?;
        self.setup_complete = true;
        self.shutdown_at_ms = Some(now_ms + SETUP_SHUTDOWN_DELAY_MS);
        info!("PROV: setup complete");
        Ok(success_response("Setup completed successfully"))
    }

    // ── Internal ─────────────────────────────────────────────

    fn open(&mut self, mode: SessionMode, now_ms: u64, transport: &mut impl ProvisioningTransport) -> bool {
        if self.active {
            return true;
        }
        let name = self.identity.transport_name();
        if let Err(e) = transport.start(&name) {
            warn!("PROV: transport start failed: {}", e);
            return false;
        }
        self.active = true;
        self.client_connected = false;
        self.mode = mode;
        self.started_ms = now_ms;
        self.shutdown_at_ms = None;
        info!("PROV: advertising as '{}' ({:?} mode)", name, mode);
        true
    }

    fn send(&self, transport: &mut impl ProvisioningTransport, record: &Value) {
        if !self.client_connected {
            warn!("PROV: no client, response dropped");
            return;
        }
        match serde_json::to_vec(record) {
            Ok(bytes) => {
                if let Err(e) = transport.send_response(&bytes) {
                    warn!("PROV: response send failed: {}", e);
                }
            }
            Err(_) => warn!("PROV: response encoding failed"),
        }
    }
}

// ── Scale factor commands ────────────────────────────────────

fn check_bin(bin_id: i64) -> Result<usize, String> {
    usize::try_from(bin_id)
        .ok()
        .filter(|&b| b < MAX_BINS)
        .ok_or_else(|| format!("Invalid bin_id. Must be 0-{}", MAX_BINS - 1))
}

/// `(0, max]`, checked at full precision before narrowing to `f32`.
fn within(value: f64, max: f32) -> Option<f32> {
    (value > 0.0 && value <= f64::from(max)).then_some(value as f32)
}

fn check_enabled<C: LoadCellPort>(bin: usize, sensors: &SensorManager<C>) -> Result<(), String> {
    if sensors.is_enabled(bin) {
        Ok(())
    } else {
        Err(format!("Sensor {} is not enabled or detected", bin))
    }
}

fn set_scale_factor<C: LoadCellPort>(
    bin_id: i64,
    scale_factor: f64,
    storage: &mut impl StoragePort,
    sensors: &mut SensorManager<C>,
) -> Result<Value, String> {
    let bin = check_bin(bin_id)?;
    let factor = within(scale_factor, MAX_SCALE_FACTOR)
        .ok_or_else(|| "Invalid scale_factor. Must be between 0 and 100000".to_string())?;
    check_enabled(bin, sensors)?;
    sensors
        .set_scale_factor(bin, factor, storage)
        .map_err(|_| "Failed to persist scale factor".to_string())?;
    Ok(json!({
        "status": "success",
        "bin_id": bin,
        "scale_factor": factor,
        "message": "Scale factor updated successfully",
    }))
}

fn get_scale_factor<C: LoadCellPort>(bin_id: i64, sensors: &SensorManager<C>) -> Result<Value, String> {
    let bin = check_bin(bin_id)?;
    Ok(json!({
        "status": "success",
        "bin_id": bin,
        "scale_factor": sensors.scale_factor(bin).unwrap_or_default(),
        "sensor_enabled": sensors.is_enabled(bin),
    }))
}

fn all_scale_factors<C: LoadCellPort>(sensors: &SensorManager<C>) -> Value {
    let factors: Vec<Value> = (0..MAX_BINS)
        .map(|bin| {
            json!({
                "bin_id": bin,
                "scale_factor": sensors.scale_factor(bin).unwrap_or_default(),
                "enabled": sensors.is_enabled(bin),
            })
        })
        .collect();
    json!({
        "status": "success",
        "connected_sensors": sensors.connected_sensor_count(),
        "scale_factors": factors,
    })
}

fn calibrate_sensor<C: LoadCellPort>(
    bin_id: i64,
    known_weight: f64,
    storage: &mut impl StoragePort,
    sensors: &mut SensorManager<C>,
) -> Result<Value, String> {
    let bin = check_bin(bin_id)?;
    let weight = within(known_weight, MAX_CALIBRATION_WEIGHT_KG)
        .ok_or_else(|| "Invalid known_weight. Must be between 0 and 100 kg".to_string())?;
    check_enabled(bin, sensors)?;
    let factor = sensors.calibrate(bin, weight, storage).map_err(|e| format!("Calibration failed: {}", e))?;
    Ok(json!({
        "status": "success",
        "bin_id": bin,
        "known_weight": weight,
        "new_scale_factor": factor,
        "message": "Sensor calibrated successfully",
    }))
}
