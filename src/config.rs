//! Device configuration
//!
//! Compile-time constants for the SmartBin hardware plus the runtime
//! tunables in [`DeviceConfig`].  The tunables can be overridden via NVS
//! (see [`ConfigPort`](crate::app::ports::ConfigPort)).

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

// --- Identity ---

pub const DEVICE_NAME: &str = "SmartBin";
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Prefix of the BLE advertised name (`SmartBin_A1B2C3`).
pub const TRANSPORT_NAME_PREFIX: &str = "SmartBin_";
/// Prefix of the device identifier reported to the backend.
pub const DEVICE_ID_PREFIX: &str = "smartbin_";

// --- Bins ---

pub const MAX_BINS: usize = 6;
pub const MAX_BIN_CAPACITY_KG: f32 = 50.0;
pub const MAX_SCALE_FACTOR: f32 = 100_000.0;
pub const MAX_CALIBRATION_WEIGHT_KG: f32 = 100.0;

/// Factory scale factors (raw counts per kg).  Channel 0 ships calibrated.
pub const DEFAULT_SCALE_FACTORS: [f32; MAX_BINS] =
    [140_400.0, 1000.0, 1000.0, 1000.0, 1000.0, 1000.0];

// --- Backend ---

pub const DEFAULT_API_BASE_URL: &str =
    "https://smart-bins-api-uay7w.ondigitalocean.app/smart-bins-api2";
pub const SENSOR_DATA_ENDPOINT: &str = "/api/v1/sensor-data";
pub const HEALTH_ENDPOINT: &str = "/health";

/// Delay between the `complete_setup` response and the provisioning shutdown.
pub const SETUP_SHUTDOWN_DELAY_MS: u64 = 1000;

/// NVS namespace and key names.  NVS keys are limited to 15 bytes.
pub mod keys {
    pub const NAMESPACE: &str = "smartbin";
    pub const WIFI_SSID: &str = "wifi_ssid";
    pub const WIFI_PASSWORD: &str = "wifi_pass";
    pub const API_KEY: &str = "api_key";
    pub const API_URL: &str = "api_url";
    pub const DEVICE_ID: &str = "device_id";
    pub const SETUP_COMPLETE: &str = "setup_done";
    pub const SCALE_PREFIX: &str = "scale_";
    pub const DEVICE_CONFIG: &str = "devcfg";
}

/// Runtime tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    // --- Sensors ---
    /// Interval between sensor polls in OPERATING (milliseconds)
    pub sensor_poll_interval_ms: u32,
    /// Moving-average window: weight N-1 old : 1 new
    pub smoothing_samples: u8,
    /// Raw conversions averaged per reading
    pub samples_per_reading: u8,
    /// Raw conversions averaged during calibration and tare
    pub calibration_samples: u8,
    /// Per-channel ready-signal budget during detection (milliseconds)
    pub detection_timeout_ms: u32,
    /// Startup fails when fewer channels are detected
    pub min_required_sensors: u8,
    /// Replace the load cells with synthetic waveforms
    pub simulate_sensors: bool,

    // --- Network ---
    /// Bound on a single WiFi association attempt (milliseconds)
    pub wifi_connect_timeout_ms: u32,
    /// Attempts before CONNECTING gives up
    pub wifi_max_retries: u8,
    /// Pause between association attempts (milliseconds)
    pub wifi_retry_delay_ms: u32,
    /// Bound on a single HTTP exchange (milliseconds)
    pub api_request_timeout_ms: u32,

    // --- Lifecycle ---
    /// Restart if provisioning has not completed within this window (milliseconds)
    pub provisioning_timeout_ms: u32,
    /// Settings session lifetime after setup, 0 = unbounded (milliseconds)
    pub settings_timeout_ms: u32,
    /// Cooldown in ERROR before the restart (milliseconds)
    pub error_restart_delay_ms: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            // Sensors
            sensor_poll_interval_ms: 1000,
            smoothing_samples: 3,
            samples_per_reading: 6,
            calibration_samples: 10,
            detection_timeout_ms: 2000,
            min_required_sensors: 1,
            simulate_sensors: false,

            // Network
            wifi_connect_timeout_ms: 30_000,
            wifi_max_retries: 3,
            wifi_retry_delay_ms: 5000,
            api_request_timeout_ms: 10_000,

            // Lifecycle
            provisioning_timeout_ms: 300_000, // 5 min
            settings_timeout_ms: 0,
            error_restart_delay_ms: 30_000,
        }
    }
}

impl DeviceConfig {
    /// Range-check every field.  Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensor_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("sensor_poll_interval_ms must be > 0"));
        }
        if self.smoothing_samples == 0 {
            return Err(ConfigError::ValidationFailed("smoothing_samples must be >= 1"));
        }
        if self.samples_per_reading == 0 || self.calibration_samples == 0 {
            return Err(ConfigError::ValidationFailed("sample counts must be >= 1"));
        }
        if self.detection_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("detection_timeout_ms must be > 0"));
        }
        if self.min_required_sensors as usize > MAX_BINS {
            return Err(ConfigError::ValidationFailed("min_required_sensors exceeds bin count"));
        }
        if self.wifi_connect_timeout_ms == 0 || self.api_request_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("network timeouts must be > 0"));
        }
        if self.wifi_max_retries == 0 {
            return Err(ConfigError::ValidationFailed("wifi_max_retries must be >= 1"));
        }
        if self.provisioning_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("provisioning_timeout_ms must be > 0"));
        }
        Ok(())
    }
}
