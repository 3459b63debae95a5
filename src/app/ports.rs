//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DeviceController / ProvisioningService (domain)
//! ```
//!
//! Driven adapters (storage, WiFi, HTTP, BLE, load cells, clock) implement
//! these traits.  The domain consumes them via generics, so the core never
//! touches ESP-IDF directly and runs unchanged against host mocks.
//!
//! ## Security notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **StoragePort** implementations SHOULD encrypt sensitive keys.
//! - All port errors are typed: callers must handle every variant explicitly.

use core::fmt;
use std::net::Ipv4Addr;

use crate::config::DeviceConfig;
use crate::error::SensorError;

// ───────────────────────────────────────────────────────────────
// Clock + system ports
// ───────────────────────────────────────────────────────────────

/// Monotonic time since boot.
pub trait ClockPort {
    fn uptime_ms(&self) -> u64;
}

/// Process-level control.
pub trait SystemPort {
    /// Full device restart.  Does not return on hardware.
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Connectivity port (driven adapter: domain ↔ WiFi station)
// ───────────────────────────────────────────────────────────────

/// Station-mode network association.
pub trait ConnectivityPort {
    /// Associate with `ssid`, blocking for at most `timeout_ms`.
    fn connect(&mut self, ssid: &str, password: &str, timeout_ms: u32)
    -> Result<(), ConnectivityError>;

    /// Drop the current association (no-op when idle).
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Station address while connected.
    fn ip_address(&self) -> Option<Ipv4Addr>;
}

// ───────────────────────────────────────────────────────────────
// HTTP port (driven adapter: domain → backend)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One bounded HTTP exchange.  JSON bodies only.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub method: HttpMethod,
    pub url: &'a str,
    /// Sent as `Authorization: Bearer <token>`.
    pub bearer: &'a str,
    pub body: Option<&'a [u8]>,
    pub timeout_ms: u32,
}

pub trait HttpPort {
    /// Perform the exchange and return the response status code.
    /// Non-2xx codes are `Ok`; only transport failures are `Err`.
    fn request(&mut self, request: &HttpRequest<'_>) -> Result<u16, HttpError>;
}

// ───────────────────────────────────────────────────────────────
// Load cell port (driven adapter: HX711 bank → domain)
// ───────────────────────────────────────────────────────────────

/// Raw access to the per-bin load-cell amplifiers.
pub trait LoadCellPort {
    /// True when a conversion is waiting on `channel`.
    fn is_ready(&mut self, channel: usize) -> bool;

    /// One signed 24-bit conversion.  May wait a bounded time for the
    /// cell to become ready; `NotReady` if it does not.
    fn read_raw(&mut self, channel: usize) -> Result<i32, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Provisioning transport (driven adapter: domain ↔ BLE GATT)
// ───────────────────────────────────────────────────────────────

/// Events surfaced by the transport, drained once per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// Raw bytes written to the command characteristic.
    CommandReceived(Vec<u8>),
}

/// Short-range command channel with a response and a status stream.
pub trait ProvisioningTransport {
    /// Bring the stack up and advertise under `name`.
    fn start(&mut self, name: &str) -> Result<(), TransportError>;

    /// Tear the stack down.  Safe to call when already stopped.
    fn stop(&mut self);

    /// Resume advertising after a client leaves.
    fn advertise(&mut self);

    fn poll_event(&mut self) -> Option<TransportEvent>;

    /// Notify on the response characteristic.
    fn send_response(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Notify on the status characteristic.
    fn send_status(&mut self, payload: &[u8]) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`DeviceConfig`].
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Returns [`DeviceConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<DeviceConfig, ConfigError>;

    fn save(&mut self, config: &DeviceConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for credentials, scale factors and config.
///
/// # Security
///
/// - Implementations SHOULD encrypt sensitive keys (WiFi passwords, API keys).
///   On ESP32, prefer the encrypted NVS partition for these.
/// - Write operations MUST be atomic: no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Aggregate
// ───────────────────────────────────────────────────────────────

/// Everything the controller drives each tick.  Blanket-implemented, so
/// a board only has to implement the individual ports.
pub trait DevicePorts:
    ClockPort + SystemPort + StoragePort + ConnectivityPort + HttpPort + ProvisioningTransport
{
}

impl<T> DevicePorts for T where
    T: ClockPort + SystemPort + StoragePort + ConnectivityPort + HttpPort + ProvisioningTransport
{
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Value does not fit the caller's buffer or the backend's limits.
    TooLarge,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`ConnectivityPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    /// No SSID stored or supplied.
    NoCredentials,
    /// SSID or password failed validation.
    InvalidCredentials,
    /// Association did not complete within the timeout.
    Timeout,
    /// The driver rejected the request.
    ConnectionFailed,
    /// An operation needed a link that is down.
    NotConnected,
}

/// Errors from [`HttpPort`] operations and response checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    /// URL could not be parsed or is too long.
    InvalidUrl,
    /// Connection or TLS setup failed.
    Connection,
    /// The exchange exceeded its timeout.
    Timeout,
    /// Writing the body or reading the response failed.
    Io,
    /// The server answered with a non-success status.
    Status(u16),
}

/// Errors from [`ProvisioningTransport`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Controller or host stack initialisation failed.
    InitFailed,
    /// Advertising could not be started.
    AdvertisingFailed,
    /// No client is connected.
    NotConnected,
    /// Payload exceeds the characteristic size.
    PayloadTooLarge,
    /// Notify or indicate failed.
    SendFailed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::TooLarge => write!(f, "value too large"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials"),
            Self::InvalidCredentials => write!(f, "invalid WiFi credentials"),
            Self::Timeout => write!(f, "association timed out"),
            Self::ConnectionFailed => write!(f, "connection failed"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl => write!(f, "invalid URL"),
            Self::Connection => write!(f, "connection failed"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Io => write!(f, "I/O error"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed => write!(f, "BLE init failed"),
            Self::AdvertisingFailed => write!(f, "advertising failed"),
            Self::NotConnected => write!(f, "no client connected"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::SendFailed => write!(f, "notify failed"),
        }
    }
}
