//! Unified error types for the SmartBin firmware.
//!
//! A single `Error` enum that every subsystem converts into.  The variants
//! follow the failure taxonomy: configuration, connectivity, validation,
//! hardware and fatal.  Everything is `Copy` so errors can be recorded in
//! events and FSM observations without allocation.

use core::fmt;

use crate::app::ports::{ConnectivityError, HttpError, StorageError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Missing or invalid credentials / settings.  Recoverable by re-provisioning.
    Config(&'static str),
    /// Persistent storage failed.
    Storage(StorageError),
    /// Network association failed or the network is down.
    Connectivity(ConnectivityError),
    /// HTTP exchange failed or returned a non-success status.
    Http(HttpError),
    /// Malformed command or out-of-range parameter.
    Validation(&'static str),
    /// Load cell missing, not ready, or returning rail values.
    Hardware(SensorError),
    /// Unrecoverable within the process; only a restart helps.
    Fatal(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Connectivity(e) => write!(f, "connectivity: {e}"),
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConnectivityError> for Error {
    fn from(e: ConnectivityError) -> Self {
        Self::Connectivity(e)
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Hardware(e)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Channel index outside `0..MAX_BINS`.
    InvalidChannel,
    /// Channel was not detected at startup.
    NotEnabled,
    /// The data line never signalled ready within the budget.
    NotReady,
    /// Fewer channels detected than the configured minimum.
    InsufficientSensors { found: u8, required: u8 },
    /// Scale factor outside `(0, MAX_SCALE_FACTOR]`.
    InvalidScaleFactor,
    /// Calibration produced a non-finite or non-positive factor.
    CalibrationFailed,
    /// The scale factor could not be persisted.
    Storage(StorageError),
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChannel => write!(f, "invalid channel"),
            Self::NotEnabled => write!(f, "channel not enabled"),
            Self::NotReady => write!(f, "HX711 not ready"),
            Self::InsufficientSensors { found, required } => {
                write!(f, "only {found} load cell(s) detected, {required} required")
            }
            Self::InvalidScaleFactor => write!(f, "scale factor out of range"),
            Self::CalibrationFailed => write!(f, "calibration produced an invalid factor"),
            Self::Storage(e) => write!(f, "scale factor not persisted: {e}"),
        }
    }
}

impl From<StorageError> for SensorError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
