//! Outbound application events.
//!
//! The [`DeviceController`](super::controller::DeviceController) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on the
//! other side decide what to do with them: log to serial, forward upstream.

use crate::config::MAX_BINS;
use crate::error::Error;
use crate::fsm::StateId;
use crate::sensors::SensorReading;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The controller finished initialisation.
    Started { state: StateId, sensors: usize },

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// A WiFi association attempt is about to run.
    ConnectAttempt { attempt: u8, max: u8 },

    /// The association attempt failed.
    ConnectFailed(Error),

    /// Backend health check passed.
    Authenticated,

    /// Backend health check failed.
    AuthFailed(Error),

    /// A sensor poll completed.
    Readings(ReadingsReport),

    /// The readings could not be submitted.
    SubmitFailed(Error),

    /// A status record was offered to the provisioning client.
    StatusBroadcast(StatusReport),

    /// A provisioning command was processed.
    CommandHandled { command: &'static str, ok: bool },

    /// The controller is about to restart the device.
    RestartRequested { reason: &'static str },
}

/// One poll's worth of readings plus the submit outcome.
#[derive(Debug, Clone, Copy)]
pub struct ReadingsReport {
    pub timestamp_ms: u64,
    pub readings: [SensorReading; MAX_BINS],
    pub submitted: bool,
}

/// Coarse status triplet broadcast to a connected provisioning client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub wifi: &'static str,
    pub api: &'static str,
    pub sensors: &'static str,
}

impl StatusReport {
    pub const fn new(wifi: &'static str, api: &'static str, sensors: &'static str) -> Self {
        Self { wifi, api, sensors }
    }
}
