//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the "blackboard": the controller writes observations
//! (time, connectivity, provisioning flags, the outcome of the last
//! authentication) before each tick, state handlers read them and post
//! requests, and the controller carries the requests out after the tick.
//! Handlers therefore stay pure functions with no I/O.

use crate::app::events::StatusReport;
use crate::config::DeviceConfig;

// ---------------------------------------------------------------------------
// Observations (written by the controller; read-only to state handlers)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Observations {
    /// The setup-complete flag has been persisted.
    pub setup_complete: bool,
    /// The provisioning service is running.
    pub provisioning_active: bool,
    /// The WiFi station currently holds an association.
    pub network_connected: bool,
    /// Outcome of the authentication requested in AUTHENTICATING.
    pub auth_result: Option<bool>,
}

// ---------------------------------------------------------------------------
// Requests (written by state handlers; consumed by the controller)
// ---------------------------------------------------------------------------

/// Side effects a handler asks for.  Cleared before every tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Requests {
    pub start_provisioning: bool,
    /// Reopen the provisioning service for post-setup changes.
    pub start_settings: bool,
    pub connect_network: bool,
    pub authenticate: bool,
    pub poll_sensors: bool,
    pub restart: Option<&'static str>,
    pub status: Option<StatusReport>,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

pub struct FsmContext {
    // -- Timing --
    /// Monotonic time of the current tick.
    pub now_ms: u64,
    /// Time at which the current state was entered.
    pub state_entered_ms: u64,

    pub inputs: Observations,
    pub requests: Requests,
    pub config: DeviceConfig,

    // -- Per-state scratch, reset by on_enter --
    pub wifi_attempts: u8,
    pub last_attempt_ms: Option<u64>,
    pub auth_requested: bool,
    pub last_poll_ms: Option<u64>,
    pub settings_requested: bool,
}

impl FsmContext {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            now_ms: 0,
            state_entered_ms: 0,
            inputs: Observations::default(),
            requests: Requests::default(),
            config,
            wifi_attempts: 0,
            last_attempt_ms: None,
            auth_requested: false,
            last_poll_ms: None,
            settings_requested: false,
        }
    }

    /// Milliseconds since the current state was entered.
    pub fn ms_in_state(&self) -> u64 {
        self.now_ms.saturating_sub(self.state_entered_ms)
    }

    /// True once `interval_ms` has passed since `since`, or if it never happened.
    pub fn elapsed_since(&self, since: Option<u64>, interval_ms: u32) -> bool {
        since.is_none_or(|t| self.now_ms.saturating_sub(t) >= u64::from(interval_ms))
    }

    pub fn request_status(&mut self, wifi: &'static str, api: &'static str, sensors: &'static str) {
        self.requests.status = Some(StatusReport::new(wifi, api, sensors));
    }
}
