//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { state, sensors } => {
                info!("START | initial_state={} | sensors={}", state.name(), sensors);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from.name(), to.name());
            }
            AppEvent::ConnectAttempt { attempt, max } => {
                info!("WIFI  | attempt {}/{}", attempt, max);
            }
            AppEvent::ConnectFailed(e) => {
                warn!("WIFI  | {}", e);
            }
            AppEvent::Authenticated => {
                info!("API   | authenticated");
            }
            AppEvent::AuthFailed(e) => {
                warn!("API   | authentication failed: {}", e);
            }
            AppEvent::Readings(report) => {
                for r in report.readings.iter().filter(|r| r.valid) {
                    info!("BIN{}  | {:.2} kg", r.channel, r.weight_kg);
                }
                info!(
                    "READ  | t={} | valid={} | submitted={}",
                    report.timestamp_ms,
                    report.readings.iter().filter(|r| r.valid).count(),
                    report.submitted
                );
            }
            AppEvent::SubmitFailed(e) => {
                warn!("API   | submit failed: {}", e);
            }
            AppEvent::StatusBroadcast(s) => {
                info!("STAT  | wifi={} api={} sensors={}", s.wifi, s.api, s.sensors);
            }
            AppEvent::CommandHandled { command, ok } => {
                info!("PROV  | {} -> {}", command, if *ok { "ok" } else { "error" });
            }
            AppEvent::RestartRequested { reason } => {
                warn!("RESET | {}", reason);
            }
        }
    }
}
