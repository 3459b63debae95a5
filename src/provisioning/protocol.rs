//! Provisioning wire protocol.
//!
//! Requests are JSON objects with a `command` field; responses are JSON
//! objects with a `status` field.  Parsing is split from execution so the
//! parser can be fuzzed and unit tested without a device behind it.

use serde::Deserialize;
use serde_json::{Value, json};

/// A parsed, shape-checked command.  Range checks happen at execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetWifi { ssid: String, password: String },
    SetApi { api_key: String, api_url: Option<String> },
    GetStatus,
    CompleteSetup,
    SetScaleFactor { bin_id: i64, scale_factor: f64 },
    GetScaleFactor { bin_id: i64 },
    GetAllScaleFactors,
    CalibrateSensor { bin_id: i64, known_weight: f64 },
}

impl Command {
    /// Wire name, also used in logs and events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetWifi { .. } => "set_wifi",
            Self::SetApi { .. } => "set_api",
            Self::GetStatus => "get_status",
            Self::CompleteSetup => "complete_setup",
            Self::SetScaleFactor { .. } => "set_scale_factor",
            Self::GetScaleFactor { .. } => "get_scale_factor",
            Self::GetAllScaleFactors => "get_all_scale_factors",
            Self::CalibrateSensor { .. } => "calibrate_sensor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    InvalidJson,
    UnknownCommand,
    /// A required field is absent.  Carries the client-facing message.
    MissingField(&'static str),
}

impl ParseError {
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidJson => "Invalid JSON format",
            Self::UnknownCommand => "Unknown command",
            Self::MissingField(msg) => msg,
        }
    }
}

/// Superset of every command's fields.  Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCommand {
    command: Option<String>,
    ssid: Option<String>,
    #[serde(alias = "secret")]
    password: Option<String>,
    api_key: Option<String>,
    api_url: Option<String>,
    bin_id: Option<i64>,
    scale_factor: Option<f64>,
    known_weight: Option<f64>,
}

pub fn parse_command(raw: &[u8]) -> Result<Command, ParseError> {
    let raw: RawCommand = serde_json::from_slice(raw).map_err(|_| ParseError::InvalidJson)?;

    match raw.command.as_deref() {
        Some("set_wifi") => Ok(Command::SetWifi {
            ssid: raw.ssid.unwrap_or_default(),
            password: raw.password.unwrap_or_default(),
        }),
        Some("set_api") => Ok(Command::SetApi {
            api_key: raw.api_key.unwrap_or_default(),
            api_url: raw.api_url.filter(|u| !u.is_empty()),
        }),
        Some("get_status") => Ok(Command::GetStatus),
        Some("complete_setup") => Ok(Command::CompleteSetup),
        Some("set_scale_factor") => match (raw.bin_id, raw.scale_factor) {
            (Some(bin_id), Some(scale_factor)) => Ok(Command::SetScaleFactor { bin_id, scale_factor }),
            _ => Err(ParseError::MissingField("bin_id and scale_factor are required")),
        },
        Some("get_scale_factor") => match raw.bin_id {
            Some(bin_id) => Ok(Command::GetScaleFactor { bin_id }),
            None => Err(ParseError::MissingField("bin_id is required")),
        },
        Some("get_all_scale_factors") => Ok(Command::GetAllScaleFactors),
        Some("calibrate_sensor") => match (raw.bin_id, raw.known_weight) {
            (Some(bin_id), Some(known_weight)) => Ok(Command::CalibrateSensor { bin_id, known_weight }),
            _ => Err(ParseError::MissingField("bin_id and known_weight are required")),
        },
        _ => Err(ParseError::UnknownCommand),
    }
}

// ── Response records ─────────────────────────────────────────

pub fn error_response(message: &str) -> Value {
    json!({ "status": "error", "message": message })
}

pub fn success_response(message: &str) -> Value {
    json!({ "status": "success", "message": message })
}

pub fn ready_response() -> Value {
    json!({ "status": "ready", "message": "Device ready for provisioning" })
}
