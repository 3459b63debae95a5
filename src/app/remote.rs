//! Backend client: health-check authentication and reading submission.
//!
//! Stateless apart from the `authenticated` flag and the credentials it
//! last loaded.  Every exchange is a single bounded HTTP request through
//! the [`HttpPort`]; nothing is buffered or retried here.

use core::fmt::Write;

use log::{info, warn};
use serde::Serialize;

use crate::app::credentials::{Credentials, MAX_API_KEY_LEN, MAX_API_URL_LEN, MAX_DEVICE_ID_LEN};
use crate::app::ports::{
    ConnectivityError, ConnectivityPort, HttpError, HttpMethod, HttpPort, HttpRequest,
};
use crate::config::{DeviceConfig, HEALTH_ENDPOINT, SENSOR_DATA_ENDPOINT};
use crate::error::{Error, Result};
use crate::sensors::SensorReading;

const MAX_URL_LEN: usize = MAX_API_URL_LEN + 32;

/// Request body for `POST /api/v1/sensor-data`.
#[derive(Debug, Serialize)]
pub struct SubmitPayload<'a> {
    pub device_id: &'a str,
    pub timestamp: u64,
    pub sensor_data: Vec<ReadingRecord>,
}

#[derive(Debug, Serialize)]
pub struct ReadingRecord {
    pub bin_id: usize,
    pub weight: f32,
    pub timestamp: u64,
    pub unit: &'static str,
}

pub struct RemoteClient {
    api_key: heapless::String<MAX_API_KEY_LEN>,
    api_url: heapless::String<MAX_API_URL_LEN>,
    device_id: heapless::String<MAX_DEVICE_ID_LEN>,
    request_timeout_ms: u32,
    authenticated: bool,
}

impl RemoteClient {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            api_key: heapless::String::new(),
            api_url: heapless::String::new(),
            device_id: heapless::String::new(),
            request_timeout_ms: config.api_request_timeout_ms,
            authenticated: false,
        }
    }

    /// Adopt the backend credentials from a store snapshot.
    pub fn load_credentials(&mut self, creds: &Credentials) {
        self.api_key = creds.api_key.clone();
        self.device_id = creds.device_id.clone();
        self.api_url.clear();
        // Both bounded by MAX_API_URL_LEN.
        let _ = self.api_url.push_str(creds.api_url_or_default());
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Drop the authenticated flag (e.g. after the link went down).
    pub fn reset(&mut self) {
        self.authenticated = false;
    }

    /// Health check against `<api_url>/health`.  Passes on HTTP 200 only.
    pub fn authenticate(&mut self, io: &mut (impl ConnectivityPort + HttpPort)) -> Result<()> {
        self.authenticated = false;
        if self.api_key.is_empty() {
            return Err(Error::Config("API key not provisioned"));
        }
        if !io.is_connected() {
            return Err(ConnectivityError::NotConnected.into());
        }

        let url = self.endpoint(HEALTH_ENDPOINT)?;
        let status = io.request(&HttpRequest {
            method: HttpMethod::Get,
            url: &url,
            bearer: &self.api_key,
            body: None,
            timeout_ms: self.request_timeout_ms,
        })?;
        if status != 200 {
            warn!("API: health check returned {}", status);
            return Err(HttpError::Status(status).into());
        }

        self.authenticated = true;
        info!("API: authenticated against {}", self.api_url);
        Ok(())
    }

    /// Submit the valid readings.  Refused unless authenticated and online.
    pub fn submit(
        &mut self,
        readings: &[SensorReading],
        now_ms: u64,
        io: &mut (impl ConnectivityPort + HttpPort),
    ) -> Result<usize> {
        if !self.authenticated {
            return Err(Error::Config("client not authenticated"));
        }
        if !io.is_connected() {
            return Err(ConnectivityError::NotConnected.into());
        }

        let payload = self.build_payload(readings, now_ms);
        let count = payload.sensor_data.len();
        let body = serde_json::to_vec(&payload).map_err(|_| Error::Validation("payload encoding failed"))?;

        let url = self.endpoint(SENSOR_DATA_ENDPOINT)?;
        let status = io.request(&HttpRequest {
            method: HttpMethod::Post,
            url: &url,
            bearer: &self.api_key,
            body: Some(&body),
            timeout_ms: self.request_timeout_ms,
        })?;
        if !(200..300).contains(&status) {
            warn!("API: submit returned {}", status);
            return Err(HttpError::Status(status).into());
        }
        Ok(count)
    }

    /// Only valid readings make it into the body.
    pub fn build_payload<'a>(&'a self, readings: &[SensorReading], now_ms: u64) -> SubmitPayload<'a> {
        SubmitPayload {
            device_id: &self.device_id,
            timestamp: now_ms,
            sensor_data: readings
                .iter()
                .filter(|r| r.valid)
                .map(|r| ReadingRecord {
                    bin_id: r.channel,
                    weight: r.weight_kg,
                    timestamp: r.timestamp_ms,
                    unit: "kg",
                })
                .collect(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<heapless::String<MAX_URL_LEN>> {
        let mut url = heapless::String::new();
        write!(url, "{}{}", self.api_url.trim_end_matches('/'), path)
            .map_err(|_| Error::Http(HttpError::InvalidUrl))?;
        Ok(url)
    }
}
