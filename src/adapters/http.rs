//! HTTP client adapter.
//!
//! Implements [`HttpPort`] for backend calls (health check, sensor data).
//!
//! - **`target_os = "espidf"`**: one `EspHttpConnection` per exchange,
//!   TLS verified against the ESP-IDF certificate bundle.
//! - **all other targets**: a scripted backend that records the last
//!   request for host-side tests.

use crate::app::ports::{HttpError, HttpPort, HttpRequest};

#[cfg(target_os = "espidf")]
use core::time::Duration;
#[cfg(target_os = "espidf")]
use log::{debug, warn};

#[cfg(target_os = "espidf")]
use embedded_svc::{
    http::{Method, client::Client as HttpClient},
    io::Write,
};
#[cfg(target_os = "espidf")]
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};

#[cfg(target_os = "espidf")]
use crate::app::ports::HttpMethod;

/// Request as seen by the simulated backend.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: crate::app::ports::HttpMethod,
    pub url: String,
    pub bearer: String,
    pub body: Option<Vec<u8>>,
}

pub struct HttpAdapter {
    #[cfg(not(target_os = "espidf"))]
    sim_status: u16,
    #[cfg(not(target_os = "espidf"))]
    sim_error: Option<HttpError>,
    #[cfg(not(target_os = "espidf"))]
    requests: Vec<RecordedRequest>,
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            sim_status: 200,
            #[cfg(not(target_os = "espidf"))]
            sim_error: None,
            #[cfg(not(target_os = "espidf"))]
            requests: Vec::new(),
        }
    }
}

#[cfg(target_os = "espidf")]
impl HttpPort for HttpAdapter {
    fn request(&mut self, request: &HttpRequest<'_>) -> Result<u16, HttpError> {
        if !request.url.starts_with("http://") && !request.url.starts_with("https://") {
            return Err(HttpError::InvalidUrl);
        }

        let config = HttpConfiguration {
            timeout: Some(Duration::from_millis(u64::from(request.timeout_ms))),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&config).map_err(|e| {
            warn!("HTTP: connection setup failed: {}", e);
            HttpError::Connection
        })?;
        let mut client = HttpClient::wrap(connection);

        let auth = format!("Bearer {}", request.bearer);
        let body = request.body.unwrap_or(&[]);
        let content_length = body.len().to_string();
        let mut headers = vec![("Authorization", auth.as_str())];
        let method = match request.method {
            HttpMethod::Get => Method::Get,
            HttpMethod::Post => {
                headers.push(("Content-Type", "application/json"));
                headers.push(("Content-Length", content_length.as_str()));
                Method::Post
            }
        };

        let mut req = client
            .request(method, request.url, &headers)
            .map_err(|_| HttpError::Connection)?;
        if !body.is_empty() {
            req.write_all(body).map_err(|_| HttpError::Io)?;
            req.flush().map_err(|_| HttpError::Io)?;
        }
        let response = req.submit().map_err(|e| {
            warn!("HTTP: {} failed: {:?}", request.url, e);
            HttpError::Timeout
        })?;

        let status = response.status();
        debug!("HTTP: {} -> {}", request.url, status);
        Ok(status)
    }
}

#[cfg(not(target_os = "espidf"))]
impl HttpPort for HttpAdapter {
    fn request(&mut self, request: &HttpRequest<'_>) -> Result<u16, HttpError> {
        if !request.url.starts_with("http://") && !request.url.starts_with("https://") {
            return Err(HttpError::InvalidUrl);
        }
        self.requests.push(RecordedRequest {
            method: request.method,
            url: request.url.to_string(),
            bearer: request.bearer.to_string(),
            body: request.body.map(<[u8]>::to_vec),
        });
        match self.sim_error {
            Some(e) => Err(e),
            None => Ok(self.sim_status),
        }
    }
}

// ── Simulation hooks ──────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl HttpAdapter {
    /// Status code returned by every subsequent request.
    pub fn sim_set_status(&mut self, status: u16) {
        self.sim_status = status;
        self.sim_error = None;
    }

    /// Make every subsequent request fail at the transport level.
    pub fn sim_set_offline(&mut self, error: HttpError) {
        self.sim_error = Some(error);
    }

    pub fn requests(&self) -> &[RecordedRequest] {
        &self.requests
    }

    pub fn last_request(&self) -> Option<&RecordedRequest> {
        self.requests.last()
    }
}
