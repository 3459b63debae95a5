//! Board aggregate.
//!
//! Bundles the concrete adapters into one value that implements every
//! device port, so the controller can take a single `&mut Board`.
//! Each port method delegates to the adapter that owns the concern.

use std::net::Ipv4Addr;

use embedded_hal::delay::DelayNs;
use log::warn;

use super::ble::BleAdapter;
use super::http::HttpAdapter;
use super::nvs::NvsAdapter;
use super::time::Esp32TimeAdapter;
use super::wifi::WifiAdapter;
use crate::app::ports::{
    ClockPort, ConfigError, ConfigPort, ConnectivityError, ConnectivityPort, HttpError, HttpPort,
    HttpRequest, ProvisioningTransport, StorageError, StoragePort, SystemPort, TransportError,
    TransportEvent,
};
use crate::config::DeviceConfig;

pub struct Board {
    pub nvs: NvsAdapter,
    pub wifi: WifiAdapter,
    pub http: HttpAdapter,
    pub ble: BleAdapter,
    pub time: Esp32TimeAdapter,
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl Board {
    pub fn new(nvs: NvsAdapter, wifi: WifiAdapter, http: HttpAdapter, ble: BleAdapter) -> Self {
        Self {
            nvs,
            wifi,
            http,
            ble,
            time: Esp32TimeAdapter::new(),
            #[cfg(not(target_os = "espidf"))]
            restarts: 0,
        }
    }

    /// Number of restarts requested (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}

impl ClockPort for Board {
    fn uptime_ms(&self) -> u64 {
        self.time.uptime_ms()
    }
}

impl DelayNs for Board {
    fn delay_ns(&mut self, ns: u32) {
        self.time.delay_ns(ns);
    }
}

impl SystemPort for Board {
    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        warn!("Board: restarting");
        self.ble.stop();
        self.wifi.disconnect();
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        warn!("Board(sim): restart requested");
        self.restarts += 1;
    }
}

impl StoragePort for Board {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.nvs.read(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.nvs.write(namespace, key, data)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.nvs.exists(namespace, key)
    }
}

impl ConfigPort for Board {
    fn load(&self) -> Result<DeviceConfig, ConfigError> {
        self.nvs.load()
    }

    fn save(&mut self, config: &DeviceConfig) -> Result<(), ConfigError> {
        self.nvs.save(config)
    }
}

impl ConnectivityPort for Board {
    fn connect(&mut self, ssid: &str, password: &str, timeout_ms: u32) -> Result<(), ConnectivityError> {
        self.wifi.connect(ssid, password, timeout_ms)
    }

    fn disconnect(&mut self) {
        self.wifi.disconnect();
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_connected()
    }

    fn ip_address(&self) -> Option<Ipv4Addr> {
        self.wifi.ip_address()
    }
}

impl HttpPort for Board {
    fn request(&mut self, request: &HttpRequest<'_>) -> Result<u16, HttpError> {
        self.http.request(request)
    }
}

impl ProvisioningTransport for Board {
    fn start(&mut self, name: &str) -> Result<(), TransportError> {
        self.ble.start(name)
    }

    fn stop(&mut self) {
        self.ble.stop();
    }

    fn advertise(&mut self) {
        self.ble.advertise();
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.ble.poll_event()
    }

    fn send_response(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.ble.send_response(payload)
    }

    fn send_status(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.ble.send_status(payload)
    }
}
