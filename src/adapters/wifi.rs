//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`], the hexagonal boundary for network
//! connectivity.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` over the
//!   modem peripheral.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! Retry policy lives in the FSM (CONNECTING); a single `connect` call
//! makes exactly one bounded attempt.

use std::net::Ipv4Addr;

use log::{info, warn};

use crate::app::credentials::{validate_password, validate_ssid};
use crate::app::ports::{ConnectivityError, ConnectivityPort};

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{delay::FreeRtos, modem::Modem},
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

#[cfg(target_os = "espidf")]
const CONNECT_POLL_MS: u32 = 100;

/// Station address handed out by the simulated access point.
#[cfg(not(target_os = "espidf"))]
pub const SIM_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 2);

pub struct WifiAdapter {
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    ssid: heapless::String<32>,
    connected: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_reachable: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_attempts: u32,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        let wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), None)?, sysloop)?;
        info!("WiFi: driver created");
        Ok(Self { wifi, ssid: heapless::String::new(), connected: false })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            ssid: heapless::String::new(),
            connected: false,
            sim_reachable: true,
            sim_attempts: 0,
        }
    }

    /// SSID of the last successful association.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(
        &mut self,
        ssid: &str,
        password: &str,
        timeout_ms: u32,
    ) -> Result<(), ConnectivityError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| ConnectivityError::InvalidCredentials)?,
            password: password
                .try_into()
                .map_err(|_| ConnectivityError::InvalidCredentials)?,
            auth_method,
            ..Default::default()
        });

        self.wifi
            .set_configuration(&config)
            .map_err(|_| ConnectivityError::ConnectionFailed)?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(|_| ConnectivityError::ConnectionFailed)?;
        }
        self.wifi
            .wifi_mut()
            .connect()
            .map_err(|_| ConnectivityError::ConnectionFailed)?;

        let mut waited = 0u32;
        while !self.wifi.is_connected().unwrap_or(false) {
            if waited >= timeout_ms {
                let _ = self.wifi.disconnect();
                return Err(ConnectivityError::Timeout);
            }
            FreeRtos::delay_ms(CONNECT_POLL_MS);
            waited = waited.saturating_add(CONNECT_POLL_MS);
        }

        self.wifi
            .wait_netif_up()
            .map_err(|_| ConnectivityError::ConnectionFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(
        &mut self,
        _ssid: &str,
        _password: &str,
        _timeout_ms: u32,
    ) -> Result<(), ConnectivityError> {
        self.sim_attempts = self.sim_attempts.wrapping_add(1);
        if !self.sim_reachable {
            return Err(ConnectivityError::Timeout);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi: disconnect failed: {}", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {}

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.connected && self.sim_reachable
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Simulation hooks ──────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    /// Whether the simulated access point answers.  Dropping it while
    /// associated makes `is_connected` go false.
    pub fn sim_set_reachable(&mut self, reachable: bool) {
        self.sim_reachable = reachable;
    }

    /// Number of association attempts made so far.
    pub fn sim_attempts(&self) -> u32 {
        self.sim_attempts
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn connect(
        &mut self,
        ssid: &str,
        password: &str,
        timeout_ms: u32,
    ) -> Result<(), ConnectivityError> {
        if ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        validate_ssid(ssid)?;
        validate_password(password)?;

        if self.connected {
            self.disconnect();
        }

        info!("WiFi: connecting to '{}'", ssid);
        match self.platform_connect(ssid, password, timeout_ms) {
            Ok(()) => {
                self.connected = true;
                self.ssid.clear();
                let _ = self.ssid.push_str(ssid);
                info!("WiFi: connected, ip={:?}", self.ip_address());
                Ok(())
            }
            Err(e) => {
                warn!("WiFi: connection to '{}' failed: {}", ssid, e);
                self.connected = false;
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.platform_disconnect();
            info!("WiFi: disconnected");
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected && self.platform_is_connected()
    }

    #[cfg(target_os = "espidf")]
    fn ip_address(&self) -> Option<Ipv4Addr> {
        if !self.is_connected() {
            return None;
        }
        self.wifi.wifi().sta_netif().get_ip_info().ok().map(|info| info.ip)
    }

    #[cfg(not(target_os = "espidf"))]
    fn ip_address(&self) -> Option<Ipv4Addr> {
        self.is_connected().then_some(SIM_IP)
    }
}
