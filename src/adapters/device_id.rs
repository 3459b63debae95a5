//! Device identity derived from the ESP32 factory MAC address.
//!
//! All three identifiers are deterministic across reboots (factory-burned
//! eFuse MAC):
//! - hardware identifier `AA:BB:CC:DD:EE:FF`, reported by `get_status`
//! - BLE advertised name `SmartBin_DDEEFF` (last 3 bytes, upper case)
//! - backend device id `smartbin_aabbccddeeff` (all 6 bytes, lower case)

use core::fmt::Write;

use crate::app::credentials::MAX_DEVICE_ID_LEN;
use crate::config::{DEVICE_ID_PREFIX, TRANSPORT_NAME_PREFIX};

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// `AA:BB:CC:DD:EE:FF`.
pub fn mac_string(mac: &MacAddress) -> heapless::String<17> {
    let mut s = heapless::String::new();
    let _ = write!(
        s,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    s
}

/// `SmartBin_DDEEFF`.
pub fn transport_name(mac: &MacAddress) -> heapless::String<24> {
    let mut name = heapless::String::new();
    let _ = write!(name, "{}{:02X}{:02X}{:02X}", TRANSPORT_NAME_PREFIX, mac[3], mac[4], mac[5]);
    name
}

/// `smartbin_aabbccddeeff`.
pub fn device_id(mac: &MacAddress) -> heapless::String<MAX_DEVICE_ID_LEN> {
    let mut id = heapless::String::new();
    let _ = write!(id, "{}", DEVICE_ID_PREFIX);
    for b in mac {
        let _ = write!(id, "{:02x}", b);
    }
    id
}

/// Identifiers computed once at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub mac: MacAddress,
    pub device_id: heapless::String<MAX_DEVICE_ID_LEN>,
}

impl DeviceIdentity {
    pub fn from_mac(mac: MacAddress) -> Self {
        Self { mac, device_id: device_id(&mac) }
    }

    pub fn mac_string(&self) -> heapless::String<17> {
        mac_string(&self.mac)
    }

    pub fn transport_name(&self) -> heapless::String<24> {
        transport_name(&self.mac)
    }
}
