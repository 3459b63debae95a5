//! Credential store.
//!
//! Persists WiFi and backend credentials plus the setup-complete flag, one
//! NVS key per field under the `smartbin` namespace.  Missing keys read
//! back as empty strings / `false`, so the store is usable on first boot.

use log::warn;

use crate::app::ports::{ConnectivityError, StoragePort, StorageError};
use crate::config::{DEFAULT_API_BASE_URL, keys};

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_API_KEY_LEN: usize = 128;
pub const MAX_API_URL_LEN: usize = 128;
pub const MAX_DEVICE_ID_LEN: usize = 32;

/// Snapshot of every persisted credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub wifi_ssid: heapless::String<MAX_SSID_LEN>,
    pub wifi_password: heapless::String<MAX_PASSWORD_LEN>,
    pub api_key: heapless::String<MAX_API_KEY_LEN>,
    pub api_url: heapless::String<MAX_API_URL_LEN>,
    pub device_id: heapless::String<MAX_DEVICE_ID_LEN>,
    pub setup_complete: bool,
}

impl Credentials {
    /// Read everything from storage.  Unreadable fields come back empty.
    pub fn load(storage: &impl StoragePort) -> Self {
        Self {
            wifi_ssid: read_string(storage, keys::WIFI_SSID),
            wifi_password: read_string(storage, keys::WIFI_PASSWORD),
            api_key: read_string(storage, keys::API_KEY),
            api_url: read_string(storage, keys::API_URL),
            device_id: read_string(storage, keys::DEVICE_ID),
            setup_complete: read_flag(storage, keys::SETUP_COMPLETE),
        }
    }

    pub fn has_wifi(&self) -> bool {
        !self.wifi_ssid.is_empty()
    }

    pub fn has_api(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Stored backend URL, or the factory default when none was provisioned.
    pub fn api_url_or_default(&self) -> &str {
        if self.api_url.is_empty() {
            DEFAULT_API_BASE_URL
        } else {
            self.api_url.as_str()
        }
    }
}

// ── Writers ──────────────────────────────────────────────────

pub fn store_wifi(
    storage: &mut impl StoragePort,
    ssid: &str,
    password: &str,
) -> Result<(), StorageError> {
    storage.write(keys::NAMESPACE, keys::WIFI_SSID, ssid.as_bytes())?;
    storage.write(keys::NAMESPACE, keys::WIFI_PASSWORD, password.as_bytes())
}

pub fn store_api(
    storage: &mut impl StoragePort,
    api_key: &str,
    api_url: &str,
    device_id: &str,
) -> Result<(), StorageError> {
    if api_key.len() > MAX_API_KEY_LEN
        || api_url.len() > MAX_API_URL_LEN
        || device_id.len() > MAX_DEVICE_ID_LEN
    {
        return Err(StorageError::TooLarge);
    }
    storage.write(keys::NAMESPACE, keys::API_KEY, api_key.as_bytes())?;
    storage.write(keys::NAMESPACE, keys::API_URL, api_url.as_bytes())?;
    storage.write(keys::NAMESPACE, keys::DEVICE_ID, device_id.as_bytes())
}

pub fn mark_setup_complete(storage: &mut impl StoragePort) -> Result<(), StorageError> {
    storage.write(keys::NAMESPACE, keys::SETUP_COMPLETE, &[1])
}

// ── Validation ───────────────────────────────────────────────

/// 1–32 bytes.  Anything else is left for the access point to judge.
pub fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
        return Err(ConnectivityError::InvalidCredentials);
    }
    Ok(())
}

/// At most 64 bytes; empty means an open network.
pub fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ConnectivityError::InvalidCredentials);
    }
    Ok(())
}

// ── Internal ─────────────────────────────────────────────────

fn read_string<const N: usize>(storage: &impl StoragePort, key: &str) -> heapless::String<N> {
    let mut buf = [0u8; 256];
    let mut out = heapless::String::new();
    match storage.read(keys::NAMESPACE, key, &mut buf) {
        Ok(len) => match core::str::from_utf8(&buf[..len]) {
            Ok(s) => {
                if out.push_str(s).is_err() {
                    warn!("Credentials: '{}' exceeds {} bytes, ignoring", key, N);
                }
            }
            Err(_) => warn!("Credentials: '{}' is not valid UTF-8, ignoring", key),
        },
        Err(StorageError::NotFound) => {}
        Err(e) => warn!("Credentials: failed to read '{}': {}", key, e),
    }
    out
}

fn read_flag(storage: &impl StoragePort, key: &str) -> bool {
    let mut buf = [0u8; 1];
    matches!(storage.read(keys::NAMESPACE, key, &mut buf), Ok(1) if buf[0] != 0)
}
