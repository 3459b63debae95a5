//! Per-channel scale factor persistence.
//!
//! Each factor is stored as a little-endian `f32` under `scale_<channel>`
//! so a reload returns the exact value that was written.

use core::fmt::Write;

use log::warn;

use crate::app::ports::{StorageError, StoragePort};
use crate::config::{DEFAULT_SCALE_FACTORS, MAX_BINS, MAX_SCALE_FACTOR, keys};

/// `scale_0` … `scale_5`.
pub fn scale_key(channel: usize) -> heapless::String<16> {
    let mut key = heapless::String::new();
    let _ = write!(key, "{}{}", keys::SCALE_PREFIX, channel);
    key
}

/// Range accepted from provisioning.  Factory defaults may exceed it.
pub fn is_valid_scale_factor(factor: f32) -> bool {
    factor > 0.0 && factor <= MAX_SCALE_FACTOR
}

/// Stored factor for `channel`, or the factory default.
pub fn load(storage: &impl StoragePort, channel: usize) -> f32 {
    let default = DEFAULT_SCALE_FACTORS.get(channel).copied().unwrap_or(1000.0);
    let mut buf = [0u8; 4];
    match storage.read(keys::NAMESPACE, &scale_key(channel), &mut buf) {
        Ok(4) => {
            let factor = f32::from_le_bytes(buf);
            if factor.is_finite() && factor > 0.0 {
                factor
            } else {
                warn!("SENSORS: stored scale for bin {} out of range, using default", channel);
                default
            }
        }
        Ok(_) | Err(StorageError::TooLarge) => {
            warn!("SENSORS: stored scale for bin {} malformed, using default", channel);
            default
        }
        Err(_) => default,
    }
}

pub fn load_all(storage: &impl StoragePort) -> [f32; MAX_BINS] {
    core::array::from_fn(|ch| load(storage, ch))
}

pub fn save(storage: &mut impl StoragePort, channel: usize, factor: f32) -> Result<(), StorageError> {
    storage.write(keys::NAMESPACE, &scale_key(channel), &factor.to_le_bytes())
}
