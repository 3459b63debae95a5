//! SmartBin firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod pins;
pub mod provisioning;
pub mod sensors;

// Adapters and drivers carry their own cfg split: hardware on ESP-IDF,
// simulations on the host.
pub mod adapters;
pub mod drivers;

pub use error::{Error, Result};
