//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the business rules for the SmartBin: lifecycle
//! orchestration, credential handling and the backend client.  All
//! interaction with hardware happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals.

pub mod controller;
pub mod credentials;
pub mod events;
pub mod ports;
pub mod remote;
