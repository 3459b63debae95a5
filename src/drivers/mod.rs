//! Board-level drivers outside the port boundary.

pub mod heartbeat;
pub mod watchdog;
