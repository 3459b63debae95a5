//! Fuzz target: `parse_command`
//!
//! Feeds arbitrary bytes, as a BLE client could write them, into the
//! provisioning command parser.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - Every accepted command reports a known wire name
//! - Every rejection maps to a non-empty client-facing message
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartbin::provisioning::protocol::parse_command;

const KNOWN: [&str; 8] = [
    "set_wifi",
    "set_api",
    "get_status",
    "complete_setup",
    "set_scale_factor",
    "get_scale_factor",
    "get_all_scale_factors",
    "calibrate_sensor",
];

fuzz_target!(|data: &[u8]| {
    match parse_command(data) {
        Ok(command) => assert!(KNOWN.contains(&command.name())),
        Err(e) => assert!(!e.message().is_empty()),
    }
});
