//! GPIO pin assignments for the SmartBin main board (ESP32-WROOM-32).
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

use crate::config::MAX_BINS;

/// HX711 `(clock, data)` GPIO pairs, indexed by bin.
pub const HX711_PINS: [(i32, i32); MAX_BINS] =
    [(4, 5), (12, 13), (14, 15), (16, 17), (18, 19), (21, 22)];

/// Built-in blue LED on WROOM-32 dev boards, used for the heartbeat.
pub const STATUS_LED_GPIO: i32 = 2;
