//! Heartbeat status LED.
//!
//! A single GPIO LED pulses once per period; the period tells the FSM
//! state apart at a glance:
//!
//! | State                     | Period  |
//! |---------------------------|---------|
//! | PROVISIONING              | 300 ms  |
//! | CONNECTING/AUTHENTICATING | 1000 ms |
//! | OPERATING                 | 2000 ms |
//! | ERROR                     | 500 ms  |
//!
//! Each pulse stays lit for [`PULSE_ON_MS`].  Driven through any
//! `embedded-hal` [`OutputPin`], so the host tests use a fake pin.

use embedded_hal::digital::OutputPin;

use crate::fsm::StateId;

pub const PULSE_ON_MS: u64 = 100;

/// Blink period for a state (milliseconds).
pub const fn period_for(state: StateId) -> u64 {
    match state {
        StateId::Provisioning => 300,
        StateId::Connecting | StateId::Authenticating => 1000,
        StateId::Operating => 2000,
        StateId::Error => 500,
    }
}

/// Whether the LED should be lit at `now_ms` in `state`.
pub fn is_lit(state: StateId, now_ms: u64) -> bool {
    now_ms % period_for(state) < PULSE_ON_MS
}

pub struct Heartbeat<P> {
    pin: P,
    lit: bool,
}

impl<P: OutputPin> Heartbeat<P> {
    pub fn new(mut pin: P) -> Self {
        let _ = pin.set_low();
        Self { pin, lit: false }
    }

    /// Drive the pin for the current state.  Only touches the GPIO on change.
    pub fn update(&mut self, state: StateId, now_ms: u64) {
        let want = is_lit(state, now_ms);
        if want == self.lit {
            return;
        }
        let result = if want { self.pin.set_high() } else { self.pin.set_low() };
        if result.is_ok() {
            self.lit = want;
        }
    }

    pub fn is_on(&self) -> bool {
        self.lit
    }
}
