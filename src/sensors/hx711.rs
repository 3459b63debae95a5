//! HX711 load-cell bank.
//!
//! Each bin has its own HX711 (PD_SCK + DOUT pair) driven by the
//! `loadcell` crate.  The bank exposes them to the sensor manager as one
//! indexed [`LoadCellPort`].  Tare and scaling stay in
//! [`SensorManager`](super::SensorManager) so they can be persisted per
//! bin; only raw counts are read here.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use loadcell::LoadCell;
use loadcell::hx711::HX711;

use crate::app::ports::LoadCellPort;
use crate::config::MAX_BINS;
use crate::error::SensorError;

/// Upper bound on one wait for a conversion.  At 10 SPS a conversion
/// takes 100 ms.
const READY_TIMEOUT_US: u32 = 150_000;
const READY_POLL_US: u32 = 200;

/// One HX711 per bin, in channel order.  `W` paces the wait for DOUT.
pub struct Hx711Bank<SCK, DOUT, D, W> {
    cells: heapless::Vec<HX711<SCK, DOUT, D>, MAX_BINS>,
    wait: W,
}

impl<SCK, DOUT, D, W> Hx711Bank<SCK, DOUT, D, W> {
    /// Cells beyond `MAX_BINS` are ignored.
    pub fn new(cells: impl IntoIterator<Item = HX711<SCK, DOUT, D>>, wait: W) -> Self {
        let mut bank = heapless::Vec::new();
        for cell in cells {
            if bank.push(cell).is_err() {
                break;
            }
        }
        Self { cells: bank, wait }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<SCK, DOUT, D, W> LoadCellPort for Hx711Bank<SCK, DOUT, D, W>
where
    SCK: OutputPin,
    DOUT: InputPin,
    D: DelayNs,
    HX711<SCK, DOUT, D>: LoadCell<Offset = i32>,
    W: DelayNs,
{
    fn is_ready(&mut self, channel: usize) -> bool {
        self.cells.get_mut(channel).is_some_and(|cell| cell.is_ready())
    }

    /// Waits up to one conversion period for DOUT, then clocks it out.
    fn read_raw(&mut self, channel: usize) -> Result<i32, SensorError> {
        let cell = self.cells.get_mut(channel).ok_or(SensorError::InvalidChannel)?;
        let mut waited_us = 0;
        while !cell.is_ready() {
            if waited_us >= READY_TIMEOUT_US {
                return Err(SensorError::NotReady);
            }
            self.wait.delay_us(READY_POLL_US);
            waited_us += READY_POLL_US;
        }
        cell.read().map_err(|_| SensorError::NotReady)
    }
}
