//! Sensor subsystem: per-bin load cells behind the [`SensorManager`].
//!
//! The manager owns a [`LoadCellPort`] (the HX711 bank on hardware, a mock
//! in tests) and turns raw 24-bit conversions into smoothed, validated
//! weights.  In simulation mode the hardware is never touched and the
//! readings come from [`simulated`] waveforms instead.

pub mod hx711;
pub mod scale_store;
pub mod simulated;

use embedded_hal::delay::DelayNs;
use log::{info, warn};
use rand::rngs::SmallRng;

use crate::app::ports::{ClockPort, LoadCellPort, StoragePort};
use crate::config::{DEFAULT_SCALE_FACTORS, DeviceConfig, MAX_BIN_CAPACITY_KG, MAX_BINS};
use crate::error::SensorError;

/// Rail values the HX711 reports when the bridge is open or saturated.
const RAIL_HIGH: i32 = 0x7F_FFFF;
const RAIL_LOW: i32 = -0x80_0000;

/// Settling time after power-up before polling DOUT.
const POWER_UP_SETTLE_MS: u32 = 100;
const DETECT_POLL_MS: u32 = 50;

const NOISE_SEED: u64 = 0x5EED_B175;

/// Latest reading for one bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub channel: usize,
    /// Kilograms.  For an invalid reading this is the last known-good value.
    pub weight_kg: f32,
    pub timestamp_ms: u64,
    pub valid: bool,
}

impl SensorReading {
    const fn empty(channel: usize) -> Self {
        Self { channel, weight_kg: 0.0, timestamp_ms: 0, valid: false }
    }
}

/// True when a raw conversion looks like a connected bridge.
pub fn is_plausible_raw(raw: i32) -> bool {
    raw != 0 && raw != RAIL_HIGH && raw != RAIL_LOW
}

pub fn is_valid_weight(weight_kg: f32) -> bool {
    (0.0..=MAX_BIN_CAPACITY_KG).contains(&weight_kg)
}

/// Fixed-weight moving average: N-1 parts old, 1 part new.
pub fn smooth(previous: f32, sample: f32, window: u8) -> f32 {
    let n = f32::from(window.max(1));
    (previous * (n - 1.0) + sample) / n
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorMode {
    Hardware,
    Simulated,
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    enabled: bool,
    scale_factor: f32,
    /// Tare offset in raw counts, captured at detection.
    offset: i32,
    /// Smoothed weight of the last valid reading.
    last_good_kg: Option<f32>,
    reading: SensorReading,
}

pub struct SensorManager<C> {
    cells: C,
    mode: SensorMode,
    channels: [Channel; MAX_BINS],
    smoothing_samples: u8,
    samples_per_reading: u8,
    calibration_samples: u8,
    detection_timeout_ms: u32,
    min_required: u8,
    noise: SmallRng,
}

impl<C: LoadCellPort> SensorManager<C> {
    pub fn new(cells: C, config: &DeviceConfig) -> Self {
        let channels = core::array::from_fn(|ch| Channel {
            enabled: false,
            scale_factor: DEFAULT_SCALE_FACTORS[ch],
            offset: 0,
            last_good_kg: None,
            reading: SensorReading::empty(ch),
        });
        Self {
            cells,
            mode: if config.simulate_sensors { SensorMode::Simulated } else { SensorMode::Hardware },
            channels,
            smoothing_samples: config.smoothing_samples,
            samples_per_reading: config.samples_per_reading,
            calibration_samples: config.calibration_samples,
            detection_timeout_ms: config.detection_timeout_ms,
            min_required: config.min_required_sensors,
            noise: simulated::noise_source(NOISE_SEED),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Replace the in-memory scale factors with the persisted ones.
    pub fn load_scale_factors(&mut self, storage: &impl StoragePort) {
        for (ch, factor) in scale_store::load_all(storage).into_iter().enumerate() {
            self.channels[ch].scale_factor = factor;
        }
    }

    /// Probe every channel and enable the ones that answer.
    ///
    /// In simulation mode every channel is enabled without touching the
    /// hardware.  Fails when fewer than the configured minimum respond.
    pub fn detect(&mut self, timer: &mut (impl ClockPort + DelayNs)) -> Result<usize, SensorError> {
        if self.mode == SensorMode::Simulated {
            for channel in &mut self.channels {
                channel.enabled = true;
            }
            info!("SENSORS: simulation mode, {} virtual bins", MAX_BINS);
            return Ok(MAX_BINS);
        }

        for ch in 0..MAX_BINS {
            let detected = self.detect_channel(ch, timer);
            self.channels[ch].enabled = detected;
            if detected {
                self.channels[ch].offset = match self.raw_average(ch, self.calibration_samples) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("SENSORS: bin {} tare failed: {}", ch, e);
                        0
                    }
                };
                info!(
                    "SENSORS: bin {} detected (offset {}, scale {})",
                    ch, self.channels[ch].offset, self.channels[ch].scale_factor
                );
            } else {
                info!("SENSORS: bin {} not detected, disabled", ch);
            }
        }

        let found = self.connected_sensor_count();
        if found < self.min_required as usize {
            return Err(SensorError::InsufficientSensors {
                found: found as u8,
                required: self.min_required,
            });
        }
        info!("SENSORS: {} of {} bins active", found, MAX_BINS);
        Ok(found)
    }

    /// Take a fresh reading on every enabled channel.
    pub fn update(&mut self, now_ms: u64) {
        for ch in 0..MAX_BINS {
            if !self.channels[ch].enabled {
                continue;
            }
            match self.mode {
                SensorMode::Simulated => self.update_simulated(ch, now_ms),
                SensorMode::Hardware => self.update_hardware(ch, now_ms),
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn mode(&self) -> SensorMode {
        self.mode
    }

    pub fn connected_sensor_count(&self) -> usize {
        self.channels.iter().filter(|c| c.enabled).count()
    }

    pub fn is_enabled(&self, channel: usize) -> bool {
        self.channels.get(channel).is_some_and(|c| c.enabled)
    }

    pub fn scale_factor(&self, channel: usize) -> Option<f32> {
        self.channels.get(channel).map(|c| c.scale_factor)
    }

    pub fn reading(&self, channel: usize) -> Option<SensorReading> {
        self.channels.get(channel).map(|c| c.reading)
    }

    pub fn all_readings(&self) -> [SensorReading; MAX_BINS] {
        core::array::from_fn(|ch| self.channels[ch].reading)
    }

    // ── Calibration ──────────────────────────────────────────

    /// Validate, persist and apply a new scale factor.  The in-memory
    /// value only changes once the write succeeded.
    pub fn set_scale_factor(
        &mut self,
        channel: usize,
        factor: f32,
        storage: &mut impl StoragePort,
    ) -> Result<(), SensorError> {
        if channel >= MAX_BINS {
            return Err(SensorError::InvalidChannel);
        }
        if !scale_store::is_valid_scale_factor(factor) {
            return Err(SensorError::InvalidScaleFactor);
        }
        scale_store::save(storage, channel, factor)?;
        self.channels[channel].scale_factor = factor;
        info!("SENSORS: bin {} scale factor set to {}", channel, factor);
        Ok(())
    }

    /// Derive and persist a scale factor from a known reference weight.
    pub fn calibrate(
        &mut self,
        channel: usize,
        known_weight_kg: f32,
        storage: &mut impl StoragePort,
    ) -> Result<f32, SensorError> {
        if channel >= MAX_BINS {
            return Err(SensorError::InvalidChannel);
        }
        if !self.channels[channel].enabled {
            return Err(SensorError::NotEnabled);
        }
        let loaded = match self.mode {
            SensorMode::Hardware => {
                let raw = self.raw_average(channel, self.calibration_samples)?;
                (raw - self.channels[channel].offset) as f32
            }
            SensorMode::Simulated => {
                let kg = self.channels[channel].reading.weight_kg;
                kg * self.channels[channel].scale_factor
            }
        };
        let factor = loaded / known_weight_kg;
        if !factor.is_finite() || factor <= 0.0 {
            warn!("SENSORS: bin {} calibration rejected (factor {})", channel, factor);
            return Err(SensorError::CalibrationFailed);
        }
        scale_store::save(storage, channel, factor)?;
        self.channels[channel].scale_factor = factor;
        info!("SENSORS: bin {} calibrated with {} kg, scale {}", channel, known_weight_kg, factor);
        Ok(factor)
    }

    // ── Internal ─────────────────────────────────────────────

    fn detect_channel(&mut self, ch: usize, timer: &mut (impl ClockPort + DelayNs)) -> bool {
        timer.delay_ms(POWER_UP_SETTLE_MS);

        let start = timer.uptime_ms();
        while !self.cells.is_ready(ch) {
            if timer.uptime_ms().saturating_sub(start) >= u64::from(self.detection_timeout_ms) {
                return false;
            }
            timer.delay_ms(DETECT_POLL_MS);
        }

        match self.cells.read_raw(ch) {
            Ok(raw) => is_plausible_raw(raw),
            Err(_) => false,
        }
    }

    fn raw_average(&mut self, ch: usize, samples: u8) -> Result<i32, SensorError> {
        let samples = samples.max(1);
        let mut sum: i64 = 0;
        for _ in 0..samples {
            sum += i64::from(self.cells.read_raw(ch)?);
        }
        Ok((sum / i64::from(samples)) as i32)
    }

    fn update_hardware(&mut self, ch: usize, now_ms: u64) {
        if !self.cells.is_ready(ch) {
            self.mark_invalid(ch, now_ms);
            return;
        }
        let raw = match self.raw_average(ch, self.samples_per_reading) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("SENSORS: bin {} read failed: {}", ch, e);
                self.mark_invalid(ch, now_ms);
                return;
            }
        };
        let channel = &self.channels[ch];
        let sample = (raw - channel.offset) as f32 / channel.scale_factor;
        self.accept_sample(ch, sample, now_ms);
    }

    fn update_simulated(&mut self, ch: usize, now_ms: u64) {
        let weight = simulated::sample(ch, now_ms, &mut self.noise);
        let channel = &mut self.channels[ch];
        if is_valid_weight(weight) {
            channel.last_good_kg = Some(weight);
            channel.reading = SensorReading { channel: ch, weight_kg: weight, timestamp_ms: now_ms, valid: true };
        } else {
            self.mark_invalid(ch, now_ms);
        }
    }

    /// Outliers are rejected before smoothing so they never enter the average.
    pub(crate) fn accept_sample(&mut self, ch: usize, sample: f32, now_ms: u64) {
        let window = self.smoothing_samples;
        let smoothed = match self.channels[ch].last_good_kg {
            Some(previous) => smooth(previous, sample, window),
            None => sample,
        };
        if !is_valid_weight(smoothed) {
            self.mark_invalid(ch, now_ms);
            return;
        }
        let channel = &mut self.channels[ch];
        channel.last_good_kg = Some(smoothed);
        channel.reading = SensorReading { channel: ch, weight_kg: smoothed, timestamp_ms: now_ms, valid: true };
    }

    fn mark_invalid(&mut self, ch: usize, now_ms: u64) {
        let channel = &mut self.channels[ch];
        channel.reading = SensorReading {
            channel: ch,
            weight_kg: channel.last_good_kg.unwrap_or(0.0),
            timestamp_ms: now_ms,
            valid: false,
        };
    }
}
