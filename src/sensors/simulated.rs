//! Synthetic load-cell waveforms for bench testing without hardware.
//!
//! Each bin follows a distinct, slowly varying profile so dashboards show
//! plausible fill behaviour: a filling bin, an oscillating bin, a nearly
//! full bin, a mostly-empty bin with spikes, a draining bin, and a busy
//! bin.  A seeded small PRNG adds ±0.1 kg of noise.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::config::MAX_BINS;

const NOISE_AMPLITUDE_KG: f32 = 0.1;

/// Noise-free weight in kg for `channel` at `t_ms` since boot.
pub fn waveform(channel: usize, t_ms: u64) -> f32 {
    let t = t_ms as f32;
    match channel {
        0 => 5.0 + t / 60_000.0 * 0.1,
        1 => 15.0 + (t / 30_000.0).sin() * 2.0,
        2 => 28.0 + (t / 45_000.0).sin(),
        3 => 0.5 + if (t / 120_000.0).sin() > 0.8 { 2.0 } else { 0.0 },
        4 => (20.0 - t / 90_000.0 * 0.05).max(0.0),
        5 => 10.0 + (t / 20_000.0).sin() * 5.0 + (t / 35_000.0).cos() * 3.0,
        _ => 0.0,
    }
}

/// Seeded so a bench run replays the same trace.
pub fn noise_source(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

/// Uniform sample in `[-0.1, 0.1]`.
pub fn noise(rng: &mut impl Rng) -> f32 {
    rng.random_range(-NOISE_AMPLITUDE_KG..=NOISE_AMPLITUDE_KG)
}

/// Waveform plus noise, clamped at zero.
pub fn sample(channel: usize, t_ms: u64, rng: &mut impl Rng) -> f32 {
    if channel >= MAX_BINS {
        return 0.0;
    }
    (waveform(channel, t_ms) + noise(rng)).max(0.0)
}
