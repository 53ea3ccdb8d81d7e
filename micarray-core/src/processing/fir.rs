//! FIR coefficient sets loaded into the array's post-decimation filter.
//!
//! One set per supported rate. The sets are designed once, on first use, and
//! are immutable afterwards; the hardware applies them, the host never does.

use std::f64::consts::PI;
use std::sync::OnceLock;

use crate::hardware::{FIR_TAP_COUNT, PDM_CLOCK_HZ, SAMPLE_BYTES};
use crate::processing::rate_table::RATE_TABLE;

/// Rate at which the FIR stage runs (PDM clock after the fixed 8x front-end stage).
const FIR_STAGE_RATE_HZ: f64 = PDM_CLOCK_HZ as f64 / 8.0;

/// Passband edge as a fraction of the target sample rate.
const CUTOFF_RATIO: f64 = 0.45;

const Q15_ONE: f64 = 32767.0;

/// A 128-tap Q15 linear-phase low-pass set for one output rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirCoefficients {
    rate: u32,
    taps: [i16; FIR_TAP_COUNT],
}

impl FirCoefficients {
    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn taps(&self) -> &[i16; FIR_TAP_COUNT] {
        &self.taps
    }

    /// Register image: taps as consecutive little-endian words.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FIR_TAP_COUNT * SAMPLE_BYTES);
        for tap in self.taps {
            bytes.extend_from_slice(&tap.to_le_bytes());
        }
        bytes
    }

    /// Gain at 0 Hz, 1.0 being unity.
    pub fn dc_gain(&self) -> f64 {
        self.taps.iter().map(|&t| f64::from(t)).sum::<f64>() / Q15_ONE
    }

    /// Blackman-windowed sinc, normalised to unity DC gain, quantised to Q15.
    fn design(rate: u32) -> Self {
        let cutoff = CUTOFF_RATIO * f64::from(rate) / FIR_STAGE_RATE_HZ;
        let last = (FIR_TAP_COUNT - 1) as f64;
        let center = last / 2.0;

        // Compute one half and mirror it so the set is exactly symmetric.
        let mut ideal = [0.0f64; FIR_TAP_COUNT];
        for n in 0..FIR_TAP_COUNT / 2 {
            let m = n as f64 - center;
            let x = 2.0 * cutoff * m;
            let sinc = if x == 0.0 { 1.0 } else { (PI * x).sin() / (PI * x) };
            let phase = 2.0 * PI * n as f64 / last;
            let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
            let h = 2.0 * cutoff * sinc * window;
            ideal[n] = h;
            ideal[FIR_TAP_COUNT - 1 - n] = h;
        }

        let sum: f64 = ideal.iter().sum();
        let mut taps = [0i16; FIR_TAP_COUNT];
        for (tap, h) in taps.iter_mut().zip(ideal) {
            *tap = (h / sum * Q15_ONE)
                .round()
                .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
        }

        Self { rate, taps }
    }
}

/// All sets, index-aligned with [`RATE_TABLE`].
pub(crate) fn coefficient_sets() -> &'static [FirCoefficients; RATE_TABLE.len()] {
    static SETS: OnceLock<[FirCoefficients; RATE_TABLE.len()]> = OnceLock::new();
    SETS.get_or_init(|| RATE_TABLE.map(|entry| FirCoefficients::design(entry.rate)))
}
