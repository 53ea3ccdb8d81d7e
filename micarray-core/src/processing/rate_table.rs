//! Supported sample rates and the decimator/gain settings that produce them.

use crate::hardware::PDM_CLOCK_HZ;
use crate::processing::fir::{self, FirCoefficients};

/// One row of the rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateEntry {
    pub rate: u32,
    /// Decimator setting; output rate = `PDM_CLOCK_HZ / (decimation + 1)`.
    pub decimation: u16,
    /// Hardware gain shift, in bits.
    pub gain: u16,
}

impl RateEntry {
    /// Rate the decimator actually produces for this entry.
    pub fn effective_rate(&self) -> u32 {
        PDM_CLOCK_HZ / (u32::from(self.decimation) + 1)
    }
}

/// Sorted by rate; lookups binary-search it.
pub const RATE_TABLE: [RateEntry; 9] = [
    RateEntry { rate: 8000, decimation: 374, gain: 1 },
    RateEntry { rate: 12000, decimation: 249, gain: 2 },
    RateEntry { rate: 16000, decimation: 186, gain: 3 },
    RateEntry { rate: 22050, decimation: 135, gain: 5 },
    RateEntry { rate: 24000, decimation: 124, gain: 5 },
    RateEntry { rate: 32000, decimation: 92, gain: 6 },
    RateEntry { rate: 44100, decimation: 67, gain: 7 },
    RateEntry { rate: 48000, decimation: 61, gain: 7 },
    RateEntry { rate: 96000, decimation: 30, gain: 10 },
];

pub const RATE_MIN: u32 = RATE_TABLE[0].rate;
pub const RATE_MAX: u32 = RATE_TABLE[RATE_TABLE.len() - 1].rate;

/// A rate table hit: register settings plus the FIR set to load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateConfig {
    pub entry: RateEntry,
    pub fir: &'static FirCoefficients,
}

/// Exact-match lookup. There is no nearest-rate fallback.
pub fn lookup(rate: u32) -> Option<RateConfig> {
    let index = RATE_TABLE.binary_search_by_key(&rate, |e| e.rate).ok()?;
    Some(RateConfig {
        entry: RATE_TABLE[index],
        fir: &fir::coefficient_sets()[index],
    })
}

pub fn supported_rates() -> impl Iterator<Item = u32> {
    RATE_TABLE.iter().map(|e| e.rate)
}
