use serde::{Deserialize, Serialize};

use crate::hardware::{self, PERIOD_FRAMES};
use crate::models::error::CaptureError;
use crate::processing::rate_table::{RATE_MAX, RATE_MIN};

/// Inclusive `min..=max` bound as it appears in a capability block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> ValueRange<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }

    fn is_ordered(&self) -> bool {
        self.min <= self.max
    }

    fn is_within(&self, outer: &Self) -> bool {
        outer.min <= self.min && self.max <= outer.max
    }
}

/// Hardware capability description handed to the host framework.
///
/// The defaults are the physical limits of the array. A deployment may load a
/// narrower block (e.g. to cap channel count), but never a wider one; see
/// [`HardwareCapabilities::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HardwareCapabilities {
    /// Sample rate bounds in Hz. Rates inside the range still need an exact table entry.
    pub rate_range: ValueRange<u32>,

    pub channel_range: ValueRange<u16>,

    pub period_bytes_range: ValueRange<usize>,

    pub period_count_range: ValueRange<usize>,

    pub buffer_bytes_max: usize,
}

impl HardwareCapabilities {
    /// Physical limits of the device.
    pub fn physical() -> Self {
        Self {
            rate_range: ValueRange::new(RATE_MIN, RATE_MAX),
            channel_range: ValueRange::new(1, hardware::CHANNELS_MAX),
            period_bytes_range: ValueRange::new(
                hardware::period_bytes(1),
                hardware::period_bytes(hardware::CHANNELS_MAX),
            ),
            period_count_range: ValueRange::new(hardware::MIN_PERIODS, hardware::MAX_PERIODS),
            buffer_bytes_max: hardware::BUFFER_BYTES_MAX,
        }
    }

    /// Parse and validate a JSON capability block.
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let caps: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::InvalidParameter(format!("capability block: {e}")))?;
        caps.validate().map_err(CaptureError::InvalidParameter)?;
        Ok(caps)
    }

    pub fn validate(&self) -> Result<(), String> {
        let physical = Self::physical();

        if !self.rate_range.is_ordered() || !self.rate_range.is_within(&physical.rate_range) {
            return Err(format!(
                "rate range {}..={} outside {}..={}",
                self.rate_range.min, self.rate_range.max, RATE_MIN, RATE_MAX
            ));
        }
        if !self.channel_range.is_ordered() || !self.channel_range.is_within(&physical.channel_range) {
            return Err(format!(
                "channel range {}..={} outside 1..={}",
                self.channel_range.min,
                self.channel_range.max,
                hardware::CHANNELS_MAX
            ));
        }
        if !self.period_bytes_range.is_ordered()
            || !self.period_bytes_range.is_within(&physical.period_bytes_range)
        {
            return Err(format!(
                "period bytes range {}..={} outside {}..={}",
                self.period_bytes_range.min,
                self.period_bytes_range.max,
                physical.period_bytes_range.min,
                physical.period_bytes_range.max
            ));
        }
        if !self.period_count_range.is_ordered()
            || !self.period_count_range.is_within(&physical.period_count_range)
        {
            return Err(format!(
                "period count range {}..={} outside {}..={}",
                self.period_count_range.min,
                self.period_count_range.max,
                hardware::MIN_PERIODS,
                hardware::MAX_PERIODS
            ));
        }
        if self.buffer_bytes_max > hardware::BUFFER_BYTES_MAX {
            return Err(format!(
                "buffer_bytes_max {} exceeds {}",
                self.buffer_bytes_max,
                hardware::BUFFER_BYTES_MAX
            ));
        }
        if self.buffer_bytes_max < self.period_bytes_range.min * self.period_count_range.min {
            return Err(format!(
                "buffer_bytes_max {} cannot hold the smallest legal buffer",
                self.buffer_bytes_max
            ));
        }
        Ok(())
    }
}

impl Default for HardwareCapabilities {
    fn default() -> Self {
        Self::physical()
    }
}

/// Full stream negotiation in one call, as the host's hw_params step hands it over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParams {
    pub rate: u32,
    pub channels: u16,
    pub period_bytes: usize,
    pub period_count: usize,
}

/// Accepted ring buffer geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferLayout {
    pub channels: u16,
    pub period_bytes: usize,
    pub period_count: usize,
}

impl BufferLayout {
    /// Validate a buffer request against the capability block and the fixed
    /// hardware period length.
    pub fn negotiate(
        caps: &HardwareCapabilities,
        channels: u16,
        period_bytes: usize,
        period_count: usize,
    ) -> Result<Self, CaptureError> {
        if !caps.period_bytes_range.contains(period_bytes) {
            return Err(CaptureError::InvalidParameter(format!(
                "period size {} bytes outside {}..={}",
                period_bytes, caps.period_bytes_range.min, caps.period_bytes_range.max
            )));
        }
        if !caps.period_count_range.contains(period_count) {
            return Err(CaptureError::InvalidParameter(format!(
                "period count {} outside {}..={}",
                period_count, caps.period_count_range.min, caps.period_count_range.max
            )));
        }
        let buffer_bytes = period_bytes.checked_mul(period_count).unwrap_or(usize::MAX);
        if buffer_bytes > caps.buffer_bytes_max {
            return Err(CaptureError::InvalidParameter(format!(
                "buffer of {} bytes exceeds {}",
                buffer_bytes, caps.buffer_bytes_max
            )));
        }
        if period_bytes % hardware::PERIOD_BYTES_PER_CHANNEL != 0 {
            return Err(CaptureError::InvalidParameter(format!(
                "period size {} bytes is not a multiple of the {}-byte fragment",
                period_bytes,
                hardware::PERIOD_BYTES_PER_CHANNEL
            )));
        }
        let required = hardware::period_bytes(channels);
        if period_bytes != required {
            return Err(CaptureError::InvalidParameter(format!(
                "need {} frames per period ({} bytes at {} channels), got {} bytes",
                PERIOD_FRAMES, required, channels, period_bytes
            )));
        }

        Ok(Self {
            channels,
            period_bytes,
            period_count,
        })
    }

    pub fn period_frames(&self) -> usize {
        PERIOD_FRAMES
    }

    pub fn buffer_frames(&self) -> usize {
        PERIOD_FRAMES * self.period_count
    }

    pub fn buffer_bytes(&self) -> usize {
        self.period_bytes * self.period_count
    }
}
