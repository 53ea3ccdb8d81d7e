//! Register map and fixed capture geometry of the microphone array.
//!
//! The array free-runs once powered: every `PERIOD_FRAMES` frames it raises an
//! interrupt and exposes one channel-major fragment at [`regs::CAPTURE_FIFO`].
//! Nothing here can be changed at runtime; the capability block in
//! [`crate::models::config`] may only narrow these limits.

/// Number of microphones on the array.
pub const CHANNELS_MAX: u16 = 8;

/// Bytes per sample. The device only produces signed 16-bit little-endian.
pub const SAMPLE_BYTES: usize = 2;

/// Frames the hardware delivers per interrupt. The device has no other period length.
pub const PERIOD_FRAMES: usize = 128;

/// Size of one channel's slice of a fragment.
pub const PERIOD_BYTES_PER_CHANNEL: usize = PERIOD_FRAMES * SAMPLE_BYTES;

/// Largest fragment the device can produce (all channels enabled).
pub const FRAGMENT_BYTES_MAX: usize = PERIOD_BYTES_PER_CHANNEL * CHANNELS_MAX as usize;

pub const MIN_PERIODS: usize = 2;

pub const BUFFER_BYTES_MAX: usize = 32 * 1024;

pub const MAX_PERIODS: usize = BUFFER_BYTES_MAX / PERIOD_BYTES_PER_CHANNEL;

/// PDM clock feeding the decimator. Output rate = `PDM_CLOCK_HZ / (decimation + 1)`.
pub const PDM_CLOCK_HZ: u32 = 3_000_000;

/// Number of taps in each FIR coefficient set.
pub const FIR_TAP_COUNT: usize = 128;

/// Register offsets as addressed through the transport.
pub mod regs {
    pub const CONF_BASE: u16 = 0x0000;
    pub const MICARRAY_BASE: u16 = 0x2000;

    pub const DECIMATION: u16 = CONF_BASE + 0x06;
    pub const GAIN: u16 = CONF_BASE + 0x07;

    /// Reads drain the current fragment.
    pub const CAPTURE_FIFO: u16 = MICARRAY_BASE;
    /// Writes load a full FIR coefficient set.
    pub const FIR_COEFFS: u16 = MICARRAY_BASE;
}

/// Bytes in one period for `channels` interleaved channels.
pub const fn period_bytes(channels: u16) -> usize {
    PERIOD_BYTES_PER_CHANNEL * channels as usize
}

/// Bytes in one interleaved frame.
pub const fn frame_bytes(channels: u16) -> usize {
    SAMPLE_BYTES * channels as usize
}
