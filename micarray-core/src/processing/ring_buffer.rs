use crate::hardware::{self, PERIOD_FRAMES};
use crate::models::error::CaptureError;

/// Capture ring buffer shared with the host consumer.
///
/// A byte region of `capacity_frames` interleaved frames. The drain worker
/// writes whole periods at the published write position and wraps at
/// capacity; the consumer copies frames out behind it. Capacity is always a
/// whole number of periods, so a period never straddles the wrap point.
///
/// Lives inside the engine's drain lock; see
/// [`CaptureEngine`](crate::engine::CaptureEngine).
#[derive(Debug)]
pub struct RingBuffer {
    data: Vec<u8>,
    channels: u16,
    frame_bytes: usize,
    capacity_frames: usize,
}

impl RingBuffer {
    /// Reserve a buffer of `period_count` periods, zero-filled (silence).
    pub fn try_new(channels: u16, period_count: usize) -> Result<Self, CaptureError> {
        let frame_bytes = hardware::frame_bytes(channels);
        let capacity_frames = PERIOD_FRAMES * period_count;
        let len = frame_bytes * capacity_frames;
        if len == 0 {
            return Err(CaptureError::InvalidParameter("empty ring buffer".into()));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            CaptureError::AllocationFailure(format!("ring buffer of {len} bytes: {e}"))
        })?;
        data.resize(len, 0);

        Ok(Self {
            data,
            channels,
            frame_bytes,
            capacity_frames,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    pub fn period_bytes(&self) -> usize {
        self.frame_bytes * PERIOD_FRAMES
    }

    /// The period slot starting at `position` frames.
    ///
    /// `position` must be a period boundary inside the buffer.
    pub fn period_mut(&mut self, position: usize) -> &mut [u8] {
        debug_assert_eq!(position % PERIOD_FRAMES, 0);
        debug_assert!(position < self.capacity_frames);
        let start = position * self.frame_bytes;
        let end = start + self.period_bytes();
        &mut self.data[start..end]
    }

    /// Copy whole frames starting at `position` into `out`, wrapping at capacity.
    ///
    /// Returns the number of frames copied: `out.len() / frame_bytes`, capped at
    /// one full buffer.
    pub fn copy_frames(&self, position: usize, out: &mut [u8]) -> usize {
        let frames = (out.len() / self.frame_bytes).min(self.capacity_frames);
        let position = position % self.capacity_frames;

        let first = frames.min(self.capacity_frames - position);
        let head = first * self.frame_bytes;
        let start = position * self.frame_bytes;
        out[..head].copy_from_slice(&self.data[start..start + head]);

        let rest = (frames - first) * self.frame_bytes;
        out[head..head + rest].copy_from_slice(&self.data[..rest]);
        frames
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Fill with silence.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}
