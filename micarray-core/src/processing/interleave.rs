//! Fragment layout conversion.
//!
//! The array hands out each fragment channel-major (all of channel 0's frames,
//! then channel 1's, ...). The host expects frame-major interleaved samples.

use crate::hardware::SAMPLE_BYTES;

/// Interleave a channel-major fragment of `frames` frames into `out`.
///
/// Only the first `channels` channel slices of `fragment` are used. `out` must
/// hold exactly `channels * frames` samples. Samples are copied bytewise, so
/// their encoding is preserved as delivered.
pub fn interleave_fragment(fragment: &[u8], channels: usize, frames: usize, out: &mut [u8]) {
    debug_assert!(fragment.len() >= channels * frames * SAMPLE_BYTES);
    debug_assert_eq!(out.len(), channels * frames * SAMPLE_BYTES);

    for (i, sample) in out.chunks_exact_mut(SAMPLE_BYTES).enumerate() {
        let frame = i / channels;
        let channel = i % channels;
        let src = (channel * frames + frame) * SAMPLE_BYTES;
        sample.copy_from_slice(&fragment[src..src + SAMPLE_BYTES]);
    }
}
