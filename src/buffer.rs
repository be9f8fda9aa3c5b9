//! A borrowed view over the planar audio buffers handed to a process call.

/// Deinterleaved audio for one process call: one `f32` slice per channel, all of the
/// same length. The view does not own any sample memory; allocation and reuse of the
/// underlying buffers is the host adaptor's business.
pub struct DeinterleavedAudio<'slice, 'sample: 'slice> {
    /// The number of samples per channel. Stored separately so zero-channel layouts
    /// still carry a buffer length.
    num_samples: usize,

    channel_slices: &'slice mut [&'sample mut [f32]],
}

impl<'slice, 'sample> DeinterleavedAudio<'slice, 'sample> {
    /// Wrap a set of channel slices. All channels must have the same length.
    pub fn new(channel_slices: &'slice mut [&'sample mut [f32]]) -> Self {
        let num_samples = channel_slices.first().map(|slice| slice.len()).unwrap_or(0);
        frazil_debug_assert!(
            channel_slices.iter().all(|slice| slice.len() == num_samples),
            "Channel slices with unequal lengths"
        );

        Self {
            num_samples,
            channel_slices,
        }
    }

    /// The same as [`new()`][Self::new()], but for a known sample count without any
    /// channels, as used by zero-channel layouts.
    pub fn empty(num_samples: usize) -> DeinterleavedAudio<'static, 'static> {
        DeinterleavedAudio {
            num_samples,
            channel_slices: &mut [],
        }
    }

    /// Returns the number of samples per channel in this buffer.
    #[inline]
    pub fn samples(&self) -> usize {
        self.num_samples
    }

    /// Returns the number of channels in this buffer.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channel_slices.len()
    }

    /// Returns true if this buffer does not contain any samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_samples == 0
    }

    /// Obtain the raw channel slices.
    #[inline]
    pub fn as_slice(&mut self) -> &mut [&'sample mut [f32]] {
        self.channel_slices
    }

    /// The same as [`as_slice()`][Self::as_slice()], but for a non-mutable reference.
    #[inline]
    pub fn as_slice_immutable(&self) -> &[&'sample mut [f32]] {
        self.channel_slices
    }
}
