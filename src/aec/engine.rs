// Echo cancellation engine seam
// The cancellation math is external; the coordinator only sees this trait

/// Shape of one block handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Sampling rate shared by mic and reference
    pub sampling_rate: u32,
    /// Interleaved channels shared by mic and reference
    pub channels: u16,
    /// Frames in the block
    pub frames: usize,
}

impl BlockLayout {
    /// Total interleaved samples in the block
    pub fn samples(&self) -> usize {
        self.frames * self.channels as usize
    }
}

/// Black-box echo canceller driven by the coordinator thread.
///
/// `mic`, `reference` and `output` all hold `layout.samples()` interleaved
/// samples normalized to [-1.0, 1.0). Implementations run on the worker
/// thread and may take longer than a capture period; the session fails open
/// when they exceed the configured budget.
pub trait EchoCanceller: Send {
    /// Remove the reference's echo from `mic`, writing the result to `output`
    fn cancel(&mut self, layout: BlockLayout, mic: &[f32], reference: &[f32], output: &mut [f32]);
}

/// Engine that copies the microphone signal through unchanged.
///
/// Used for bring-up when no cancellation engine is linked in.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCanceller;

impl EchoCanceller for PassthroughCanceller {
    fn cancel(&mut self, _layout: BlockLayout, mic: &[f32], _reference: &[f32], output: &mut [f32]) {
        output.copy_from_slice(mic);
    }
}
