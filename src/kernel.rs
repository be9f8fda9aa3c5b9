//! The abstract contract a DSP kernel and its factory have to satisfy.

use crate::buffer::DeinterleavedAudio;
use crate::event::AudioEvent;
use crate::params::{ParamInfo, ParameterSet};

/// The core of the DSP processing. A kernel is a single threaded object: only the DSP
/// thread calls into it, and the wrapper enforces that by keeping it behind the DSP
/// lock.
pub trait Kernel: ParameterSet + Send {
    /// Restore the kernel to its initial steady state. May allocate.
    fn reset(&mut self);

    /// Consume the event generator and produce output samples into the planar buffers.
    /// The generator yields events in non-decreasing `timing` order and is consumed
    /// exactly once; events are applied at their sample offset within this buffer.
    ///
    /// This is called on a realtime thread, so it may not block or allocate on the
    /// steady-state path.
    fn process(
        &mut self,
        audio: DeinterleavedAudio<'_, '_>,
        events: &mut dyn Iterator<Item = AudioEvent>,
    );

    /// The kernel's current processing latency in samples.
    fn latency(&self) -> u64;
}

/// Whether a kernel produces sound on its own or transforms an input signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelType {
    Effect,
    Instrument,
}

/// One side of a channel configuration: either a concrete channel count, or a wildcard
/// matching any positive count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCount {
    Any,
    Count(u32),
}

impl ChannelCount {
    fn matches(&self, channels: u32) -> bool {
        match self {
            ChannelCount::Any => channels > 0,
            ChannelCount::Count(count) => *count == channels,
        }
    }
}

/// An input/output channel-count pair the kernel is willing to be instantiated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub inputs: ChannelCount,
    pub outputs: ChannelCount,
}

impl ChannelConfig {
    /// Whether this configuration covers a concrete bus layout. Used by host adaptors
    /// to validate a layout against [`KernelInfo::channel_configs`].
    pub fn supports(&self, inputs: u32, outputs: u32) -> bool {
        self.inputs.matches(inputs) && self.outputs.matches(outputs)
    }
}

/// Static information a factory advertises about the kernels it creates.
#[derive(Debug, Clone)]
pub struct KernelInfo {
    pub kernel_type: KernelType,
    /// The channel configurations the kernel can be instantiated with.
    pub channel_configs: Vec<ChannelConfig>,
    /// Descriptors for every parameter, in declaration order.
    pub params: Vec<ParamInfo>,
    /// The address of the parameter hosts should bind their bypass control to, if the
    /// kernel has one.
    pub bypass_param: Option<u64>,
}

/// Creates kernels and describes them to the host.
pub trait KernelFactory {
    fn info(&self) -> &KernelInfo;

    /// Instantiate a kernel for a concrete bus layout and sample rate. Construction is
    /// the one fallible operation at this boundary; a kernel that could not be created
    /// must not be used in any way.
    fn make_kernel(
        &self,
        input_channels: u32,
        output_channels: u32,
        sample_rate: f64,
    ) -> anyhow::Result<Box<dyn Kernel>>;
}
