// Re-export the macros, the rest comes from their respective modules
pub use crate::debug::*;

pub use crate::util;

pub use crate::buffer::DeinterleavedAudio;
pub use crate::event::AudioEvent;
pub use crate::event_stream::{event_channel, EventEmitter, EventStream, SubscriptionToken};
pub use crate::kernel::{
    ChannelConfig, ChannelCount, Kernel, KernelFactory, KernelInfo, KernelType,
};
pub use crate::params::{
    apply_defaults, default_state, param_state, set_param_state, IndexedInfo, NumericInfo,
    NumericUnit, ParamFlags, ParamInfo, ParamKind, ParamState, ParameterSet,
};
pub use crate::wrapper::{GrabbedParameter, HostInterface, UiParameterSet, WrappedKernel};
