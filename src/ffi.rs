//! The C boundary to the native numeric engine that provides the actual kernel.
//!
//! The marshalling types and callback trampolines live here unconditionally; the
//! imported symbols and the [`Kernel`]/[`KernelFactory`] implementations on top of them
//! are gated behind the `extern_kernel` feature since they require linking against an
//! engine that exports the symbols.

use std::os::raw::{c_char, c_void};
use std::ptr;
use std::slice;

use crate::event::AudioEvent;
use crate::kernel::{ChannelConfig, ChannelCount};
use crate::params::{IndexedInfo, NumericInfo, NumericUnit, ParamFlags, ParamInfo, ParamKind};

#[cfg(feature = "extern_kernel")]
pub use self::extern_kernel::{FfiKernel, FfiKernelFactory};

/// Tag values for [`RawEvent::ty`].
pub const RAW_EVENT_PARAMETER_CHANGE: u64 = 0;
pub const RAW_EVENT_RAMPED_PARAMETER_CHANGE: u64 = 1;
pub const RAW_EVENT_MIDI_MESSAGE: u64 = 2;

/// The struct-shaped event handed to `process_kernel` through the pull callback. Only
/// the fields belonging to the variant selected by `ty` are meaningful; the rest stay
/// zeroed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawEvent {
    pub time: i64,
    pub ty: u64,

    pub param_addr: u64,
    pub param_value: f64,
    pub param_ramp_frames: u32,

    pub midi_cable: u8,
    pub midi_valid_bytes: u16,
    pub midi_bytes: [u8; 3],
}

impl RawEvent {
    const fn zeroed() -> Self {
        Self {
            time: 0,
            ty: RAW_EVENT_PARAMETER_CHANGE,
            param_addr: 0,
            param_value: 0.0,
            param_ramp_frames: 0,
            midi_cable: 0,
            midi_valid_bytes: 0,
            midi_bytes: [0; 3],
        }
    }
}

impl From<AudioEvent> for RawEvent {
    fn from(event: AudioEvent) -> Self {
        let mut raw = RawEvent::zeroed();
        match event {
            AudioEvent::ParameterChange {
                timing,
                address,
                value,
            } => {
                raw.time = timing;
                raw.ty = RAW_EVENT_PARAMETER_CHANGE;
                raw.param_addr = address;
                raw.param_value = f64::from(value);
            }
            AudioEvent::RampedParameterChange {
                timing,
                address,
                value,
                ramp_frames,
            } => {
                raw.time = timing;
                raw.ty = RAW_EVENT_RAMPED_PARAMETER_CHANGE;
                raw.param_addr = address;
                raw.param_value = f64::from(value);
                raw.param_ramp_frames = ramp_frames;
            }
            AudioEvent::MidiMessage {
                timing,
                cable,
                valid_bytes,
                data,
            } => {
                frazil_debug_assert!(valid_bytes <= 3);
                raw.time = timing;
                raw.ty = RAW_EVENT_MIDI_MESSAGE;
                raw.midi_cable = cable;
                raw.midi_valid_bytes = valid_bytes;
                raw.midi_bytes = data;
            }
        }

        raw
    }
}

/// Adapts a pull generator to the engine's callback protocol: each call to
/// [`next_raw_event()`] marshals the generator's next event into scratch storage owned
/// by this context, and end-of-stream becomes a null pointer.
pub struct EventPullContext<'a> {
    generator: &'a mut dyn Iterator<Item = AudioEvent>,
    scratch: RawEvent,
}

impl<'a> EventPullContext<'a> {
    pub fn new(generator: &'a mut dyn Iterator<Item = AudioEvent>) -> Self {
        Self {
            generator,
            scratch: RawEvent::zeroed(),
        }
    }
}

/// The pull callback passed to `process_kernel`. `ctx` must point to the
/// [`EventPullContext`] for the current process call.
///
/// # Safety
///
/// The returned pointer is only valid until the next call with the same context.
pub unsafe extern "C" fn next_raw_event(ctx: *mut c_void) -> *const RawEvent {
    let ctx = &mut *(ctx as *mut EventPullContext);
    match ctx.generator.next() {
        Some(event) => {
            ctx.scratch = RawEvent::from(event);
            &ctx.scratch
        }
        None => ptr::null(),
    }
}

/// Descriptor collection callback for numeric parameters. `ctx` must point to the
/// `Vec<ParamInfo>` being filled.
///
/// # Safety
///
/// All pointer arguments must be valid for the duration of the call; `unit_label` may
/// be null.
pub unsafe extern "C" fn push_numeric_param(
    ctx: *mut c_void,
    id: *const c_char,
    address: u64,
    name: *const c_char,
    flags: u64,
    min: f64,
    max: f64,
    unit: u64,
    unit_label: *const c_char,
    default: f64,
    dependents: *const u64,
    dependent_count: u64,
) {
    let params = &mut *(ctx as *mut Vec<ParamInfo>);

    // An explicit label always wins over the unit code
    let unit = match owned_string(unit_label) {
        Some(label) if !label.is_empty() => NumericUnit::Custom(label),
        _ => unit_from_raw(unit),
    };

    params.push(ParamInfo {
        id: owned_string(id).unwrap_or_default(),
        address,
        name: owned_string(name).unwrap_or_default(),
        flags: ParamFlags::from_bits_truncate(flags as u32),
        kind: ParamKind::Numeric(NumericInfo {
            min,
            max,
            unit,
            default,
        }),
        dependents: owned_addresses(dependents, dependent_count),
    });
}

/// Descriptor collection callback for indexed parameters. `ctx` must point to the
/// `Vec<ParamInfo>` being filled.
///
/// # Safety
///
/// All pointer arguments must be valid for the duration of the call, and `values` must
/// point to `value_count` valid C strings.
pub unsafe extern "C" fn push_indexed_param(
    ctx: *mut c_void,
    id: *const c_char,
    address: u64,
    name: *const c_char,
    flags: u64,
    values: *const *const c_char,
    value_count: u64,
    default: u64,
    dependents: *const u64,
    dependent_count: u64,
) {
    let params = &mut *(ctx as *mut Vec<ParamInfo>);

    let values = if values.is_null() {
        Vec::new()
    } else {
        slice::from_raw_parts(values, value_count as usize)
            .iter()
            .map(|&value| owned_string(value).unwrap_or_default())
            .collect()
    };

    params.push(ParamInfo {
        id: owned_string(id).unwrap_or_default(),
        address,
        name: owned_string(name).unwrap_or_default(),
        flags: ParamFlags::from_bits_truncate(flags as u32),
        kind: ParamKind::Indexed(IndexedInfo {
            values,
            default: default as usize,
        }),
        dependents: owned_addresses(dependents, dependent_count),
    });
}

/// Channel format collection callback. `ctx` must point to the `Vec<ChannelConfig>`
/// being filled. A negative count means "any positive channel count".
///
/// # Safety
///
/// `ctx` must point to a live `Vec<ChannelConfig>`.
pub unsafe extern "C" fn push_channel_config(ctx: *mut c_void, inputs: i32, outputs: i32) {
    let configs = &mut *(ctx as *mut Vec<ChannelConfig>);
    configs.push(ChannelConfig {
        inputs: channel_count_from_raw(inputs),
        outputs: channel_count_from_raw(outputs),
    });
}

fn channel_count_from_raw(count: i32) -> ChannelCount {
    if count >= 0 {
        ChannelCount::Count(count as u32)
    } else {
        ChannelCount::Any
    }
}

/// Map an AudioUnit-style unit code onto [`NumericUnit`]. Codes this crate has no
/// rendering for collapse to `Generic`.
fn unit_from_raw(unit: u64) -> NumericUnit {
    match unit {
        0 => NumericUnit::Generic,
        3 => NumericUnit::Percent,
        4 => NumericUnit::Seconds,
        8 => NumericUnit::Hertz,
        13 => NumericUnit::Decibels,
        14 => NumericUnit::LinearGain,
        22 => NumericUnit::Bpm,
        24 => NumericUnit::Milliseconds,
        _ => NumericUnit::Generic,
    }
}

unsafe fn owned_string(string: *const c_char) -> Option<String> {
    if string.is_null() {
        None
    } else {
        Some(
            std::ffi::CStr::from_ptr(string)
                .to_string_lossy()
                .into_owned(),
        )
    }
}

unsafe fn owned_addresses(addresses: *const u64, count: u64) -> Vec<u64> {
    if addresses.is_null() || count == 0 {
        Vec::new()
    } else {
        slice::from_raw_parts(addresses, count as usize).to_vec()
    }
}

#[cfg(feature = "extern_kernel")]
mod extern_kernel {
    use anyhow::Context;
    use std::ptr::NonNull;

    use super::*;
    use crate::buffer::DeinterleavedAudio;
    use crate::kernel::{Kernel, KernelFactory, KernelInfo, KernelType};
    use crate::params::ParameterSet;

    /// Opaque kernel handle owned by the engine.
    #[repr(C)]
    pub struct RawKernel {
        _private: [u8; 0],
    }

    extern "C" {
        fn create_kernel(input_count: u32, output_count: u32, sample_rate: f64)
            -> *mut RawKernel;
        fn delete_kernel(kernel: *mut RawKernel);

        fn set_kernel_parameter(kernel: *mut RawKernel, address: u64, value: f64);
        fn get_kernel_parameter(kernel: *const RawKernel, address: u64) -> f64;
        fn get_kernel_latency(kernel: *const RawKernel) -> u64;
        fn reset_kernel(kernel: *mut RawKernel);

        fn process_kernel(
            kernel: *mut RawKernel,
            buffers: *const *mut f32,
            channels: u64,
            samples: u64,
            event_ctx: *mut c_void,
            next_event: unsafe extern "C" fn(*mut c_void) -> *const RawEvent,
        );

        fn get_kernel_type() -> u32;
        fn get_kernel_allowed_channel_formats(
            ctx: *mut c_void,
            add_format: unsafe extern "C" fn(*mut c_void, i32, i32),
        );
        fn get_has_bypass_param() -> u64;
        fn get_bypass_param() -> u64;

        fn get_params(
            numeric_ctx: *mut c_void,
            add_numeric: unsafe extern "C" fn(
                *mut c_void,
                *const c_char,
                u64,
                *const c_char,
                u64,
                f64,
                f64,
                u64,
                *const c_char,
                f64,
                *const u64,
                u64,
            ),
            indexed_ctx: *mut c_void,
            add_indexed: unsafe extern "C" fn(
                *mut c_void,
                *const c_char,
                u64,
                *const c_char,
                u64,
                *const *const c_char,
                u64,
                u64,
                *const u64,
                u64,
            ),
        );
    }

    /// A [`Kernel`] backed by the engine's opaque handle.
    pub struct FfiKernel {
        handle: NonNull<RawKernel>,
        /// Reused between process calls so the planar pointer array does not get
        /// allocated on the audio thread.
        channel_ptrs: Vec<*mut f32>,
    }

    // The handle is only ever used from one thread at a time; the wrapper keeps it
    // behind the DSP lock
    unsafe impl Send for FfiKernel {}

    impl ParameterSet for FfiKernel {
        fn set_parameter(&self, address: u64, value: f32) {
            unsafe { set_kernel_parameter(self.handle.as_ptr(), address, f64::from(value)) };
        }

        fn get_parameter(&self, address: u64) -> f32 {
            unsafe { get_kernel_parameter(self.handle.as_ptr(), address) as f32 }
        }
    }

    impl Kernel for FfiKernel {
        fn reset(&mut self) {
            unsafe { reset_kernel(self.handle.as_ptr()) };
        }

        fn process(
            &mut self,
            mut audio: DeinterleavedAudio<'_, '_>,
            events: &mut dyn Iterator<Item = AudioEvent>,
        ) {
            frazil_debug_assert!(
                audio.channels() <= self.channel_ptrs.capacity(),
                "Process called with more channels than the kernel was created with"
            );

            let samples = audio.samples() as u64;
            self.channel_ptrs.clear();
            for channel in audio.as_slice().iter_mut() {
                self.channel_ptrs.push(channel.as_mut_ptr());
            }

            let mut event_ctx = EventPullContext::new(events);
            unsafe {
                process_kernel(
                    self.handle.as_ptr(),
                    self.channel_ptrs.as_ptr(),
                    self.channel_ptrs.len() as u64,
                    samples,
                    &mut event_ctx as *mut EventPullContext as *mut c_void,
                    next_raw_event,
                );
            }
        }

        fn latency(&self) -> u64 {
            unsafe { get_kernel_latency(self.handle.as_ptr()) }
        }
    }

    impl Drop for FfiKernel {
        fn drop(&mut self) {
            unsafe { delete_kernel(self.handle.as_ptr()) };
        }
    }

    /// A [`KernelFactory`] over the engine's exported entry points. The advertised
    /// info is queried once at construction.
    pub struct FfiKernelFactory {
        info: KernelInfo,
    }

    impl FfiKernelFactory {
        pub fn new() -> Self {
            let mut params: Vec<ParamInfo> = Vec::new();
            let params_ctx = &mut params as *mut Vec<ParamInfo> as *mut c_void;
            unsafe { get_params(params_ctx, push_numeric_param, params_ctx, push_indexed_param) };

            let mut channel_configs: Vec<ChannelConfig> = Vec::new();
            unsafe {
                get_kernel_allowed_channel_formats(
                    &mut channel_configs as *mut Vec<ChannelConfig> as *mut c_void,
                    push_channel_config,
                )
            };

            let kernel_type = match unsafe { get_kernel_type() } {
                0 => KernelType::Effect,
                1 => KernelType::Instrument,
                unknown => {
                    frazil_debug_assert_failure!("Unknown kernel type {}", unknown);
                    KernelType::Effect
                }
            };

            let bypass_param = if unsafe { get_has_bypass_param() } != 0 {
                Some(unsafe { get_bypass_param() })
            } else {
                None
            };

            Self {
                info: KernelInfo {
                    kernel_type,
                    channel_configs,
                    params,
                    bypass_param,
                },
            }
        }
    }

    impl Default for FfiKernelFactory {
        fn default() -> Self {
            Self::new()
        }
    }

    impl KernelFactory for FfiKernelFactory {
        fn info(&self) -> &KernelInfo {
            &self.info
        }

        fn make_kernel(
            &self,
            input_channels: u32,
            output_channels: u32,
            sample_rate: f64,
        ) -> anyhow::Result<Box<dyn Kernel>> {
            let handle = unsafe { create_kernel(input_channels, output_channels, sample_rate) };
            let handle = NonNull::new(handle).context("The engine failed to create a kernel")?;

            Ok(Box::new(FfiKernel {
                handle,
                channel_ptrs: Vec::with_capacity(input_channels.max(output_channels) as usize),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn pull_all(events: Vec<AudioEvent>) -> Vec<RawEvent> {
        let mut generator = events.into_iter();
        let mut ctx = EventPullContext::new(&mut generator);
        let ctx_ptr = &mut ctx as *mut EventPullContext as *mut c_void;

        let mut raw_events = Vec::new();
        loop {
            let event = unsafe { next_raw_event(ctx_ptr) };
            if event.is_null() {
                break;
            }
            raw_events.push(unsafe { *event });
        }

        raw_events
    }

    #[test]
    fn midi_event_marshals_and_terminates() {
        // One MIDI message, then end-of-stream
        let raw_events = pull_all(vec![AudioEvent::MidiMessage {
            timing: 10,
            cable: 0,
            valid_bytes: 3,
            data: [0x90, 0x3C, 0x7F],
        }]);

        assert_eq!(raw_events.len(), 1);
        let event = &raw_events[0];
        assert_eq!(event.ty, RAW_EVENT_MIDI_MESSAGE);
        assert_eq!(event.time, 10);
        assert_eq!(event.midi_cable, 0);
        assert_eq!(event.midi_valid_bytes, 3);
        assert_eq!(event.midi_bytes, [0x90, 0x3C, 0x7F]);
    }

    #[test]
    fn parameter_changes_carry_their_tags() {
        let raw_events = pull_all(vec![
            AudioEvent::ParameterChange {
                timing: 0,
                address: 42,
                value: 0.5,
            },
            AudioEvent::RampedParameterChange {
                timing: 16,
                address: 42,
                value: 1.0,
                ramp_frames: 64,
            },
        ]);

        assert_eq!(raw_events.len(), 2);
        assert_eq!(raw_events[0].ty, RAW_EVENT_PARAMETER_CHANGE);
        assert_eq!(raw_events[0].param_addr, 42);
        assert_eq!(raw_events[0].param_value, 0.5);
        assert_eq!(raw_events[1].ty, RAW_EVENT_RAMPED_PARAMETER_CHANGE);
        assert_eq!(raw_events[1].param_ramp_frames, 64);
    }

    #[test]
    fn empty_generator_is_immediately_exhausted() {
        assert_eq!(pull_all(vec![]), vec![]);
    }

    #[test]
    fn numeric_descriptor_collection() {
        let mut params: Vec<ParamInfo> = Vec::new();
        let id = CString::new("gain").unwrap();
        let name = CString::new("Gain").unwrap();
        let dependents = [7u64, 9u64];

        unsafe {
            push_numeric_param(
                &mut params as *mut Vec<ParamInfo> as *mut c_void,
                id.as_ptr(),
                1,
                name.as_ptr(),
                ParamFlags::CAN_RAMP.bits() as u64,
                -30.0,
                30.0,
                13,
                ptr::null(),
                0.0,
                dependents.as_ptr(),
                dependents.len() as u64,
            );
        }

        assert_eq!(params.len(), 1);
        let param = &params[0];
        assert_eq!(param.id, "gain");
        assert_eq!(param.address, 1);
        assert_eq!(param.name, "Gain");
        assert_eq!(param.flags, ParamFlags::CAN_RAMP);
        assert_eq!(param.dependents, vec![7, 9]);
        match &param.kind {
            ParamKind::Numeric(info) => {
                assert_eq!(info.min, -30.0);
                assert_eq!(info.max, 30.0);
                assert_eq!(info.unit, NumericUnit::Decibels);
                assert_eq!(info.default, 0.0);
            }
            ParamKind::Indexed(_) => unreachable!(),
        }
    }

    #[test]
    fn unit_label_overrides_the_unit_code() {
        let mut params: Vec<ParamInfo> = Vec::new();
        let id = CString::new("drive").unwrap();
        let name = CString::new("Drive").unwrap();
        let label = CString::new("gnarl").unwrap();

        unsafe {
            push_numeric_param(
                &mut params as *mut Vec<ParamInfo> as *mut c_void,
                id.as_ptr(),
                2,
                name.as_ptr(),
                0,
                0.0,
                10.0,
                13,
                label.as_ptr(),
                5.0,
                ptr::null(),
                0,
            );
        }

        match &params[0].kind {
            ParamKind::Numeric(info) => {
                assert_eq!(info.unit, NumericUnit::Custom("gnarl".to_owned()))
            }
            ParamKind::Indexed(_) => unreachable!(),
        }
    }

    #[test]
    fn indexed_descriptor_collection() {
        let mut params: Vec<ParamInfo> = Vec::new();
        let id = CString::new("mode").unwrap();
        let name = CString::new("Mode").unwrap();
        let labels = [
            CString::new("Clean").unwrap(),
            CString::new("Crunch").unwrap(),
        ];
        let label_ptrs: Vec<*const c_char> = labels.iter().map(|label| label.as_ptr()).collect();

        unsafe {
            push_indexed_param(
                &mut params as *mut Vec<ParamInfo> as *mut c_void,
                id.as_ptr(),
                3,
                name.as_ptr(),
                0,
                label_ptrs.as_ptr(),
                label_ptrs.len() as u64,
                1,
                ptr::null(),
                0,
            );
        }

        match &params[0].kind {
            ParamKind::Indexed(info) => {
                assert_eq!(info.values, vec!["Clean".to_owned(), "Crunch".to_owned()]);
                assert_eq!(info.default, 1);
            }
            ParamKind::Numeric(_) => unreachable!(),
        }
    }

    #[test]
    fn negative_channel_counts_are_wildcards() {
        let mut configs: Vec<ChannelConfig> = Vec::new();
        let ctx = &mut configs as *mut Vec<ChannelConfig> as *mut c_void;

        unsafe {
            push_channel_config(ctx, -1, 2);
            push_channel_config(ctx, 1, 1);
        }

        assert_eq!(
            configs,
            vec![
                ChannelConfig {
                    inputs: ChannelCount::Any,
                    outputs: ChannelCount::Count(2),
                },
                ChannelConfig {
                    inputs: ChannelCount::Count(1),
                    outputs: ChannelCount::Count(1),
                },
            ]
        );
    }
}
