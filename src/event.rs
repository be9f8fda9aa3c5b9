//! Events embedded in a process call's audio buffer.

/// An event scheduled at a sample offset within the current process buffer. Kernels
/// receive these through a pull generator (any `Iterator<Item = AudioEvent>`) that
/// yields them in non-decreasing `timing` order and is consumed exactly once per
/// process call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioEvent {
    /// Set a parameter to a new value at the given offset.
    ParameterChange {
        timing: i64,
        address: u64,
        value: f32,
    },
    /// Ramp a parameter towards a new value, reaching it `ramp_frames` samples after
    /// the event's offset.
    RampedParameterChange {
        timing: i64,
        address: u64,
        value: f32,
        ramp_frames: u32,
    },
    /// A structural MIDI message, passed through to the kernel without interpretation.
    /// SysEx is unsupported, so a message is at most three bytes.
    MidiMessage {
        timing: i64,
        /// The virtual cable the message arrived on.
        cable: u8,
        /// How many of the bytes in `data` are meaningful, in `[0, 3]`.
        valid_bytes: u16,
        data: [u8; 3],
    },
}

impl AudioEvent {
    /// The event's sample offset within the current process buffer.
    pub fn timing(&self) -> i64 {
        match self {
            AudioEvent::ParameterChange { timing, .. } => *timing,
            AudioEvent::RampedParameterChange { timing, .. } => *timing,
            AudioEvent::MidiMessage { timing, .. } => *timing,
        }
    }
}
