//! Parameter descriptors and the address-keyed state model shared by the kernel, the
//! wrapper, and the UI surface.

use std::collections::BTreeMap;

/// A snapshot of every declared parameter's value, keyed by address. Two snapshots are
/// always well defined: the default state derived from the descriptors, and the current
/// state read out of any [`ParameterSet`].
pub type ParamState = BTreeMap<u64, f32>;

bitflags::bitflags! {
    /// Flags for controlling a parameter's behavior. These cross the factory boundary
    /// as a plain bitfield, so unknown bits are dropped on the way in.
    #[repr(transparent)]
    #[derive(Default)]
    pub struct ParamFlags: u32 {
        /// The kernel can interpolate towards new values of this parameter, so hosts
        /// may send it ramped changes.
        const CAN_RAMP = 1 << 0;
        /// The parameter cannot be changed from an automation lane. The parameter can
        /// however still be manually changed by the user from the plugin's own UI.
        const NON_AUTOMATABLE = 1 << 1;
        /// Hides the parameter in the host's generic UI for this plugin.
        const HIDDEN = 1 << 2;
        /// The host should offer extra precision when displaying and editing this
        /// parameter.
        const HIGH_RESOLUTION = 1 << 3;
    }
}

/// The unit attached to a numeric parameter. Either one of the well-known units that
/// hosts render natively, or a custom label string. A custom label always wins over a
/// unit code when both are advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumericUnit {
    Generic,
    Percent,
    Seconds,
    Milliseconds,
    Hertz,
    Decibels,
    LinearGain,
    Bpm,
    /// A free-form unit label, rendered verbatim after the value.
    Custom(String),
}

/// The numeric variant body of a parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericInfo {
    pub min: f64,
    pub max: f64,
    pub unit: NumericUnit,
    pub default: f64,
}

/// The indexed variant body of a parameter descriptor. The parameter's float value
/// encodes an integer index into `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedInfo {
    /// Display labels for each selectable value, in index order.
    pub values: Vec<String>,
    pub default: usize,
}

impl IndexedInfo {
    /// Map a slot value back to an index into [`values`][Self::values]. Returns `None`
    /// for values that don't round to a valid index.
    pub fn index_of(&self, value: f32) -> Option<usize> {
        let index = value.round();
        if index >= 0.0 && (index as usize) < self.values.len() {
            Some(index as usize)
        } else {
            None
        }
    }
}

/// The variant body of a parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Numeric(NumericInfo),
    Indexed(IndexedInfo),
}

/// Describes a single parameter. Descriptors are produced by the kernel factory and are
/// immutable from then on; everything else in the crate refers to parameters by their
/// `address`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    /// A stable string identifier for this parameter.
    pub id: String,
    /// The stable 64-bit address used to refer to this parameter everywhere else.
    /// Unique within a plugin instance.
    pub address: u64,
    /// The parameter's human readable display name.
    pub name: String,
    pub flags: ParamFlags,
    pub kind: ParamKind,
    /// Addresses of parameters whose display depends on this parameter's value.
    pub dependents: Vec<u64>,
}

impl ParamInfo {
    /// Build a numeric descriptor. Use the `with_*` functions to fill in the optional
    /// fields.
    pub fn numeric(
        id: impl Into<String>,
        address: u64,
        name: impl Into<String>,
        min: f64,
        max: f64,
        default: f64,
    ) -> Self {
        Self {
            id: id.into(),
            address,
            name: name.into(),
            flags: ParamFlags::default(),
            kind: ParamKind::Numeric(NumericInfo {
                min,
                max,
                unit: NumericUnit::Generic,
                default,
            }),
            dependents: Vec::new(),
        }
    }

    /// Build an indexed descriptor from its value labels.
    pub fn indexed(
        id: impl Into<String>,
        address: u64,
        name: impl Into<String>,
        values: Vec<String>,
        default: usize,
    ) -> Self {
        frazil_debug_assert!(default < values.len() || values.is_empty());
        Self {
            id: id.into(),
            address,
            name: name.into(),
            flags: ParamFlags::default(),
            kind: ParamKind::Indexed(IndexedInfo { values, default }),
            dependents: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Attach a unit to a numeric descriptor. Does nothing for indexed descriptors.
    pub fn with_unit(mut self, unit: NumericUnit) -> Self {
        match &mut self.kind {
            ParamKind::Numeric(info) => info.unit = unit,
            ParamKind::Indexed(_) => frazil_debug_assert_failure!(
                "Tried to attach a unit to the indexed parameter \"{}\"",
                self.id
            ),
        }
        self
    }

    pub fn with_dependents(mut self, dependents: Vec<u64>) -> Self {
        self.dependents = dependents;
        self
    }

    /// The default slot value for this parameter. For indexed parameters this is the
    /// default index encoded as a float.
    pub fn default_value(&self) -> f32 {
        match &self.kind {
            ParamKind::Numeric(info) => info.default as f32,
            ParamKind::Indexed(info) => info.default as f32,
        }
    }
}

/// A bidirectional key-value store over parameter addresses. Passing an address that is
/// not part of the factory's declared descriptor list is a programmer error; the value
/// read back for one is unspecified.
pub trait ParameterSet {
    fn set_parameter(&self, address: u64, value: f32);
    fn get_parameter(&self, address: u64) -> f32;
}

/// Derive the default state from a descriptor list.
pub fn default_state(params: &[ParamInfo]) -> ParamState {
    params
        .iter()
        .map(|param| (param.address, param.default_value()))
        .collect()
}

/// Snapshot the current state of `set` over the declared descriptor list.
pub fn param_state<S: ParameterSet + ?Sized>(set: &S, params: &[ParamInfo]) -> ParamState {
    params
        .iter()
        .map(|param| (param.address, set.get_parameter(param.address)))
        .collect()
}

/// Write a full state snapshot into `set`. The state is expected to be dense over the
/// descriptor list; missing addresses are skipped.
pub fn set_param_state<S: ParameterSet + ?Sized>(
    set: &S,
    state: &ParamState,
    params: &[ParamInfo],
) {
    for param in params {
        match state.get(&param.address) {
            Some(value) => set.set_parameter(param.address, *value),
            None => frazil_debug_assert_failure!(
                "Missing value for parameter {} while applying a state snapshot",
                param.address
            ),
        }
    }
}

/// Reset every declared parameter in `set` to its descriptor default.
pub fn apply_defaults<S: ParameterSet + ?Sized>(set: &S, params: &[ParamInfo]) {
    set_param_state(set, &default_state(params), params);
}
