//! Keeps a UI-side copy of the kernel's parameters so both threads can manipulate them
//! concurrently. The two halves aim for eventual consistency: after one sync in each
//! direction with no further writes, the UI cache, the DSP cache, the atomic bridge,
//! and the kernel's own value all agree.

use atomic_float::AtomicF32;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::params::ParamInfo;

/// Create the two halves of a parameter mirror, both initialized to the descriptor
/// defaults. The UI half goes behind the UI lock, the DSP half behind the DSP lock;
/// they stay connected through one lock-free atomic slot per parameter.
pub fn param_mirror(params: &[ParamInfo]) -> (UiParamMirror, DspParamMirror) {
    let defaults: Vec<f32> = params.iter().map(|param| param.default_value()).collect();
    let shared = Arc::new(MirrorShared {
        addresses: params.iter().map(|param| param.address).collect(),
        index_by_address: params
            .iter()
            .enumerate()
            .map(|(index, param)| (param.address, index))
            .collect(),
        bridge: defaults.iter().map(|&value| AtomicF32::new(value)).collect(),
    });

    (
        UiParamMirror {
            shared: shared.clone(),
            values: defaults.clone(),
        },
        DspParamMirror {
            shared,
            values: defaults,
        },
    )
}

/// The pieces both halves need: the stable address order and the atomic bridge slots.
struct MirrorShared {
    addresses: Vec<u64>,
    index_by_address: HashMap<u64, usize>,
    bridge: Vec<AtomicF32>,
}

impl MirrorShared {
    fn index_of(&self, address: u64) -> Option<usize> {
        let index = self.index_by_address.get(&address).copied();
        frazil_debug_assert!(
            index.is_some(),
            "Use of undeclared parameter address {}",
            address
        );

        index
    }
}

/// The UI thread's half of a parameter mirror. All access must be serialized by the UI
/// lock, which the wrapper takes care of.
pub struct UiParamMirror {
    shared: Arc<MirrorShared>,
    values: Vec<f32>,
}

impl UiParamMirror {
    /// The UI cache's value for a parameter. This does not look at the atomic slot;
    /// DSP-originated changes only become visible here after a [`sync()`][Self::sync()].
    pub fn get(&self, address: u64) -> f32 {
        match self.shared.index_of(address) {
            Some(index) => self.values[index],
            None => 0.0,
        }
    }

    /// Write a value into the UI cache and publish it through the atomic slot for the
    /// DSP side to pick up on its next sync.
    pub fn set(&mut self, address: u64, value: f32) {
        if let Some(index) = self.shared.index_of(address) {
            self.values[index] = value;
            self.shared.bridge[index].store(value, Ordering::Relaxed);
        }
    }

    /// Pull DSP-originated changes out of the atomic slots into the UI cache, invoking
    /// `notify` once per parameter whose cached value changed.
    pub fn sync(&mut self, mut notify: impl FnMut(u64, f32)) {
        for (index, address) in self.shared.addresses.iter().enumerate() {
            let value = self.shared.bridge[index].load(Ordering::Relaxed);
            if value != self.values[index] {
                self.values[index] = value;
                notify(*address, value);
            }
        }
    }
}

/// The DSP thread's half of a parameter mirror. All access must be serialized by the
/// DSP lock.
pub struct DspParamMirror {
    shared: Arc<MirrorShared>,
    values: Vec<f32>,
}

impl DspParamMirror {
    /// Reconcile the kernel with the mirror. This runs two bounded passes with no
    /// allocation:
    ///
    /// 1. UI-originated changes found in the atomic slots are written to the DSP cache
    ///    and pushed into the kernel through `set_value`.
    /// 2. The kernel's current values are read back through `get_value`; anything the
    ///    kernel changed on its own is captured into the DSP cache and republished
    ///    through the atomic slots for UI consumption.
    ///
    /// When both sides wrote the same parameter since the last sync, the last write
    /// wins; gestures are externally serialized by the grab discipline, so this is
    /// acceptable.
    pub fn sync(
        &mut self,
        mut set_value: impl FnMut(u64, f32),
        mut get_value: impl FnMut(u64) -> f32,
    ) {
        for (index, address) in self.shared.addresses.iter().enumerate() {
            let value = self.shared.bridge[index].load(Ordering::Relaxed);
            if value != self.values[index] {
                self.values[index] = value;
                set_value(*address, value);
            }
        }

        for (index, address) in self.shared.addresses.iter().enumerate() {
            let value = get_value(*address);
            if value != self.values[index] {
                self.values[index] = value;
                self.shared.bridge[index].store(value, Ordering::Relaxed);
            }
        }
    }
}
