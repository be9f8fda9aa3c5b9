//! Tracks gesture ownership of each parameter across threads. The UI side only bumps
//! pending counters; the DSP side drains them during its sync and turns zero crossings
//! of the resulting grab count into edge-triggered host notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::params::ParamInfo;

/// Create the two halves of a grab mirror with all counters at zero.
pub fn grab_mirror(params: &[ParamInfo]) -> (UiGrabMirror, DspGrabMirror) {
    let shared = Arc::new(GrabShared {
        addresses: params.iter().map(|param| param.address).collect(),
        index_by_address: params
            .iter()
            .enumerate()
            .map(|(index, param)| (param.address, index))
            .collect(),
        pending_grabs: params.iter().map(|_| AtomicU64::new(0)).collect(),
        pending_ungrabs: params.iter().map(|_| AtomicU64::new(0)).collect(),
    });
    let grab_counts = vec![0; params.len()];

    (
        UiGrabMirror {
            shared: shared.clone(),
        },
        DspGrabMirror {
            shared,
            grab_counts,
        },
    )
}

struct GrabShared {
    addresses: Vec<u64>,
    index_by_address: HashMap<u64, usize>,
    /// UI-side grab requests not yet observed by the DSP side. Multiple producers, one
    /// consumer draining through an atomic exchange.
    pending_grabs: Vec<AtomicU64>,
    pending_ungrabs: Vec<AtomicU64>,
}

impl GrabShared {
    fn index_of(&self, address: u64) -> Option<usize> {
        let index = self.index_by_address.get(&address).copied();
        frazil_debug_assert!(
            index.is_some(),
            "Grab of undeclared parameter address {}",
            address
        );

        index
    }
}

/// The UI thread's half of a grab mirror. These operations are plain atomic increments
/// and need no lock, so grab handles can call them from any context, including drops
/// that happen inside UI callbacks.
pub struct UiGrabMirror {
    shared: Arc<GrabShared>,
}

impl UiGrabMirror {
    /// Record the start of a gesture on this parameter.
    pub fn grab(&self, address: u64) {
        if let Some(index) = self.shared.index_of(address) {
            self.shared.pending_grabs[index].fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Record the end of a gesture on this parameter.
    pub fn ungrab(&self, address: u64) {
        if let Some(index) = self.shared.index_of(address) {
            self.shared.pending_ungrabs[index].fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// The DSP thread's half of a grab mirror: the authoritative per-parameter count of
/// outstanding grabs. All access must be serialized by the DSP lock.
pub struct DspGrabMirror {
    shared: Arc<GrabShared>,
    grab_counts: Vec<u64>,
}

impl DspGrabMirror {
    /// Drain the pending grab counters into the grab counts, invoking `on_grab` for
    /// every parameter whose count moved away from zero. At most one edge fires per
    /// parameter per call.
    pub fn check_pending_grabs(&mut self, mut on_grab: impl FnMut(u64)) {
        for (index, address) in self.shared.addresses.iter().enumerate() {
            let delta = self.shared.pending_grabs[index].swap(0, Ordering::SeqCst);
            let was_grabbed = self.grab_counts[index] != 0;
            self.grab_counts[index] += delta;
            let is_grabbed = self.grab_counts[index] != 0;
            if is_grabbed != was_grabbed {
                on_grab(*address);
            }
        }
    }

    /// The counterpart to [`check_pending_grabs()`][Self::check_pending_grabs()]:
    /// drains the pending ungrab counters, invoking `on_ungrab` for every parameter
    /// whose count returned to zero. The count saturates at zero, so surplus ungrabs
    /// are absorbed without ever firing an edge.
    pub fn check_pending_ungrabs(&mut self, mut on_ungrab: impl FnMut(u64)) {
        for (index, address) in self.shared.addresses.iter().enumerate() {
            let delta = self.shared.pending_ungrabs[index].swap(0, Ordering::SeqCst);
            let was_grabbed = self.grab_counts[index] != 0;
            self.grab_counts[index] = self.grab_counts[index].saturating_sub(delta);
            let is_grabbed = self.grab_counts[index] != 0;
            if is_grabbed != was_grabbed {
                on_ungrab(*address);
            }
        }
    }

    /// The number of outstanding grabs on a parameter, as last reconciled.
    pub fn grab_count(&self, address: u64) -> u64 {
        match self.shared.index_of(address) {
            Some(index) => self.grab_counts[index],
            None => 0,
        }
    }
}
