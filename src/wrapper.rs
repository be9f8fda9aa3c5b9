//! Wraps a kernel so that it can be used from both the UI thread and the DSP thread at
//! the same time, with bounded, non-blocking interaction on the DSP side and eventual
//! consistency between the two views.

use parking_lot::{Mutex, ReentrantMutex};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::time::{Duration, Instant};

pub mod grab_mirror;
pub mod param_mirror;

use self::grab_mirror::{grab_mirror, DspGrabMirror, UiGrabMirror};
use self::param_mirror::{param_mirror, DspParamMirror, UiParamMirror};
use crate::buffer::DeinterleavedAudio;
use crate::event::AudioEvent;
use crate::kernel::Kernel;
use crate::params::{ParamInfo, ParamState, ParameterSet};
use crate::util::process_wrapper;

/// How long the DSP thread may go without syncing before
/// [`WrappedKernel::sync_from_ui_thread()`] starts driving reconciliation itself. Much
/// longer than any process cycle, so the audio thread wins whenever it is running.
const DEFAULT_DSP_DISABLED_DURATION: Duration = Duration::from_secs(1);

/// Sentinel timestamp value: the DSP thread has never synced.
const NEVER_SYNCED: u64 = u64::MAX;

/// Callbacks into the host, all invoked from the DSP sync path. These must be cheap;
/// only `update_host()` is allowed to block, and the DSP lock is released around it.
/// The wrapper holds the host weakly, so a host that has been torn down simply stops
/// receiving notifications.
pub trait HostInterface: Send + Sync {
    /// Tell the host that parameter values may have changed.
    fn update_host(&self) {}

    /// Start of a gesture operation on this parameter.
    fn grab(&self, address: u64) {
        let _ = address;
    }

    /// End of a gesture operation on this parameter.
    fn ungrab(&self, address: u64) {
        let _ = address;
    }
}

/// Owns a kernel and the mirrors that reconcile its parameters between the UI thread
/// and the DSP thread.
///
/// The UI side goes through [`ui_parameter_set()`][Self::ui_parameter_set()] and
/// [`sync_from_ui_thread()`][Self::sync_from_ui_thread()]. The DSP side calls
/// [`process()`][Self::process()] every cycle and
/// [`sync_from_dsp_thread()`][Self::sync_from_dsp_thread()] whenever it wants to
/// reconcile, typically once per cycle. The wrapper's own [`ParameterSet`] impl is the
/// DSP-facing facade: it talks to the kernel directly, bypassing the mirror, so the UI
/// only observes such writes after the next DSP sync reads them back.
pub struct WrappedKernel {
    /// Everything owned by the DSP thread. In nominal operation this lock is
    /// uncontended; the UI thread only takes it for the idle fallback sync.
    dsp: Mutex<DspState>,
    /// The UI thread's parameter cache. Reentrant so that an observer callback running
    /// under the lock may read parameters; a re-entrant read during a sync still fails
    /// loudly on the inner borrow instead of deadlocking.
    ui: ReentrantMutex<RefCell<UiParamMirror>>,
    /// Pending gesture counters. Atomic, so grab handles never need a lock.
    ui_grabs: UiGrabMirror,

    /// When the DSP thread last synced, in nanoseconds since `epoch`, or
    /// [`NEVER_SYNCED`]. Sequentially consistent so the UI thread observes a DSP tick
    /// promptly.
    last_dsp_sync_time: AtomicU64,
    epoch: Instant,
    dsp_disabled_duration: Duration,

    host: Weak<dyn HostInterface>,
}

struct DspState {
    kernel: Box<dyn Kernel>,
    params: DspParamMirror,
    grabs: DspGrabMirror,
}

impl WrappedKernel {
    /// Wrap a kernel. Both mirrors are initialized to the descriptor defaults, which
    /// the kernel is assumed to start at as well.
    pub fn new(
        kernel: Box<dyn Kernel>,
        params: &[ParamInfo],
        host: Weak<dyn HostInterface>,
    ) -> Self {
        let (ui_params, dsp_params) = param_mirror(params);
        let (ui_grabs, dsp_grabs) = grab_mirror(params);

        Self {
            dsp: Mutex::new(DspState {
                kernel,
                params: dsp_params,
                grabs: dsp_grabs,
            }),
            ui: ReentrantMutex::new(RefCell::new(ui_params)),
            ui_grabs,
            last_dsp_sync_time: AtomicU64::new(NEVER_SYNCED),
            epoch: Instant::now(),
            dsp_disabled_duration: DEFAULT_DSP_DISABLED_DURATION,
            host,
        }
    }

    /// Override the idle threshold after which the UI thread starts driving DSP syncs.
    pub fn with_dsp_disabled_duration(mut self, duration: Duration) -> Self {
        self.dsp_disabled_duration = duration;
        self
    }

    /// Process a buffer. No parameter reconciliation happens here; that is what
    /// [`sync_from_dsp_thread()`][Self::sync_from_dsp_thread()] is for.
    pub fn process(
        &self,
        audio: DeinterleavedAudio<'_, '_>,
        events: &mut dyn Iterator<Item = AudioEvent>,
    ) {
        process_wrapper(|| {
            let mut dsp = self.dsp.lock();
            dsp.kernel.process(audio, events);
        })
    }

    /// Restore the kernel to its initial steady state. May allocate, so this must not
    /// be called while the host is actively rendering.
    pub fn reset(&self) {
        self.dsp.lock().kernel.reset();
    }

    /// The kernel's current processing latency in samples.
    pub fn latency(&self) -> u64 {
        self.dsp.lock().kernel.latency()
    }

    /// Reconcile the kernel with the UI. Called from the DSP thread after each process
    /// cycle, or from the UI thread through the idle fallback.
    ///
    /// UI-originated parameter changes are pushed into the kernel, kernel-originated
    /// changes are republished for UI consumption, and gesture edges are surfaced to
    /// the host: grab edges first, then `update_host()` with the DSP lock released
    /// (it may block on host-internal mutexes), then ungrab edges. The ordering lets
    /// the host tie both edges of a short gesture to the value update in between.
    pub fn sync_from_dsp_thread(&self) {
        self.last_dsp_sync_time
            .store(self.epoch.elapsed().as_nanos() as u64, Ordering::SeqCst);

        {
            let mut dsp = self.dsp.lock();
            let DspState { kernel, params, .. } = &mut *dsp;
            process_wrapper(|| {
                params.sync(
                    |address, value| kernel.set_parameter(address, value),
                    |address| kernel.get_parameter(address),
                )
            });
        }

        let host = match self.host.upgrade() {
            Some(host) => host,
            None => return,
        };

        {
            let mut dsp = self.dsp.lock();
            dsp.grabs.check_pending_grabs(|address| host.grab(address));
        }
        host.update_host();
        {
            let mut dsp = self.dsp.lock();
            dsp.grabs
                .check_pending_ungrabs(|address| host.ungrab(address));
        }
    }

    /// Pull DSP-originated parameter changes into the UI cache, invoking `notify` once
    /// per changed parameter. If the DSP thread has been quiescent for longer than the
    /// idle threshold (or has never run), this also drives a full DSP sync so that
    /// UI-originated writes still reach the kernel while the host is not rendering.
    pub fn sync_from_ui_thread(&self, notify: impl FnMut(u64, f32)) {
        let ui = self.ui.lock();
        ui.borrow_mut().sync(notify);

        let last = self.last_dsp_sync_time.load(Ordering::SeqCst);
        let dsp_idle = match last {
            NEVER_SYNCED => true,
            last => {
                self.epoch.elapsed().saturating_sub(Duration::from_nanos(last))
                    >= self.dsp_disabled_duration
            }
        };
        if dsp_idle {
            self.sync_from_dsp_thread();
        }
    }

    /// The UI thread's view of the parameters. Writes go through gesture grabs; see
    /// [`UiParameterSet::grab_parameter()`].
    pub fn ui_parameter_set(&self) -> UiParameterSet<'_> {
        UiParameterSet { kernel: self }
    }
}

/// The DSP-facing parameter facade. These talk to the kernel directly and bypass the
/// mirror: a value written here becomes visible to the UI only after the next DSP sync
/// reads it back out of the kernel.
impl ParameterSet for WrappedKernel {
    fn set_parameter(&self, address: u64, value: f32) {
        self.dsp.lock().kernel.set_parameter(address, value);
    }

    fn get_parameter(&self, address: u64) -> f32 {
        self.dsp.lock().kernel.get_parameter(address)
    }
}

/// The UI thread's interface to a [`WrappedKernel`]'s parameters. Reading is free-form;
/// writing requires grabbing the parameter first, which brackets the host-visible
/// gesture.
pub struct UiParameterSet<'a> {
    kernel: &'a WrappedKernel,
}

impl UiParameterSet<'_> {
    /// Start a gesture on this parameter. The gesture lasts for as long as the
    /// returned handle is alive, and the handle cannot outlive this set.
    pub fn grab_parameter(&self, address: u64) -> GrabbedParameter<'_> {
        self.kernel.ui_grabs.grab(address);

        GrabbedParameter {
            kernel: self.kernel,
            address,
        }
    }

    /// The UI cache's current value for this parameter.
    pub fn get_parameter(&self, address: u64) -> f32 {
        let ui = self.kernel.ui.lock();
        let value = ui.borrow().get(address);
        value
    }

    /// Snapshot the UI-visible state over the declared descriptor list.
    pub fn param_state(&self, params: &[ParamInfo]) -> ParamState {
        params
            .iter()
            .map(|param| (param.address, self.get_parameter(param.address)))
            .collect()
    }
}

/// A parameter that is being interacted with. Dropping the handle ends the gesture.
pub struct GrabbedParameter<'a> {
    kernel: &'a WrappedKernel,
    address: u64,
}

impl GrabbedParameter<'_> {
    /// The address this gesture is on.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Write a new value through the UI cache. The DSP side picks it up on its next
    /// sync; rapid successive writes may be coalesced, but the last one always lands.
    pub fn set_parameter(&self, value: f32) {
        let ui = self.kernel.ui.lock();
        ui.borrow_mut().set(self.address, value);
    }
}

impl Drop for GrabbedParameter<'_> {
    fn drop(&mut self) {
        self.kernel.ui_grabs.ungrab(self.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamInfo;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Shared log of the setter calls a [`MemoryKernel`] received, so tests can watch
    /// the kernel from outside the wrapper that owns it.
    #[derive(Clone, Default)]
    struct KernelLog {
        set_calls: Arc<Mutex<Vec<(u64, f32)>>>,
    }

    impl KernelLog {
        fn take(&self) -> Vec<(u64, f32)> {
            std::mem::take(&mut *self.set_calls.lock())
        }
    }

    /// A kernel that just stores parameter values and logs setter calls.
    struct MemoryKernel {
        values: RefCell<BTreeMap<u64, f32>>,
        log: KernelLog,
    }

    impl MemoryKernel {
        fn new(params: &[ParamInfo], log: KernelLog) -> Self {
            Self {
                values: RefCell::new(
                    params
                        .iter()
                        .map(|param| (param.address, param.default_value()))
                        .collect(),
                ),
                log,
            }
        }
    }

    impl ParameterSet for MemoryKernel {
        fn set_parameter(&self, address: u64, value: f32) {
            self.values.borrow_mut().insert(address, value);
            self.log.set_calls.lock().push((address, value));
        }

        fn get_parameter(&self, address: u64) -> f32 {
            self.values.borrow().get(&address).copied().unwrap_or(0.0)
        }
    }

    impl Kernel for MemoryKernel {
        fn reset(&mut self) {}

        fn process(
            &mut self,
            _audio: DeinterleavedAudio<'_, '_>,
            _events: &mut dyn Iterator<Item = AudioEvent>,
        ) {
        }

        fn latency(&self) -> u64 {
            0
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum HostCall {
        Grab(u64),
        UpdateHost,
        Ungrab(u64),
    }

    /// Records the calls the wrapper makes on the DSP sync path. Optionally pokes the
    /// wrapper from within `update_host()` to prove the DSP lock is not held there.
    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<HostCall>>,
        wrapper: Mutex<Weak<WrappedKernel>>,
    }

    impl HostInterface for RecordingHost {
        fn update_host(&self) {
            // This takes the DSP lock, so it deadlocks if the sync path were still
            // holding it across this callback
            if let Some(wrapper) = self.wrapper.lock().upgrade() {
                let _ = wrapper.latency();
            }
            self.calls.lock().push(HostCall::UpdateHost);
        }

        fn grab(&self, address: u64) {
            self.calls.lock().push(HostCall::Grab(address));
        }

        fn ungrab(&self, address: u64) {
            self.calls.lock().push(HostCall::Ungrab(address));
        }
    }

    /// Used where a test has no interest in host callbacks.
    struct NoopHost;
    impl HostInterface for NoopHost {}

    fn make_params() -> Vec<ParamInfo> {
        vec![
            ParamInfo::numeric("one", 1, "One", 0.0, 1.0, 0.0),
            ParamInfo::numeric("two", 2, "Two", 0.0, 1.0, 1.0),
            ParamInfo::numeric("three", 3, "Three", 0.0, 1.0, 0.0),
            ParamInfo::numeric("five", 5, "Five", 0.0, 1.0, 0.0),
            ParamInfo::numeric("seven", 7, "Seven", 0.0, 1.0, 0.0),
        ]
    }

    fn make_wrapped(host: Weak<dyn HostInterface>) -> (WrappedKernel, KernelLog) {
        let params = make_params();
        let log = KernelLog::default();
        let kernel = Box::new(MemoryKernel::new(&params, log.clone()));

        (WrappedKernel::new(kernel, &params, host), log)
    }

    #[test]
    fn ui_write_syncs_into_the_kernel() {
        // Only the changed parameter may reach the kernel
        let (wrapped, log) = make_wrapped(Weak::<NoopHost>::new());

        {
            let ui = wrapped.ui_parameter_set();
            let grabbed = ui.grab_parameter(1);
            grabbed.set_parameter(0.5);
        }
        wrapped.sync_from_dsp_thread();

        assert_eq!(log.take(), vec![(1, 0.5)]);
        assert_eq!(wrapped.get_parameter(1), 0.5);
        assert_eq!(wrapped.get_parameter(2), 1.0);

        // And the following UI sync is quiescent
        let mut notified = Vec::new();
        wrapped.sync_from_ui_thread(|address, value| notified.push((address, value)));
        assert_eq!(notified, vec![]);
    }

    #[test]
    fn gesture_edges_bracket_the_host_update() {
        // A full gesture: grab, write a few values, release, then sync once
        let host = Arc::new(RecordingHost::default());
        let (wrapped, _log) = make_wrapped(Arc::downgrade(&host) as Weak<dyn HostInterface>);
        let wrapped = Arc::new(wrapped);
        *host.wrapper.lock() = Arc::downgrade(&wrapped);

        {
            let ui = wrapped.ui_parameter_set();
            let grabbed = ui.grab_parameter(7);
            grabbed.set_parameter(0.1);
            grabbed.set_parameter(0.2);
            grabbed.set_parameter(0.3);
        }
        wrapped.sync_from_dsp_thread();

        assert_eq!(
            *host.calls.lock(),
            vec![HostCall::Grab(7), HostCall::UpdateHost, HostCall::Ungrab(7)]
        );
        // Intermediate values may be coalesced, the final one must land
        assert_eq!(wrapped.get_parameter(7), 0.3);
    }

    #[test]
    fn kernel_driven_change_notifies_the_ui_once() {
        // The kernel moves a parameter on its own, e.g. through automation
        let (wrapped, _log) = make_wrapped(Weak::<NoopHost>::new());

        wrapped.set_parameter(3, 0.75);
        wrapped.sync_from_dsp_thread();

        let mut notified = Vec::new();
        wrapped.sync_from_ui_thread(|address, value| notified.push((address, value)));
        assert_eq!(notified, vec![(3, 0.75)]);
        assert_eq!(wrapped.ui_parameter_set().get_parameter(3), 0.75);

        let mut notified = Vec::new();
        wrapped.sync_from_ui_thread(|address, value| notified.push((address, value)));
        assert_eq!(notified, vec![]);
    }

    #[test]
    fn direct_kernel_writes_bypass_the_mirror() {
        let (wrapped, _log) = make_wrapped(Weak::<NoopHost>::new());

        wrapped.set_parameter(5, 0.9);
        // Nothing has synced yet, so the UI still sees the default
        assert_eq!(wrapped.ui_parameter_set().get_parameter(5), 0.0);

        wrapped.sync_from_dsp_thread();
        wrapped.sync_from_ui_thread(|_, _| ());
        assert_eq!(wrapped.ui_parameter_set().get_parameter(5), 0.9);
    }

    #[test]
    fn ui_sync_drives_reconciliation_while_dsp_is_idle() {
        // With the idle threshold collapsed to zero, the UI sync subsumes the DSP
        // sync without any explicit process call
        let (wrapped, log) = make_wrapped(Weak::<NoopHost>::new());
        let wrapped = wrapped.with_dsp_disabled_duration(Duration::ZERO);

        {
            let ui = wrapped.ui_parameter_set();
            let grabbed = ui.grab_parameter(5);
            grabbed.set_parameter(0.9);
        }
        wrapped.sync_from_ui_thread(|_, _| ());

        assert_eq!(log.take(), vec![(5, 0.9)]);
    }

    #[test]
    fn first_ui_sync_treats_never_synced_as_idle() {
        let (wrapped, log) = make_wrapped(Weak::<NoopHost>::new());

        {
            let ui = wrapped.ui_parameter_set();
            let grabbed = ui.grab_parameter(1);
            grabbed.set_parameter(0.25);
        }
        // The threshold is still the 1 s default, but the DSP thread has never run
        wrapped.sync_from_ui_thread(|_, _| ());

        assert_eq!(log.take(), vec![(1, 0.25)]);
    }

    #[test]
    fn recent_dsp_sync_suppresses_the_fallback() {
        let (wrapped, log) = make_wrapped(Weak::<NoopHost>::new());

        wrapped.sync_from_dsp_thread();
        {
            let ui = wrapped.ui_parameter_set();
            let grabbed = ui.grab_parameter(1);
            grabbed.set_parameter(0.25);
        }
        wrapped.sync_from_ui_thread(|_, _| ());

        // The write stays in the atomic slot until the DSP thread comes around
        assert_eq!(log.take(), vec![]);
        wrapped.sync_from_dsp_thread();
        assert_eq!(log.take(), vec![(1, 0.25)]);
    }

    #[test]
    fn interleaved_grabs_produce_a_single_edge() {
        // Three grabs and two ungrabs leave one outstanding grab
        let host = Arc::new(RecordingHost::default());
        let (wrapped, _log) = make_wrapped(Arc::downgrade(&host) as Weak<dyn HostInterface>);

        let ui = wrapped.ui_parameter_set();
        let first = ui.grab_parameter(5);
        let second = ui.grab_parameter(5);
        drop(first);
        let _third = ui.grab_parameter(5);
        drop(second);

        wrapped.sync_from_dsp_thread();
        assert_eq!(
            *host.calls.lock(),
            vec![HostCall::Grab(5), HostCall::UpdateHost]
        );
        assert_eq!(wrapped.dsp.lock().grabs.grab_count(5), 1);
    }

    #[test]
    fn lapsed_host_drops_notifications() {
        let host = Arc::new(RecordingHost::default());
        let (wrapped, log) = make_wrapped(Arc::downgrade(&host) as Weak<dyn HostInterface>);
        drop(host);

        let ui = wrapped.ui_parameter_set();
        let grabbed = ui.grab_parameter(1);
        grabbed.set_parameter(0.5);
        drop(grabbed);

        // The edges go nowhere, but values still reach the kernel
        wrapped.sync_from_dsp_thread();
        assert_eq!(log.take(), vec![(1, 0.5)]);
    }

    #[test]
    fn reset_and_latency_delegate_under_the_dsp_lock() {
        let (wrapped, _log) = make_wrapped(Weak::<NoopHost>::new());
        wrapped.reset();
        assert_eq!(wrapped.latency(), 0);
    }

    #[test]
    fn ui_state_snapshot_follows_the_ui_cache() {
        let params = make_params();
        let (wrapped, _log) = make_wrapped(Weak::<NoopHost>::new());

        {
            let ui = wrapped.ui_parameter_set();
            let grabbed = ui.grab_parameter(2);
            grabbed.set_parameter(0.5);
        }

        let state = wrapped.ui_parameter_set().param_state(&params);
        assert_eq!(state[&1], 0.0);
        assert_eq!(state[&2], 0.5);
    }
}
