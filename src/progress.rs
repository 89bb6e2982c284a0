//! Shared run progress: phase, completed units, total units
//!
//! The execution worker and its line parsers write; the observer polls.
//! State lives behind one mutex so multi-field snapshots never tear.
//! `completed` is monotonic within a run and clamped to `total`, so
//! fine-grained parser updates can never walk the bar backwards or past
//! 100%.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use strum::{Display, EnumIter, EnumString};

/// Default observer polling interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which stretch of the run is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(Display, EnumString, EnumIter)]
pub enum Phase {
    #[default]
    #[strum(serialize = "Idle")]
    Idle,
    #[strum(serialize = "Running procedure")]
    RunningProcedure,
    #[strum(serialize = "Running script")]
    RunningScript,
    #[strum(serialize = "Removing packages")]
    RemovingPackages,
    #[strum(serialize = "Downloading RPM packages")]
    DownloadingPackages,
    #[strum(serialize = "Installing RPM packages")]
    InstallingPackages,
    #[strum(serialize = "Installing Flatpak packages")]
    InstallingImages,
}

impl Phase {
    /// Sub-phase transition driven by the package-manager output parser.
    ///
    /// The install batch starts from Idle; its first `[done/total]` scale
    /// marks the download sub-phase, the second scale the install
    /// sub-phase. Any other phase stays put (the removal batch reuses the
    /// same counter format but has no sub-phases).
    pub(crate) fn next_package_phase(self) -> Option<Phase> {
        match self {
            Phase::Idle => Some(Phase::DownloadingPackages),
            Phase::DownloadingPackages => Some(Phase::InstallingPackages),
            _ => None,
        }
    }
}

/// Snapshot of run progress at one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressState {
    pub phase: Phase,
    pub completed: u64,
    pub total: u64,
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.completed, self.total, self.phase)
    }
}

/// Thread-safe progress counters shared between the execution worker and
/// the observer. Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<ProgressState>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.inner.lock().expect("progress state mutex poisoned")
    }

    pub fn snapshot(&self) -> ProgressState {
        *self.lock()
    }

    pub fn set_total(&self, total: u64) {
        self.lock().total = total;
    }

    pub fn set_phase(&self, phase: Phase) {
        self.lock().phase = phase;
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn completed(&self) -> u64 {
        self.lock().completed
    }

    /// Credit completed units. Saturates at `total` once a total is set.
    pub fn add_completed(&self, units: u64) {
        let mut state = self.lock();
        let next = state.completed.saturating_add(units);
        state.completed = if state.total > 0 { next.min(state.total) } else { next };
    }

    /// Set the absolute completed count. Monotonic: values below the
    /// current count are ignored; values above `total` are clamped.
    pub fn set_completed(&self, value: u64) {
        let mut state = self.lock();
        let capped = if state.total > 0 { value.min(state.total) } else { value };
        if capped > state.completed {
            state.completed = capped;
        }
    }

    /// Advance the package sub-phase (Idle -> Downloading -> Installing).
    pub fn advance_package_phase(&self) {
        let mut state = self.lock();
        if let Some(next) = state.phase.next_package_phase() {
            state.phase = next;
        }
    }

    /// Mark the run finished: the bar lands exactly full and the phase
    /// returns to Idle.
    pub fn finish(&self) {
        let mut state = self.lock();
        state.completed = state.total;
        state.phase = Phase::Idle;
    }
}

/// Polls a [`ProgressTracker`] on a fixed interval from its own thread and
/// hands each snapshot to a sink. Runs independently of the execution
/// worker; never mutates progress.
pub struct ProgressObserver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressObserver {
    pub fn spawn<F>(tracker: ProgressTracker, interval: Duration, mut sink: F) -> Self
    where
        F: FnMut(&ProgressState) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                sink(&tracker.snapshot());
                thread::sleep(interval);
            }
            // One last snapshot so the sink always sees the final state.
            sink(&tracker.snapshot());
        });
        Self { stop, handle: Some(handle) }
    }

    /// Stop polling and wait for the observer thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressObserver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
