use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

/// Lifecycle phase of a generator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// No epoch has been started
    #[default]
    Init,
    /// Batches of an epoch are being produced
    Running,
    /// A stop was requested, no further batches will be yielded
    Stopping,
    /// Early stopping was requested, the current epoch is finished first
    EarlyStopped,
    /// An epoch has ended and the next one awaits the ready handshake
    EpochBoundary,
    /// No further epochs will be started
    Done,
}

/// Control flags shared between a generator and the training loop
///
/// The flags are set from any thread; the generator polls `stop` between batches
/// and blocks on the ready handshake at epoch boundaries.
#[derive(Debug, Default)]
pub struct GeneratorState {
    stop: AtomicBool,
    early_stop: AtomicBool,
    ready: Mutex<bool>,
    ready_cv: Condvar,
    phase: Mutex<Phase>,
    epoch: AtomicUsize,
}
impl GeneratorState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an immediate stop
    ///
    /// Workers do not start new batches and the batch iterator returns `None` on its
    /// next call.
    pub fn set_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.set_phase(Phase::Stopping);
        self.wake();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Requests the generator to end after the current epoch
    pub fn set_early_stopping(&self) {
        self.early_stop.store(true, Ordering::Release);
        {
            let mut phase = self.phase.lock();
            if matches!(*phase, Phase::Init | Phase::Running | Phase::EpochBoundary) {
                *phase = Phase::EarlyStopped;
            }
        }
        self.wake();
    }

    #[must_use]
    pub fn is_early_stopping(&self) -> bool {
        self.early_stop.load(Ordering::Acquire)
    }

    /// Permits the next epoch to start
    pub fn set_ready_for_next_epoch(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        self.ready_cv.notify_all();
    }

    /// Consumes the ready flag without blocking
    pub fn take_ready(&self) -> bool {
        std::mem::take(&mut *self.ready.lock())
    }

    /// Blocks until the ready flag is set, then consumes it
    ///
    /// Returns `false` without consuming anything if a stop or early stop is
    /// requested while waiting.
    pub fn wait_ready(&self) -> bool {
        let mut ready = self.ready.lock();
        loop {
            if self.is_stopped() || self.is_early_stopping() {
                return false;
            }
            if *ready {
                *ready = false;
                return true;
            }
            self.ready_cv.wait(&mut ready);
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    /// Index of the most recently started epoch
    #[must_use]
    pub fn epoch(&self) -> usize {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn set_epoch(&self, epoch: usize) {
        self.epoch.store(epoch, Ordering::Release);
    }

    /// Records the end of an epoch
    ///
    /// A pending early stop stays visible as [`Phase::EarlyStopped`] and a stop as
    /// [`Phase::Stopping`].
    pub(crate) fn end_epoch(&self) {
        let mut phase = self.phase.lock();
        if self.is_stopped() {
            return;
        }
        *phase = if self.is_early_stopping() {
            Phase::EarlyStopped
        } else {
            Phase::EpochBoundary
        };
    }

    fn wake(&self) {
        // hold the lock so a waiter cannot miss the notification
        let _ready = self.ready.lock();
        self.ready_cv.notify_all();
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_ready_handshake() {
        let state = GeneratorState::new();
        assert!(!state.take_ready());
        state.set_ready_for_next_epoch();
        assert!(state.take_ready());
        assert!(!state.take_ready());
    }

    #[test]
    fn test_wait_ready_from_other_thread() {
        let state = Arc::new(GeneratorState::new());
        let handle = {
            let state = state.clone();
            thread::spawn(move || state.wait_ready())
        };
        thread::sleep(Duration::from_millis(20));
        state.set_ready_for_next_epoch();
        assert!(handle.join().unwrap_or(false));
    }

    #[test]
    fn test_stop_wakes_waiter() {
        let state = Arc::new(GeneratorState::new());
        let handle = {
            let state = state.clone();
            thread::spawn(move || state.wait_ready())
        };
        thread::sleep(Duration::from_millis(20));
        state.set_stop();
        assert!(!handle.join().unwrap_or(true));
        assert_eq!(state.phase(), Phase::Stopping);
    }

    #[test]
    fn test_early_stopping_phase() {
        let state = GeneratorState::new();
        state.set_phase(Phase::Running);
        state.set_early_stopping();
        assert_eq!(state.phase(), Phase::EarlyStopped);
        assert!(state.is_early_stopping());
        assert!(!state.wait_ready());
    }

    #[test]
    fn test_end_epoch_keeps_early_stop() {
        let state = GeneratorState::new();
        state.set_phase(Phase::Running);
        state.end_epoch();
        assert_eq!(state.phase(), Phase::EpochBoundary);

        // the first epoch starts as Running even if early stopping came first
        state.set_early_stopping();
        state.set_phase(Phase::Running);
        state.end_epoch();
        assert_eq!(state.phase(), Phase::EarlyStopped);

        state.set_stop();
        state.end_epoch();
        assert_eq!(state.phase(), Phase::Stopping);
    }
}
