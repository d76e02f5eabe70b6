use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Whether a scrape run is currently in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Process-wide single-flight cell: at most one run at a time, extra callers are
/// turned away rather than queued
#[derive(Debug)]
pub struct SingleFlightGuard {
    state: AtomicU8,
}

impl SingleFlightGuard {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
        }
    }

    /// Move `Idle -> Running`. `false` means another run holds the guard.
    pub fn try_acquire(&self) -> bool {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Unconditionally back to `Idle`
    pub fn release(&self) {
        self.state.store(IDLE, Ordering::Release);
    }

    pub fn state(&self) -> RunState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => RunState::Running,
            _ => RunState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Acquire and tie the release to the returned permit's lifetime
    pub fn permit(self: &Arc<Self>) -> Option<RunPermit> {
        if self.try_acquire() {
            debug!("Run guard acquired");
            Some(RunPermit { guard: Arc::clone(self) })
        } else {
            None
        }
    }
}

impl Default for SingleFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of one run; dropping it releases the guard, also
/// while a panicking run unwinds
#[derive(Debug)]
pub struct RunPermit {
    guard: Arc<SingleFlightGuard>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.guard.release();
        debug!("Run guard released");
    }
}
