//! Loop context shared between the control thread and the RT loop thread.
//!
//! The stop flag is the only signal crossing threads. It is written with Release and read
//! with Acquire, set once and never reset.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of an RT pattern loop. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Configuring = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl LoopState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => LoopState::Idle,
            1 => LoopState::Configuring,
            2 => LoopState::Running,
            3 => LoopState::Stopping,
            _ => LoopState::Stopped,
        }
    }
}

#[derive(Debug)]
struct Shared {
    stop: AtomicBool,
    state: AtomicU8,
}

/// Cancellation token plus lifecycle state. Clone-able, owns an Arc.
#[derive(Debug, Clone)]
pub struct LoopContext {
    inner: Arc<Shared>,
}

impl LoopContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Shared {
                stop: AtomicBool::new(false),
                state: AtomicU8::new(LoopState::Idle as u8),
            }),
        }
    }

    /// Ask the loop to stop at its next check point. Returns immediately.
    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::Release);
        let _ = self.inner.state.compare_exchange(
            LoopState::Running as u8,
            LoopState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::Acquire)
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_raw(self.inner.state.load(Ordering::Acquire))
    }

    /// Record a lifecycle transition. `Stopped` is never left.
    pub fn set_state(&self, next: LoopState) {
        let _ = self
            .inner
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == LoopState::Stopped as u8 {
                    None
                } else {
                    Some(next as u8)
                }
            });
    }

    /// Mark the loop as running, or as stopping if a stop already arrived.
    pub fn enter_running(&self) {
        self.set_state(LoopState::Running);
        if self.is_stop_requested() {
            self.set_state(LoopState::Stopping);
        }
    }
}

impl Default for LoopContext {
    fn default() -> Self {
        Self::new()
    }
}
