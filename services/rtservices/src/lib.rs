//! RT Services Crate
//!
//! Provides the real-time infrastructure of the trigger generator:
//! - OS-level RT elevation (mlockall, SCHED_RR / SCHED_FIFO)
//! - Absolute deadlines on CLOCK_MONOTONIC for drift-free periodic loops
//! - Stop token and lifecycle state shared with the control thread
//! - Wake-up lateness statistics
//!
//! # Example
//!
//! ```rust,ignore
//! use rtservices::{elevate, Deadline, LoopContext, SchedPolicy};
//!
//! let ctx = LoopContext::new();
//! elevate(1.0, SchedPolicy::RoundRobin)?;
//!
//! let mut next = Deadline::now();
//! while !ctx.is_stop_requested() {
//!     next.advance(std::time::Duration::from_millis(10));
//!     next.sleep_until();
//! }
//! ```

pub mod context;
pub mod deadline;
pub mod rt_checker;
pub mod rt_guard;

// Re-exports
pub use context::{LoopContext, LoopState};
pub use deadline::{micros_from_secs, Deadline};
pub use rt_checker::{
    absolute_priority, elevate, elevate_with, LinuxPlatform, RtError, RtPlatform, RtResult,
    SchedPolicy, SchedState, ScopedElevation,
};
pub use rt_guard::{record_wake, LatenessStats, LoopStats};
