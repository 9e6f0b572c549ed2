//! Absolute deadlines on CLOCK_MONOTONIC.
//!
//! Periodic work advances a [`Deadline`] by each interval and sleeps until it with
//! `clock_nanosleep(TIMER_ABSTIME)`. The next wake time depends only on the previous
//! target, so per-iteration overhead never accumulates into drift.

use std::fmt;
use std::time::Duration;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Convert seconds to a whole number of microseconds, rounding to nearest.
///
/// Non-finite or non-positive inputs yield zero.
pub fn micros_from_secs(seconds: f64) -> Duration {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_micros((seconds * 1_000_000.0).round() as u64)
}

/// Point in time on the monotonic clock.
#[derive(Clone, Copy)]
pub struct Deadline {
    ts: libc::timespec,
}

impl Deadline {
    pub fn now() -> Self {
        let ts = unsafe {
            let mut ts: libc::timespec = std::mem::zeroed();
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
            ts
        };
        Self { ts }
    }

    /// Move the deadline forward by `interval`.
    pub fn advance(&mut self, interval: Duration) {
        add_ns(&mut self.ts, interval.as_nanos() as i64);
    }

    /// Signed distance from `earlier` to `self` in nanoseconds.
    pub fn nanos_since(&self, earlier: &Deadline) -> i64 {
        diff_ns(&self.ts, &earlier.ts)
    }

    /// Distance from `earlier` to `self`, saturating at zero.
    pub fn since(&self, earlier: &Deadline) -> Duration {
        Duration::from_nanos(self.nanos_since(earlier).max(0) as u64)
    }

    /// Block the calling thread until the deadline is reached.
    ///
    /// Returns how late the thread woke up. Signal interruptions resume the wait.
    pub fn sleep_until(&self) -> Duration {
        loop {
            let rc = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_MONOTONIC,
                    libc::TIMER_ABSTIME,
                    &self.ts,
                    std::ptr::null_mut(),
                )
            };
            if rc != libc::EINTR {
                break;
            }
        }
        Deadline::now().since(self)
    }
}

impl fmt::Debug for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deadline")
            .field("sec", &self.ts.tv_sec)
            .field("nsec", &self.ts.tv_nsec)
            .finish()
    }
}

fn add_ns(ts: &mut libc::timespec, add: i64) {
    let mut nsec = ts.tv_nsec as i64 + add;
    ts.tv_sec += (nsec / NANOS_PER_SEC) as libc::time_t;
    nsec %= NANOS_PER_SEC;
    if nsec < 0 {
        nsec += NANOS_PER_SEC;
        ts.tv_sec -= 1;
    }
    ts.tv_nsec = nsec as _;
}

fn diff_ns(a: &libc::timespec, b: &libc::timespec) -> i64 {
    (a.tv_sec - b.tv_sec) as i64 * NANOS_PER_SEC + (a.tv_nsec - b.tv_nsec) as i64
}
