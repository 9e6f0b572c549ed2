//! Real-Time Elevation - OS-Level RT Setup
//!
//! Provides functionality for:
//! - Memory Locking (mlockall)
//! - SCHED_RR / SCHED_FIFO Scheduler Priority
//! - Opt-in restoration of the previous scheduling class
//!
//! Entering realtime mode is a one-way capability upgrade. The memory lock holds for the
//! rest of the process lifetime and the scheduling class for the rest of the thread
//! lifetime. [`ScopedElevation`] restores the scheduling class on drop; it never undoes
//! the memory lock.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RtError {
    #[error("invalid RT request: {0}")]
    Configuration(String),
    #[error("Memory locking failed: {0}")]
    MemoryLock(String),
    #[error("Scheduler setup failed: {0}")]
    Scheduler(String),
    #[error("Platform not supported for RT features")]
    PlatformNotSupported,
}

pub type RtResult<T> = Result<T, RtError>;

/// Real-time scheduling class requested for the calling thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedPolicy {
    #[default]
    RoundRobin,
    Fifo,
}

impl SchedPolicy {
    pub fn as_raw(self) -> i32 {
        match self {
            SchedPolicy::RoundRobin => libc::SCHED_RR,
            SchedPolicy::Fifo => libc::SCHED_FIFO,
        }
    }
}

/// Raw scheduling class and priority of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedState {
    pub policy: i32,
    pub priority: i32,
}

/// OS operations needed to enter realtime mode.
pub trait RtPlatform {
    /// Lock all current and future pages of the process into RAM.
    fn lock_memory(&mut self) -> RtResult<()>;

    /// Inclusive (min, max) priority range of `policy`.
    fn priority_range(&self, policy: SchedPolicy) -> RtResult<(i32, i32)>;

    /// Apply a scheduling class to the calling thread.
    fn set_scheduler(&mut self, state: SchedState) -> RtResult<()>;

    /// Scheduling class of the calling thread.
    fn current_scheduler(&self) -> RtResult<SchedState>;
}

/// [`RtPlatform`] backed by the Linux scheduler and mlockall.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxPlatform;

#[cfg(target_os = "linux")]
impl RtPlatform for LinuxPlatform {
    fn lock_memory(&mut self) -> RtResult<()> {
        use nix::sys::mman::{mlockall, MlockAllFlags};

        mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE).map_err(|e| {
            RtError::MemoryLock(format!(
                "mlockall failed: {} (try running as root or increase RLIMIT_MEMLOCK)",
                e
            ))
        })?;

        log::info!("RT: Memory locked with mlockall");
        Ok(())
    }

    fn priority_range(&self, policy: SchedPolicy) -> RtResult<(i32, i32)> {
        let raw = policy.as_raw();
        let (min, max) = unsafe {
            (
                libc::sched_get_priority_min(raw),
                libc::sched_get_priority_max(raw),
            )
        };

        if min < 0 || max < 0 {
            let err = std::io::Error::last_os_error();
            return Err(RtError::Scheduler(format!(
                "priority range query for {:?} failed: {}",
                policy, err
            )));
        }
        Ok((min, max))
    }

    fn set_scheduler(&mut self, state: SchedState) -> RtResult<()> {
        let param = libc::sched_param {
            sched_priority: state.priority,
        };

        let result = unsafe { libc::sched_setscheduler(0, state.policy, &param) };

        if result != 0 {
            let err = std::io::Error::last_os_error();
            return Err(RtError::Scheduler(format!(
                "sched_setscheduler failed: {} (try running as root)",
                err
            )));
        }

        log::info!(
            "RT: Set scheduler policy {} with priority {}",
            state.policy,
            state.priority
        );
        Ok(())
    }

    fn current_scheduler(&self) -> RtResult<SchedState> {
        let policy = unsafe { libc::sched_getscheduler(0) };
        if policy < 0 {
            let err = std::io::Error::last_os_error();
            return Err(RtError::Scheduler(format!("sched_getscheduler failed: {}", err)));
        }

        let mut param = libc::sched_param { sched_priority: 0 };
        if unsafe { libc::sched_getparam(0, &mut param) } != 0 {
            let err = std::io::Error::last_os_error();
            return Err(RtError::Scheduler(format!("sched_getparam failed: {}", err)));
        }

        Ok(SchedState {
            policy,
            priority: param.sched_priority,
        })
    }
}

#[cfg(not(target_os = "linux"))]
impl RtPlatform for LinuxPlatform {
    fn lock_memory(&mut self) -> RtResult<()> {
        log::warn!("RT: Memory locking not supported on this platform");
        Err(RtError::PlatformNotSupported)
    }

    fn priority_range(&self, _policy: SchedPolicy) -> RtResult<(i32, i32)> {
        Err(RtError::PlatformNotSupported)
    }

    fn set_scheduler(&mut self, _state: SchedState) -> RtResult<()> {
        log::warn!("RT: Realtime scheduling not supported on this platform");
        Err(RtError::PlatformNotSupported)
    }

    fn current_scheduler(&self) -> RtResult<SchedState> {
        Err(RtError::PlatformNotSupported)
    }
}

fn validate_priority(priority: f64) -> RtResult<()> {
    if !(0.0..=1.0).contains(&priority) {
        return Err(RtError::Configuration(format!(
            "priority {} out of range [0, 1]",
            priority
        )));
    }
    Ok(())
}

/// Map a normalized priority onto `[min, max]`: `min + floor((max - min) * priority)`.
pub fn absolute_priority(min: i32, max: i32, priority: f64) -> RtResult<i32> {
    validate_priority(priority)?;
    Ok((f64::from(max - min) * priority).floor() as i32 + min)
}

/// Enter realtime mode on `platform` and return the absolute priority applied.
///
/// An out-of-range priority fails before any OS call is made.
pub fn elevate_with<P: RtPlatform + ?Sized>(
    platform: &mut P,
    priority: f64,
    policy: SchedPolicy,
) -> RtResult<i32> {
    validate_priority(priority)?;

    platform.lock_memory()?;

    let (min, max) = platform.priority_range(policy)?;
    let absolute = absolute_priority(min, max, priority)?;

    platform.set_scheduler(SchedState {
        policy: policy.as_raw(),
        priority: absolute,
    })?;

    Ok(absolute)
}

/// Lock process memory and move the calling thread into `policy` at `priority` in [0, 1].
///
/// Irreversible: see the module docs.
pub fn elevate(priority: f64, policy: SchedPolicy) -> RtResult<i32> {
    elevate_with(&mut LinuxPlatform, priority, policy)
}

/// Realtime elevation that restores the thread's previous scheduling class on drop.
///
/// Must be dropped on the thread that entered it, so it is neither `Send` nor `Sync`.
pub struct ScopedElevation<P: RtPlatform = LinuxPlatform> {
    platform: P,
    previous: SchedState,
    priority: i32,
    _thread_bound: PhantomData<*const ()>,
}

impl<P: RtPlatform> ScopedElevation<P> {
    pub fn enter(mut platform: P, priority: f64, policy: SchedPolicy) -> RtResult<Self> {
        validate_priority(priority)?;
        let previous = platform.current_scheduler()?;
        let applied = elevate_with(&mut platform, priority, policy)?;

        Ok(Self {
            platform,
            previous,
            priority: applied,
            _thread_bound: PhantomData,
        })
    }

    /// Absolute priority applied on entry.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Scheduling class that will be restored on drop.
    pub fn previous(&self) -> SchedState {
        self.previous
    }
}

impl<P: RtPlatform> Drop for ScopedElevation<P> {
    fn drop(&mut self) {
        match self.platform.set_scheduler(self.previous) {
            Ok(()) => log::debug!("RT: Restored scheduler {:?}", self.previous),
            Err(e) => log::warn!("RT: Could not restore scheduler: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct RecordingPlatform {
        calls: Rc<RefCell<Vec<String>>>,
        fail_lock: bool,
        fail_scheduler: bool,
        current: Option<SchedState>,
    }

    impl RtPlatform for RecordingPlatform {
        fn lock_memory(&mut self) -> RtResult<()> {
            self.calls.borrow_mut().push("lock".into());
            if self.fail_lock {
                return Err(RtError::MemoryLock("denied".into()));
            }
            Ok(())
        }

        fn priority_range(&self, _policy: SchedPolicy) -> RtResult<(i32, i32)> {
            self.calls.borrow_mut().push("range".into());
            Ok((1, 99))
        }

        fn set_scheduler(&mut self, state: SchedState) -> RtResult<()> {
            self.calls
                .borrow_mut()
                .push(format!("set {} {}", state.policy, state.priority));
            if self.fail_scheduler {
                return Err(RtError::Scheduler("denied".into()));
            }
            Ok(())
        }

        fn current_scheduler(&self) -> RtResult<SchedState> {
            Ok(self.current.unwrap_or(SchedState {
                policy: 0,
                priority: 0,
            }))
        }
    }

    #[test]
    fn test_absolute_priority_interpolates_within_range() {
        for step in 0..=100 {
            let priority = step as f64 / 100.0;
            let abs = absolute_priority(1, 99, priority).unwrap();
            assert!((1..=99).contains(&abs));
            assert_eq!(abs, 1 + (98.0 * priority).floor() as i32);
        }
        assert_eq!(absolute_priority(1, 99, 0.0).unwrap(), 1);
        assert_eq!(absolute_priority(1, 99, 0.5).unwrap(), 50);
        assert_eq!(absolute_priority(1, 99, 1.0).unwrap(), 99);
    }

    #[test]
    fn test_out_of_range_priority_has_no_side_effects() {
        for priority in [-0.1, 1.0001, 2.0, f64::NAN] {
            let mut platform = RecordingPlatform::default();
            let err = elevate_with(&mut platform, priority, SchedPolicy::RoundRobin).unwrap_err();
            assert!(matches!(err, RtError::Configuration(_)));
            assert!(platform.calls.borrow().is_empty());
        }
    }

    #[test]
    fn test_elevate_locks_then_schedules() {
        let mut platform = RecordingPlatform::default();
        let applied = elevate_with(&mut platform, 1.0, SchedPolicy::RoundRobin).unwrap();
        assert_eq!(applied, 99);
        assert_eq!(
            *platform.calls.borrow(),
            vec![
                "lock".to_string(),
                "range".to_string(),
                format!("set {} 99", libc::SCHED_RR),
            ]
        );
    }

    #[test]
    fn test_lock_failure_skips_scheduler() {
        let mut platform = RecordingPlatform {
            fail_lock: true,
            ..Default::default()
        };
        let err = elevate_with(&mut platform, 0.5, SchedPolicy::Fifo).unwrap_err();
        assert!(matches!(err, RtError::MemoryLock(_)));
        assert_eq!(*platform.calls.borrow(), vec!["lock".to_string()]);
    }

    #[test]
    fn test_scheduler_rejection_is_reported() {
        let mut platform = RecordingPlatform {
            fail_scheduler: true,
            ..Default::default()
        };
        let err = elevate_with(&mut platform, 0.5, SchedPolicy::Fifo).unwrap_err();
        assert!(matches!(err, RtError::Scheduler(_)));
    }

    #[test]
    fn test_scoped_elevation_restores_previous() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let platform = RecordingPlatform {
            calls: calls.clone(),
            current: Some(SchedState {
                policy: 0,
                priority: 0,
            }),
            ..Default::default()
        };

        {
            let scoped = ScopedElevation::enter(platform, 0.0, SchedPolicy::Fifo).unwrap();
            assert_eq!(scoped.priority(), 1);
            assert_eq!(scoped.previous().policy, 0);
        }

        assert_eq!(calls.borrow().last().map(String::as_str), Some("set 0 0"));
    }
}
