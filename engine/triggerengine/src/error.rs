//! Error taxonomy of the trigger generator.

use gpiogateway::GpioError;
use rtservices::RtError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriggerError {
    /// Static misconfiguration: bad ranges, empty label, invalid sequence
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Device, ioctl, memory-lock or scheduler failure, usually permissions or hardware.
    /// Also a labelled controller missing from every probed path.
    #[error("resource error: {0}")]
    Resource(String),
}

pub type TriggerResult<T> = Result<T, TriggerError>;

impl From<RtError> for TriggerError {
    fn from(e: RtError) -> Self {
        match e {
            RtError::Configuration(msg) => TriggerError::Configuration(msg),
            other => TriggerError::Resource(other.to_string()),
        }
    }
}

impl From<GpioError> for TriggerError {
    fn from(e: GpioError) -> Self {
        match e {
            GpioError::NoLines | GpioError::TooManyLines(_) | GpioError::AlreadyRequested => {
                TriggerError::Configuration(e.to_string())
            }
            other => TriggerError::Resource(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rt_errors_map_onto_taxonomy() {
        let cfg: TriggerError = RtError::Configuration("priority 2 out of range".into()).into();
        assert!(matches!(cfg, TriggerError::Configuration(_)));

        let lock: TriggerError = RtError::MemoryLock("denied".into()).into();
        assert!(matches!(lock, TriggerError::Resource(_)));

        let sched: TriggerError = RtError::Scheduler("denied".into()).into();
        assert!(matches!(sched, TriggerError::Resource(_)));
    }

    #[test]
    fn test_gpio_errors_map_onto_taxonomy() {
        let closed: TriggerError = GpioError::NotOpen.into();
        assert!(matches!(closed, TriggerError::Resource(_)));

        let open: TriggerError = GpioError::Open {
            path: "/dev/gpiochip0".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }
        .into();
        assert!(matches!(open, TriggerError::Resource(_)));

        let again: TriggerError = GpioError::AlreadyRequested.into();
        assert!(matches!(again, TriggerError::Configuration(_)));

        let none: TriggerError = GpioError::NoLines.into();
        assert!(matches!(none, TriggerError::Configuration(_)));
    }
}
