//! GPIO Gateway Crate
//!
//! Hardware side of the trigger generator:
//! - [`GpioChip`]: a Linux GPIO controller opened through its character device
//! - [`discovery`]: locating a controller by label among `/dev/gpiochip0..9`
//! - [`OutputLines`]: the seam the pattern loop writes through
//! - [`MockLines`]: an in-memory implementation for tests and dry runs

pub mod chip;
pub mod discovery;
pub mod mock;
pub mod traits;

pub use chip::{GpioChip, GpioError, GpioResult, DEFAULT_CONSUMER, GPIOHANDLES_MAX};
pub use discovery::{open_by_label, probe_by_label, ProbeConfig, ProbePolicy, MAX_PROBES};
pub use mock::{LineWrite, MockLines};
pub use traits::{LabeledChip, OutputLines};
