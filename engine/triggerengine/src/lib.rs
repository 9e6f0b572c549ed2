//! Trigger Engine Crate
//!
//! Emits a precisely timed waveform on GPIO lines to hardware-trigger cameras from a
//! common timebase:
//! - [`PatternSequence`]: the cyclic list of (duration, values) phases
//! - [`RealtimeLoop`]: absolute-deadline playback on an elevated thread
//! - [`PatternGenerator`]: controller discovery, line binding and the loop thread
//!
//! # Example
//!
//! ```rust,ignore
//! use triggerengine::{PatternGenerator, TriggerConfig};
//!
//! let mut generator = PatternGenerator::new(TriggerConfig::default());
//! generator.open(120, 0.04, 0.25)?;
//! generator.generate_square_wave()?;
//!
//! let handle = generator.spawn()?;
//! // ... acquisition runs ...
//! let stats = handle.stop_and_join()?;
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod pattern;
pub mod realtime_loop;

// Re-exports
pub use config::{RealtimeConfig, TriggerConfig};
pub use error::{TriggerError, TriggerResult};
pub use generator::{PatternGenerator, TriggerHandle};
pub use pattern::{Pattern, PatternSequence};
pub use realtime_loop::RealtimeLoop;

pub use gpiogateway::{ProbeConfig, ProbePolicy};
pub use rtservices::{LoopState, LoopStats, SchedPolicy};
