//! Controller discovery by label.
//!
//! Candidates are the conventional device paths `<prefix>0` .. `<prefix>9`, probed in
//! order. The first controller whose label matches wins. A label that matches nothing is
//! `Ok(None)`; only open failures are errors.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chip::{GpioChip, GpioResult};
use crate::traits::LabeledChip;

/// Upper bound on probed indices.
pub const MAX_PROBES: u32 = 10;

/// What to do when a candidate device cannot be opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbePolicy {
    /// Fail discovery with the open error. Assumes contiguous live indices.
    #[default]
    AbortOnOpenFailure,
    /// Log the failure and move on to the next index.
    SkipFailedOpens,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub path_prefix: String,
    /// Number of indices to probe, capped at [`MAX_PROBES`]
    pub probe_count: u32,
    pub policy: ProbePolicy,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            path_prefix: "/dev/gpiochip".to_string(),
            probe_count: MAX_PROBES,
            policy: ProbePolicy::default(),
        }
    }
}

impl ProbeConfig {
    pub fn candidate_path(&self, index: u32) -> PathBuf {
        PathBuf::from(format!("{}{}", self.path_prefix, index))
    }

    pub fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        (0..self.probe_count.min(MAX_PROBES)).map(|index| self.candidate_path(index))
    }
}

/// Probe candidates with `open` and return the first chip labelled `label`.
pub fn probe_by_label<C, F>(label: &str, config: &ProbeConfig, mut open: F) -> GpioResult<Option<C>>
where
    C: LabeledChip,
    F: FnMut(&Path) -> GpioResult<C>,
{
    for path in config.candidates() {
        let chip = match open(&path) {
            Ok(chip) => chip,
            Err(e) => match config.policy {
                ProbePolicy::AbortOnOpenFailure => {
                    log::debug!("GPIO: probe of {} failed, aborting: {}", path.display(), e);
                    return Err(e);
                }
                ProbePolicy::SkipFailedOpens => {
                    log::debug!("GPIO: probe of {} failed, skipping: {}", path.display(), e);
                    continue;
                }
            },
        };

        log::debug!("GPIO: {} has label '{}'", path.display(), chip.label());
        if chip.label() == label {
            log::info!("GPIO: found controller '{}' at {}", label, path.display());
            return Ok(Some(chip));
        }
    }

    Ok(None)
}

/// Locate the GPIO controller labelled `label`; requests made through it use `consumer`.
pub fn open_by_label(
    label: &str,
    config: &ProbeConfig,
    consumer: &str,
) -> GpioResult<Option<GpioChip>> {
    probe_by_label(label, config, |path| {
        GpioChip::new().with_consumer(consumer).opened(path)
    })
}
