//! Trigger generator configuration.
//!
//! Defaults drive a 25 Hz trigger (40 ms period, 25% high) on the board's main GPIO
//! controller. `validate` is strict so misconfiguration fails before any device is touched.

use std::path::Path;

use gpiogateway::{ProbeConfig, ProbePolicy, DEFAULT_CONSUMER};
use rtservices::SchedPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{TriggerError, TriggerResult};

/// Label of the main GPIO controller on Jetson boards.
pub const DEFAULT_CONTROLLER_LABEL: &str = "tegra-gpio";
/// 25 fps
pub const DEFAULT_PERIOD_SECS: f64 = 0.04;
pub const DEFAULT_DUTY_CYCLE: f64 = 0.25;

/// How the loop thread enters realtime mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Lock memory and switch scheduling class before the first write
    pub elevate: bool,
    /// Normalized priority in [0, 1]
    pub priority: f64,
    pub policy: SchedPolicy,
    /// Restore the thread's previous scheduling class when the loop exits.
    /// The memory lock is kept either way.
    pub restore_on_exit: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            elevate: true,
            priority: 1.0,
            policy: SchedPolicy::RoundRobin,
            restore_on_exit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub controller_label: String,
    pub probe: ProbeConfig,
    /// Consumer label attached to the output request
    pub consumer: String,
    /// Line offsets driven together
    pub lines: Vec<u32>,
    pub period: f64,
    pub duty_cycle: f64,
    pub realtime: RealtimeConfig,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            controller_label: DEFAULT_CONTROLLER_LABEL.to_string(),
            probe: ProbeConfig::default(),
            consumer: DEFAULT_CONSUMER.to_string(),
            lines: Vec::new(),
            period: DEFAULT_PERIOD_SECS,
            duty_cycle: DEFAULT_DUTY_CYCLE,
            realtime: RealtimeConfig::default(),
        }
    }
}

impl TriggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> TriggerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TriggerError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            TriggerError::Configuration(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    pub fn with_controller_label(mut self, label: impl Into<String>) -> Self {
        self.controller_label = label.into();
        self
    }

    pub fn with_line(mut self, offset: u32) -> Self {
        self.lines.push(offset);
        self
    }

    pub fn with_lines(mut self, offsets: impl IntoIterator<Item = u32>) -> Self {
        self.lines = offsets.into_iter().collect();
        self
    }

    pub fn with_period(mut self, seconds: f64) -> Self {
        self.period = seconds;
        self
    }

    pub fn with_duty_cycle(mut self, duty_cycle: f64) -> Self {
        self.duty_cycle = duty_cycle;
        self
    }

    pub fn with_probe_policy(mut self, policy: ProbePolicy) -> Self {
        self.probe.policy = policy;
        self
    }

    pub fn with_priority(mut self, priority: f64, policy: SchedPolicy) -> Self {
        self.realtime.priority = priority;
        self.realtime.policy = policy;
        self
    }

    pub fn without_elevation(mut self) -> Self {
        self.realtime.elevate = false;
        self
    }

    /// Validate ranges. Keep this strict to fail fast.
    pub fn validate(&self) -> TriggerResult<()> {
        if self.controller_label.trim().is_empty() {
            return Err(TriggerError::Configuration(
                "no valid gpio controller label provided".into(),
            ));
        }
        if self.probe.probe_count == 0 {
            return Err(TriggerError::Configuration(
                "probe.probe_count must be at least 1".into(),
            ));
        }
        if !self.period.is_finite() || self.period <= 0.0 {
            return Err(TriggerError::Configuration(format!(
                "period {} must be a positive number of seconds",
                self.period
            )));
        }
        if !(0.0..=1.0).contains(&self.duty_cycle) {
            return Err(TriggerError::Configuration(format!(
                "duty cycle {} out of range [0, 1]",
                self.duty_cycle
            )));
        }
        if !(0.0..=1.0).contains(&self.realtime.priority) {
            return Err(TriggerError::Configuration(format!(
                "priority {} out of range [0, 1]",
                self.realtime.priority
            )));
        }
        Ok(())
    }
}
