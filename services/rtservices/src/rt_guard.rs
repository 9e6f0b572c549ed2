//! Wake-up lateness and per-run statistics of an RT pattern loop.

use std::time::Duration;

/// Lateness statistics collected at every deadline wake-up
#[derive(Debug, Clone, serde::Serialize)]
pub struct LatenessStats {
    pub min_us: u64,
    pub max_us: u64,
    pub avg_us: f64,
    pub samples: u64,
    pub histogram: [u64; 10], // Buckets: 0-10us, 10-20us, ..., 90-100us+
}

impl LatenessStats {
    pub fn new() -> Self {
        Self {
            min_us: 0,
            max_us: 0,
            avg_us: 0.0,
            samples: 0,
            histogram: [0; 10],
        }
    }

    pub fn record(&mut self, late_us: u64) {
        self.min_us = if self.samples == 0 {
            late_us
        } else {
            self.min_us.min(late_us)
        };
        self.max_us = self.max_us.max(late_us);

        // Rolling average
        self.samples += 1;
        self.avg_us = self.avg_us + (late_us as f64 - self.avg_us) / self.samples as f64;

        let bucket = (late_us / 10).min(9) as usize;
        self.histogram[bucket] += 1;
    }
}

impl Default for LatenessStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics of one run of the pattern loop, handed back through the thread join.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LoopStats {
    /// Completed passes over the whole sequence
    pub cycles: u64,
    /// Patterns written to the output lines
    pub patterns: u64,
    /// Wake-ups later than the duration of the pattern that just ended
    pub overruns: u64,
    pub max_late: Duration,
    pub lateness: LatenessStats,
}

/// Record one deadline wake-up. Returns true if it counts as an overrun.
///
/// A wake-up is an overrun when it is later than `budget`, the duration of the phase
/// that just ended: the following phase was then shortened by more than a full phase.
pub fn record_wake(stats: &mut LoopStats, late: Duration, budget: Duration) -> bool {
    stats.patterns += 1;
    stats.lateness.record(late.as_micros() as u64);
    if late > stats.max_late {
        stats.max_late = late;
    }

    if late <= budget {
        return false;
    }

    stats.overruns += 1;
    if stats.overruns == 1 || stats.overruns % 1000 == 0 {
        log::warn!(
            "RT overrun: woke {:?} late, phase budget {:?} (overrun #{})",
            late,
            budget,
            stats.overruns
        );
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lateness_stats() {
        let mut stats = LatenessStats::new();
        stats.record(5);
        stats.record(15);
        stats.record(250);

        assert_eq!(stats.min_us, 5);
        assert_eq!(stats.max_us, 250);
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.histogram[0], 1);
        assert_eq!(stats.histogram[1], 1);
        assert_eq!(stats.histogram[9], 1);
        assert!((stats.avg_us - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_lateness_stats_report_zero() {
        let stats = LoopStats::default();
        assert_eq!(stats.lateness.min_us, 0);
        assert_eq!(stats.lateness.samples, 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["lateness"]["min_us"], 0);

        let mut lateness = LatenessStats::new();
        lateness.record(40);
        lateness.record(70);
        assert_eq!(lateness.min_us, 40);
    }

    #[test]
    fn test_record_wake_on_time() {
        let mut stats = LoopStats::default();
        let overrun = record_wake(
            &mut stats,
            Duration::from_micros(40),
            Duration::from_millis(10),
        );
        assert!(!overrun);
        assert_eq!(stats.patterns, 1);
        assert_eq!(stats.overruns, 0);
        assert_eq!(stats.max_late, Duration::from_micros(40));
    }

    #[test]
    fn test_record_wake_counts_overruns() {
        let mut stats = LoopStats::default();
        let budget = Duration::from_micros(100);
        let late = Duration::from_micros(200);

        assert!(record_wake(&mut stats, late, budget));
        assert!(record_wake(&mut stats, late, budget));
        assert!(!record_wake(&mut stats, Duration::ZERO, budget));
        assert_eq!(stats.overruns, 2);
        assert_eq!(stats.patterns, 3);
        assert_eq!(stats.max_late, late);
    }
}
