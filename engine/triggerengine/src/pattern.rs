//! Pattern sequences: the periodic waveform played on the output lines.
//!
//! A sequence is an ordered, cyclic list of (duration, values) entries. Playback order is
//! insertion order and wraps from the last entry to the first.

use std::time::Duration;

use rtservices::micros_from_secs;

use crate::error::{TriggerError, TriggerResult};

/// One phase of the waveform: hold `values` on the lines for `duration` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    duration: f64,
    values: Vec<bool>,
}

impl Pattern {
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Duration in whole microseconds, as used for deadline arithmetic.
    pub fn interval(&self) -> Duration {
        micros_from_secs(self.duration)
    }

    pub fn values(&self) -> &[bool] {
        &self.values
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternSequence {
    patterns: Vec<Pattern>,
    /// Size of the bound line set
    line_count: usize,
}

impl PatternSequence {
    pub fn new(line_count: usize) -> Self {
        Self {
            patterns: Vec::new(),
            line_count,
        }
    }

    /// Two-phase square wave: all lines high for `period * duty_cycle`, then low for the rest.
    pub fn square_wave(period: f64, duty_cycle: f64, line_count: usize) -> TriggerResult<Self> {
        if !period.is_finite() || period <= 0.0 {
            return Err(TriggerError::Configuration(format!(
                "square wave period {} must be positive",
                period
            )));
        }
        if !(0.0..=1.0).contains(&duty_cycle) {
            return Err(TriggerError::Configuration(format!(
                "duty cycle {} out of range [0, 1]",
                duty_cycle
            )));
        }

        Ok(Self {
            patterns: vec![
                Pattern {
                    duration: period * duty_cycle,
                    values: vec![true; line_count],
                },
                Pattern {
                    duration: period * (1.0 - duty_cycle),
                    values: vec![false; line_count],
                },
            ],
            line_count,
        })
    }

    /// Append an explicit entry. Matching the line count is checked when the loop starts.
    pub fn append(&mut self, duration: f64, values: Vec<bool>) -> TriggerResult<()> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(TriggerError::Configuration(format!(
                "pattern duration {} must be positive",
                duration
            )));
        }
        self.patterns.push(Pattern { duration, values });
        Ok(())
    }

    /// Append an entry whose line `i` takes bit `i` of `bits`.
    pub fn append_bits(&mut self, duration: f64, bits: u64) -> TriggerResult<()> {
        let values = (0..self.line_count)
            .map(|i| i < 64 && (bits >> i) & 1 == 1)
            .collect();
        self.append(duration, values)
    }

    pub fn count(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn is_valid_index(&self, index: usize) -> bool {
        index < self.patterns.len()
    }

    pub fn get(&self, index: usize) -> Option<&Pattern> {
        self.patterns.get(index)
    }

    /// Duration of entry `index` in seconds, 0 for an invalid index.
    pub fn duration(&self, index: usize) -> f64 {
        self.patterns.get(index).map_or(0.0, Pattern::duration)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pattern> {
        self.patterns.iter()
    }

    /// Length of one full pass over the sequence, in deadline microseconds.
    pub fn cycle_interval(&self) -> Duration {
        self.patterns.iter().map(Pattern::interval).sum()
    }

    /// Check the invariants the loop relies on against `requested` output lines.
    pub fn validate(&self, requested: usize) -> TriggerResult<()> {
        if self.patterns.is_empty() {
            return Err(TriggerError::Configuration("pattern sequence is empty".into()));
        }
        for (index, pattern) in self.patterns.iter().enumerate() {
            if pattern.interval().is_zero() {
                return Err(TriggerError::Configuration(format!(
                    "pattern {} lasts {} s, less than one microsecond",
                    index, pattern.duration
                )));
            }
            if pattern.values.len() != requested {
                return Err(TriggerError::Configuration(format!(
                    "pattern {} has {} values for {} requested lines",
                    index,
                    pattern.values.len(),
                    requested
                )));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a PatternSequence {
    type Item = &'a Pattern;
    type IntoIter = std::slice::Iter<'a, Pattern>;

    fn into_iter(self) -> Self::IntoIter {
        self.patterns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_wave_default_trigger() {
        let seq = PatternSequence::square_wave(0.04, 0.25, 1).unwrap();
        assert_eq!(seq.count(), 2);

        let high = seq.get(0).unwrap();
        let low = seq.get(1).unwrap();
        assert_eq!(high.duration(), 0.01);
        assert_eq!(low.duration(), 0.03);
        assert_eq!(high.values(), &[true]);
        assert_eq!(low.values(), &[false]);

        assert_eq!(high.interval(), Duration::from_micros(10_000));
        assert_eq!(low.interval(), Duration::from_micros(30_000));
        assert_eq!(seq.cycle_interval(), Duration::from_micros(40_000));
        assert_eq!(seq.duration(0) + seq.duration(1), 0.04);
    }

    #[test]
    fn test_square_wave_sizes_values_to_lines() {
        let seq = PatternSequence::square_wave(0.01, 0.5, 3).unwrap();
        assert_eq!(seq.get(0).unwrap().values(), &[true, true, true]);
        assert_eq!(seq.get(1).unwrap().values(), &[false, false, false]);
        assert!(seq.validate(3).is_ok());
    }

    #[test]
    fn test_square_wave_rejects_bad_input() {
        assert!(PatternSequence::square_wave(0.0, 0.5, 1).is_err());
        assert!(PatternSequence::square_wave(0.04, 1.2, 1).is_err());
    }

    #[test]
    fn test_append_bits_maps_bit_i_to_line_i() {
        let mut seq = PatternSequence::new(3);
        seq.append_bits(0.001, 0b101).unwrap();
        assert_eq!(seq.get(0).unwrap().values(), &[true, false, true]);

        seq.append_bits(0.001, 0b11110).unwrap();
        assert_eq!(seq.get(1).unwrap().values(), &[false, true, true]);
    }

    #[test]
    fn test_append_rejects_non_positive_duration() {
        let mut seq = PatternSequence::new(1);
        assert!(seq.append(0.0, vec![true]).is_err());
        assert!(seq.append(-0.01, vec![true]).is_err());
        assert!(seq.append(f64::NAN, vec![true]).is_err());
        assert!(seq.is_empty());
    }

    #[test]
    fn test_append_keeps_insertion_order() {
        let mut seq = PatternSequence::new(2);
        seq.append(0.003, vec![true, false]).unwrap();
        seq.append(0.001, vec![false, true]).unwrap();
        seq.append(0.002, vec![true, true]).unwrap();

        let durations: Vec<f64> = seq.iter().map(Pattern::duration).collect();
        assert_eq!(durations, vec![0.003, 0.001, 0.002]);
    }

    #[test]
    fn test_invalid_index_is_not_an_error() {
        let seq = PatternSequence::square_wave(0.04, 0.25, 1).unwrap();
        assert!(seq.is_valid_index(1));
        assert!(!seq.is_valid_index(2));
        assert_eq!(seq.duration(2), 0.0);
        assert_eq!(seq.duration(usize::MAX), 0.0);
        assert!(seq.get(2).is_none());
    }

    #[test]
    fn test_validate_invariants() {
        let empty = PatternSequence::new(1);
        assert!(matches!(empty.validate(1), Err(TriggerError::Configuration(_))));

        let mut mismatched = PatternSequence::new(2);
        mismatched.append(0.01, vec![true]).unwrap();
        assert!(matches!(mismatched.validate(2), Err(TriggerError::Configuration(_))));

        let degenerate = PatternSequence::square_wave(0.04, 1.0, 1).unwrap();
        assert!(matches!(degenerate.validate(1), Err(TriggerError::Configuration(_))));
    }
}
