//! Realtime pattern loop.
//!
//! Plays a [`PatternSequence`] on a set of output lines until stopped. Each pattern is
//! written immediately, then the absolute deadline advances by the pattern's duration and
//! the thread sleeps until it. The stop flag is checked once per full cycle, so a stop
//! request takes effect after at most one cycle and the lines are always left in the
//! state of the last pattern.

use std::time::Duration;

use gpiogateway::OutputLines;
use rtservices::{
    elevate, record_wake, Deadline, LinuxPlatform, LoopContext, LoopState, LoopStats,
    ScopedElevation,
};

use crate::config::RealtimeConfig;
use crate::error::TriggerResult;
use crate::pattern::PatternSequence;

pub struct RealtimeLoop<'a, L: OutputLines + ?Sized> {
    lines: &'a mut L,
    patterns: &'a PatternSequence,
    realtime: &'a RealtimeConfig,
    ctx: &'a LoopContext,
}

impl<'a, L: OutputLines + ?Sized> RealtimeLoop<'a, L> {
    pub fn new(
        lines: &'a mut L,
        patterns: &'a PatternSequence,
        realtime: &'a RealtimeConfig,
        ctx: &'a LoopContext,
    ) -> Self {
        Self {
            lines,
            patterns,
            realtime,
            ctx,
        }
    }

    /// Run until a stop is requested or a write fails. Blocks the calling thread.
    ///
    /// Validation or elevation failures abort before the first write. The context ends
    /// in `Stopped` on every path.
    pub fn run(&mut self) -> TriggerResult<LoopStats> {
        let result = self.run_inner();
        self.ctx.set_state(LoopState::Stopped);

        match &result {
            Ok(stats) => log::info!(
                "Trigger signal generator stopped after {} cycles ({} overruns, max late {:?})",
                stats.cycles,
                stats.overruns,
                stats.max_late
            ),
            Err(e) => log::error!("Trigger signal generator failed: {}", e),
        }
        result
    }

    fn run_inner(&mut self) -> TriggerResult<LoopStats> {
        self.patterns.validate(self.lines.requested_outputs())?;

        let _restore = self.enter_realtime()?;

        let intervals: Vec<Duration> = self.patterns.iter().map(|p| p.interval()).collect();
        let mut stats = LoopStats::default();

        log::info!(
            "Trigger signal generator is starting: {} patterns, cycle {:?}",
            intervals.len(),
            self.patterns.cycle_interval()
        );
        self.ctx.enter_running();

        let mut deadline = Deadline::now();
        while !self.ctx.is_stop_requested() {
            for (pattern, &interval) in self.patterns.iter().zip(&intervals) {
                self.lines.set_outputs(pattern.values())?;
                deadline.advance(interval);
                let late = deadline.sleep_until();
                record_wake(&mut stats, late, interval);
            }
            stats.cycles += 1;
        }

        Ok(stats)
    }

    fn enter_realtime(&self) -> TriggerResult<Option<ScopedElevation>> {
        let rt = self.realtime;
        if !rt.elevate {
            log::debug!("RT: elevation disabled, running with inherited scheduling");
            return Ok(None);
        }

        if rt.restore_on_exit {
            let scoped = ScopedElevation::enter(LinuxPlatform, rt.priority, rt.policy)?;
            log::info!(
                "RT: trigger thread at {:?} priority {} until the loop exits",
                rt.policy,
                scoped.priority()
            );
            return Ok(Some(scoped));
        }

        let applied = elevate(rt.priority, rt.policy)?;
        log::info!("RT: trigger thread at {:?} priority {}", rt.policy, applied);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpiogateway::MockLines;
    use std::time::Instant;

    use crate::error::TriggerError;

    fn no_elevation() -> RealtimeConfig {
        RealtimeConfig {
            elevate: false,
            ..Default::default()
        }
    }

    fn run_for(
        lines: &mut MockLines,
        patterns: &PatternSequence,
        run: Duration,
    ) -> (TriggerResult<LoopStats>, Duration) {
        let realtime = no_elevation();
        let ctx = LoopContext::new();
        std::thread::scope(|s| {
            let handle = s.spawn(|| RealtimeLoop::new(lines, patterns, &realtime, &ctx).run());
            std::thread::sleep(run);
            let stop_at = Instant::now();
            ctx.request_stop();
            let result = handle.join().unwrap();
            (result, stop_at.elapsed())
        })
    }

    #[test]
    fn test_plays_sequence_in_order_and_wraps() {
        let mut patterns = PatternSequence::new(2);
        patterns.append(0.002, vec![true, false]).unwrap();
        patterns.append(0.001, vec![false, true]).unwrap();
        patterns.append(0.001, vec![true, true]).unwrap();

        let mut lines = MockLines::new(2);
        let observer = lines.clone();
        let (result, _) = run_for(&mut lines, &patterns, Duration::from_millis(30));
        let stats = result.unwrap();

        let writes = observer.writes();
        assert!(writes.len() >= 3);
        assert_eq!(writes.len() % 3, 0);
        assert_eq!(stats.patterns as usize, writes.len());
        assert_eq!(stats.cycles as usize, writes.len() / 3);
        for (i, write) in writes.iter().enumerate() {
            assert_eq!(write.values, patterns.get(i % 3).unwrap().values());
        }
    }

    #[test]
    fn test_writes_follow_absolute_deadlines() {
        let patterns = PatternSequence::square_wave(0.004, 0.25, 1).unwrap();
        let mut lines = MockLines::new(1);
        let observer = lines.clone();
        let (result, _) = run_for(&mut lines, &patterns, Duration::from_millis(60));
        result.unwrap();

        let writes = observer.writes();
        let first = writes[0].at;
        let mut expected = Duration::ZERO;
        for (i, write) in writes.iter().enumerate() {
            let actual = write.at.duration_since(first);
            assert!(
                actual + Duration::from_millis(1) >= expected,
                "write {} at {:?}, deadline {:?}",
                i,
                actual,
                expected
            );
            expected += patterns.get(i % 2).unwrap().interval();
        }
    }

    #[test]
    fn test_stop_takes_effect_within_one_cycle() {
        let patterns = PatternSequence::square_wave(0.010, 0.5, 1).unwrap();
        let mut lines = MockLines::new(1);
        let observer = lines.clone();
        let (result, join_latency) = run_for(&mut lines, &patterns, Duration::from_millis(25));
        result.unwrap();

        assert!(join_latency <= patterns.cycle_interval() + Duration::from_millis(250));

        let writes = observer.writes();
        assert_eq!(writes.len() % 2, 0);
        assert_eq!(writes.last().unwrap().values, vec![false]);
    }

    #[test]
    fn test_stop_before_start_writes_nothing() {
        let patterns = PatternSequence::square_wave(0.004, 0.25, 1).unwrap();
        let mut lines = MockLines::new(1);
        let realtime = no_elevation();
        let ctx = LoopContext::new();
        ctx.request_stop();

        let stats = RealtimeLoop::new(&mut lines, &patterns, &realtime, &ctx)
            .run()
            .unwrap();
        assert_eq!(stats.cycles, 0);
        assert_eq!(lines.write_count(), 0);
        assert_eq!(ctx.state(), LoopState::Stopped);
    }

    #[test]
    fn test_write_failure_is_fatal() {
        let patterns = PatternSequence::square_wave(0.002, 0.5, 1).unwrap();
        let mut lines = MockLines::new(1).failing_after(3);
        let realtime = no_elevation();
        let ctx = LoopContext::new();

        let err = RealtimeLoop::new(&mut lines, &patterns, &realtime, &ctx)
            .run()
            .unwrap_err();
        assert!(matches!(err, TriggerError::Resource(_)));
        assert_eq!(lines.write_count(), 3);
        assert_eq!(ctx.state(), LoopState::Stopped);
    }

    #[test]
    fn test_invalid_sequence_aborts_before_any_write() {
        let mut lines = MockLines::new(1);
        let realtime = RealtimeConfig::default();
        let ctx = LoopContext::new();

        let empty = PatternSequence::new(1);
        let err = RealtimeLoop::new(&mut lines, &empty, &realtime, &ctx)
            .run()
            .unwrap_err();
        assert!(matches!(err, TriggerError::Configuration(_)));

        let wide = PatternSequence::square_wave(0.01, 0.5, 2).unwrap();
        let err = RealtimeLoop::new(&mut lines, &wide, &realtime, &ctx)
            .run()
            .unwrap_err();
        assert!(matches!(err, TriggerError::Configuration(_)));
        assert_eq!(lines.write_count(), 0);
    }

    #[test]
    fn test_out_of_range_priority_aborts_before_any_write() {
        let patterns = PatternSequence::square_wave(0.01, 0.5, 1).unwrap();
        let mut lines = MockLines::new(1);
        let realtime = RealtimeConfig {
            priority: 1.5,
            ..Default::default()
        };
        let ctx = LoopContext::new();

        let err = RealtimeLoop::new(&mut lines, &patterns, &realtime, &ctx)
            .run()
            .unwrap_err();
        assert!(matches!(err, TriggerError::Configuration(_)));
        assert_eq!(lines.write_count(), 0);
    }
}
