//! Pattern generator: the surface the image-acquisition side drives.
//!
//! Typical use: `open` the trigger line, `generate_square_wave`, `spawn` the loop on its
//! own thread once acquisition is armed, and `stop_and_join` before tearing down.
//! `spawn` consumes the generator, so the sequence cannot change while the loop runs.

use std::thread::JoinHandle;

use gpiogateway::{open_by_label, GpioChip, OutputLines};
use rtservices::{LoopContext, LoopState, LoopStats};

use crate::config::TriggerConfig;
use crate::error::{TriggerError, TriggerResult};
use crate::pattern::PatternSequence;
use crate::realtime_loop::RealtimeLoop;

const THREAD_NAME: &str = "siggen-rt";

pub struct PatternGenerator<L: OutputLines = GpioChip> {
    config: TriggerConfig,
    lines: L,
    patterns: PatternSequence,
    ctx: LoopContext,
}

impl PatternGenerator<GpioChip> {
    pub fn new(config: TriggerConfig) -> Self {
        let chip = GpioChip::new().with_consumer(config.consumer.clone());
        Self::with_lines(config, chip)
    }

    /// Bind `line` as the only trigger output with the given waveform parameters.
    ///
    /// The configuration is updated only when the line is bound.
    pub fn open(&mut self, line: u32, period: f64, duty_cycle: f64) -> TriggerResult<()> {
        let candidate = self
            .config
            .clone()
            .with_lines([line])
            .with_period(period)
            .with_duty_cycle(duty_cycle);
        self.bind(candidate)
    }

    /// Locate the configured controller and claim the configured lines as outputs.
    pub fn open_configured(&mut self) -> TriggerResult<()> {
        self.bind(self.config.clone())
    }

    fn bind(&mut self, config: TriggerConfig) -> TriggerResult<()> {
        config.validate()?;
        if config.lines.is_empty() {
            return Err(TriggerError::Configuration("no output lines configured".into()));
        }

        let label = &config.controller_label;
        let mut chip = open_by_label(label, &config.probe, &config.consumer)?.ok_or_else(|| {
            TriggerError::Resource(format!("gpio controller not found: {}", label))
        })?;
        chip.request_outputs(&config.lines)?;

        log::info!(
            "Trigger lines {:?} bound on '{}' ({}, {})",
            config.lines,
            chip.label(),
            chip.name(),
            chip.path().map(|p| p.display().to_string()).unwrap_or_default()
        );

        self.lines = chip;
        self.patterns = PatternSequence::new(self.lines.requested_outputs());
        self.config = config;
        self.ctx.set_state(LoopState::Configuring);
        Ok(())
    }

    pub fn chip(&self) -> &GpioChip {
        &self.lines
    }
}

impl<L: OutputLines> PatternGenerator<L> {
    /// Generator over already-requested output lines.
    pub fn with_lines(config: TriggerConfig, lines: L) -> Self {
        let patterns = PatternSequence::new(lines.requested_outputs());
        Self {
            config,
            lines,
            patterns,
            ctx: LoopContext::new(),
        }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Replace the sequence with the two-phase square wave of the configured period and duty cycle.
    pub fn generate_square_wave(&mut self) -> TriggerResult<()> {
        self.patterns = PatternSequence::square_wave(
            self.config.period,
            self.config.duty_cycle,
            self.lines.requested_outputs(),
        )?;
        self.ctx.set_state(LoopState::Configuring);
        Ok(())
    }

    pub fn append_pattern(&mut self, duration: f64, values: Vec<bool>) -> TriggerResult<()> {
        self.patterns.append(duration, values)?;
        self.ctx.set_state(LoopState::Configuring);
        Ok(())
    }

    /// Append a pattern whose line `i` takes bit `i` of `bits`.
    pub fn append_pattern_bits(&mut self, duration: f64, bits: u64) -> TriggerResult<()> {
        self.patterns.append_bits(duration, bits)?;
        self.ctx.set_state(LoopState::Configuring);
        Ok(())
    }

    pub fn patterns(&self) -> &PatternSequence {
        &self.patterns
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.count()
    }

    pub fn valid_pattern_index(&self, index: usize) -> bool {
        self.patterns.is_valid_index(index)
    }

    /// Duration of pattern `index` in seconds, 0 for an invalid index.
    pub fn pattern_duration(&self, index: usize) -> f64 {
        self.patterns.duration(index)
    }

    /// Write pattern `index` to the lines once. No-op for an invalid index.
    pub fn execute_pattern(&mut self, index: usize) -> TriggerResult<()> {
        if let Some(pattern) = self.patterns.get(index) {
            self.lines.set_outputs(pattern.values())?;
        }
        Ok(())
    }

    /// Play the sequence on the calling thread until stopped. Blocking.
    pub fn loop_all_patterns_realtime(&mut self) -> TriggerResult<LoopStats> {
        RealtimeLoop::new(
            &mut self.lines,
            &self.patterns,
            &self.config.realtime,
            &self.ctx,
        )
        .run()
    }

    /// Ask the loop to stop after the current cycle. Returns immediately.
    pub fn stop_all_patterns(&self) {
        self.ctx.request_stop();
    }

    /// Shared context for stopping the loop from another thread.
    pub fn context(&self) -> LoopContext {
        self.ctx.clone()
    }

    pub fn state(&self) -> LoopState {
        self.ctx.state()
    }
}

impl<L: OutputLines + Send + 'static> PatternGenerator<L> {
    /// Move the generator onto a dedicated thread and start the loop there.
    ///
    /// The output lines are released when the thread finishes.
    pub fn spawn(mut self) -> TriggerResult<TriggerHandle> {
        let ctx = self.ctx.clone();
        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || self.loop_all_patterns_realtime())
            .map_err(|e| {
                TriggerError::Resource(format!("failed to spawn trigger thread: {}", e))
            })?;

        Ok(TriggerHandle {
            ctx,
            thread: Some(thread),
        })
    }
}

/// Control-thread side of a spawned loop.
///
/// Dropping an unjoined handle requests a stop and waits for the thread.
pub struct TriggerHandle {
    ctx: LoopContext,
    thread: Option<JoinHandle<TriggerResult<LoopStats>>>,
}

impl TriggerHandle {
    pub fn stop_all_patterns(&self) {
        self.ctx.request_stop();
    }

    pub fn state(&self) -> LoopState {
        self.ctx.state()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the loop thread and return its outcome. Waits unconditionally.
    pub fn join(mut self) -> TriggerResult<LoopStats> {
        self.join_thread()
    }

    pub fn stop_and_join(self) -> TriggerResult<LoopStats> {
        self.stop_all_patterns();
        self.join()
    }

    fn join_thread(&mut self) -> TriggerResult<LoopStats> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| TriggerError::Resource("trigger thread already joined".into()))?;
        thread
            .join()
            .map_err(|_| TriggerError::Resource("trigger thread panicked".into()))?
    }
}

impl Drop for TriggerHandle {
    fn drop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        self.ctx.request_stop();
        if let Err(e) = self.join_thread() {
            log::warn!("Trigger thread ended with error: {}", e);
        }
    }
}
