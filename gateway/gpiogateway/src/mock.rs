//! In-memory output lines for exercising pattern loops without hardware.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::chip::{GpioError, GpioResult};
use crate::traits::OutputLines;

/// One update applied to the mock lines.
#[derive(Debug, Clone)]
pub struct LineWrite {
    pub at: Instant,
    pub values: Vec<bool>,
}

/// Output lines that record every write. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MockLines {
    lines: usize,
    fail_after: Option<usize>,
    writes: Arc<Mutex<Vec<LineWrite>>>,
}

impl MockLines {
    pub fn new(lines: usize) -> Self {
        Self {
            lines,
            fail_after: None,
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reject every write after the first `writes` with EIO.
    pub fn failing_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }

    /// Snapshot of all successful writes so far.
    pub fn writes(&self) -> Vec<LineWrite> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl OutputLines for MockLines {
    fn requested_outputs(&self) -> usize {
        self.lines
    }

    fn set_outputs(&mut self, values: &[bool]) -> GpioResult<()> {
        if self.lines == 0 {
            return Ok(());
        }

        let mut writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limit) = self.fail_after {
            if writes.len() >= limit {
                return Err(GpioError::Write(nix::Error::EIO));
            }
        }

        let mut current = writes
            .last()
            .map(|w| w.values.clone())
            .unwrap_or_else(|| vec![false; self.lines]);
        for (slot, &value) in current.iter_mut().zip(values) {
            *slot = value;
        }

        writes.push(LineWrite {
            at: Instant::now(),
            values: current,
        });
        Ok(())
    }
}
