//! Seams between the pattern loop and the hardware it drives.

use crate::chip::GpioResult;

/// A fixed set of output lines, written together in one update.
pub trait OutputLines {
    /// Number of lines claimed as outputs, 0 when none were requested.
    fn requested_outputs(&self) -> usize;

    /// Write the first `min(values.len(), requested_outputs())` lines.
    ///
    /// Must be a no-op returning `Ok` when no outputs were requested.
    fn set_outputs(&mut self, values: &[bool]) -> GpioResult<()>;
}

/// A controller that identifies itself by label during discovery.
pub trait LabeledChip {
    fn label(&self) -> &str;
}
