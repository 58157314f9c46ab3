//! Measurement counter interface trait
//!
//! This module defines the free-running hardware counter used by the
//! analyzer to attribute CPU time to tasks.

/// Free-running measurement counter
///
/// The counter only advances between `start` and `stop`. The analyzer
/// gates it around task dispatches, so its accumulated value is the total
/// time spent inside measured handlers.
///
/// # Safety Invariants
///
/// - Counter peripheral must be configured before use
/// - `read` after `stop` must observe a stable value (stop-before-read
///   where the hardware requires it)
/// - Readings wrap at the counter width; consumers use wrapping
///   subtraction
pub trait CounterInterface {
    /// Start the counter running
    fn start(&mut self);

    /// Stop the counter
    fn stop(&mut self);

    /// Read the current counter value
    fn read(&self) -> u32;

    /// Reset the counter value to zero
    ///
    /// Does not change whether the counter is running.
    fn reset(&mut self);
}
