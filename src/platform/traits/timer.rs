//! System timer interface trait
//!
//! This module defines the monotonic tick source the scheduler runs on.

/// Monotonic tick source
///
/// Platform implementations must provide this interface for scheduling
/// decisions.
///
/// # Safety Invariants
///
/// - Timer peripheral must be initialized before use
/// - Monotonic tick count (never goes backwards, may wrap)
pub trait TimerInterface {
    /// Get the current tick count
    ///
    /// Returns a monotonically increasing tick count since platform
    /// initialization. The count wraps at `u32::MAX`; consumers compare
    /// timestamps with wrapping subtraction.
    fn now(&self) -> u32;
}
