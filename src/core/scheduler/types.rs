//! Core types for the task scheduler
//!
//! This module defines the fundamental types used by the scheduler:
//! task identity, task state, error values and monitoring snapshots.

use core::fmt;

/// Tick of the monotonic clock source; all timing comparisons use
/// wrapping subtraction on this type
pub type Tick = u32;

/// Maximum number of tasks the arena can hold
///
/// This limit is set conservatively to avoid excessive static memory
/// usage on small targets.
pub const MAX_TASKS: usize = 16;

/// Priority of the permanent idle task; reserved, everything else should
/// schedule above it
pub const IDLE_PRIORITY: u8 = 0;

/// Stable task identity
///
/// Handles are assigned monotonically at creation and never reused, so a
/// stale handle can never address a recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskHandle(pub(crate) u32);

impl TaskHandle {
    /// Handle of the permanent idle task
    pub const IDLE: TaskHandle = TaskHandle(0);

    /// Raw handle value, for logging and report tagging
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Task scheduling state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Never dispatched until explicitly started again
    Stopped,
    /// Dispatched once per elapsed period
    Started,
    /// Transient marker held only during an active dispatch
    Running,
    /// Dispatched once after the suspend duration elapses, then reverts
    /// to `Started`
    Suspended,
    /// Reserved for event-driven blocking; currently scanned and skipped
    Waiting,
}

/// Scheduler operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// The task arena, order list or record list cannot hold another entry
    AllocationExhausted,
    /// No live task matches the given handle
    NotFound,
    /// The idle task cannot be removed
    IdleTask,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::AllocationExhausted => write!(f, "allocation exhausted"),
            SchedulerError::NotFound => write!(f, "no task with that handle"),
            SchedulerError::IdleTask => write!(f, "the idle task cannot be removed"),
        }
    }
}

/// Snapshot of one task's scheduling fields
///
/// Produced by [`super::Scheduler::tasks`] for monitoring and tests; the
/// scheduler keeps exclusive ownership of the tasks themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    /// Stable identity
    pub handle: TaskHandle,
    /// Scheduling priority (higher = served first)
    pub priority: u8,
    /// Current state
    pub state: TaskState,
    /// Minimum ticks between dispatches while `Started`
    pub period: Tick,
    /// Tick of the most recent dispatch
    pub last_start: Tick,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_handle_is_zero() {
        assert_eq!(TaskHandle::IDLE.raw(), 0);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", SchedulerError::AllocationExhausted),
            "allocation exhausted"
        );
        assert_eq!(format!("{}", SchedulerError::NotFound), "no task with that handle");
    }
}
