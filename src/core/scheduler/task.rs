//! Task records and the in-dispatch control surface
//!
//! A [`Task`] is one arena entry: identity, scheduling fields, handler and
//! optional measurement hook. Handlers never see the arena; during a
//! dispatch they receive a [`TaskControl`] view of their own task plus the
//! application environment `E` that the run loop threads through.

use heapless::Vec;

use super::types::{SchedulerError, TaskHandle, TaskState, Tick, MAX_TASKS};

/// Task handler, invoked synchronously on each dispatch
pub type TaskFn<E> = fn(ctl: &mut TaskControl<'_>, env: &mut E);

/// Clock projection: reads the monotonic tick count out of the
/// application environment
pub type ClockFn<E> = fn(env: &E) -> Tick;

/// Measurement hook, invoked immediately before and after the handler
///
/// `wrapper` is the opaque context the hook owner supplied when the hook
/// was installed; the scheduler passes it through uninterpreted.
pub type MeasureFn<E> = fn(env: &mut E, wrapper: usize, phase: MeasurePhase);

/// Which side of the handler a measurement hook call brackets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurePhase {
    /// Immediately before the handler runs
    Start,
    /// Immediately after the handler returns
    Stop,
}

/// Installed measurement hook and its opaque context
pub struct Measurement<E> {
    pub(crate) hook: MeasureFn<E>,
    pub(crate) wrapper: usize,
}

// Manual impls: a fn pointer and a usize are always copyable, no `E: Copy`
// bound wanted.
impl<E> Clone for Measurement<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Measurement<E> {}

/// One task in the scheduler's arena
pub struct Task<E> {
    pub(crate) handle: TaskHandle,
    pub(crate) state: TaskState,
    /// Tick timestamp of the most recent dispatch
    pub(crate) last_start: Tick,
    /// Minimum ticks between dispatches while `Started`
    pub(crate) period: Tick,
    /// One-shot tick interval used while `Suspended`
    pub(crate) suspend: Tick,
    /// Scheduling priority (higher = served first, 0 reserved for idle)
    pub(crate) priority: u8,
    pub(crate) handler: TaskFn<E>,
    /// Opaque user token, not interpreted by the scheduler
    pub(crate) param: usize,
    pub(crate) measure: Option<Measurement<E>>,
}

impl<E> Task<E> {
    pub(crate) fn new(
        handle: TaskHandle,
        priority: u8,
        period: Tick,
        handler: TaskFn<E>,
        param: usize,
    ) -> Self {
        Self {
            handle,
            state: TaskState::Stopped,
            last_start: 0,
            period,
            suspend: 0,
            priority,
            handler,
            param,
            measure: None,
        }
    }
}

/// A handler's view of its own task during a dispatch
///
/// Mutating scheduling state through this view is the only sanctioned way
/// a task changes its own scheduling from inside its handler; the change
/// takes effect when the handler returns.
pub struct TaskControl<'a> {
    pub(crate) handle: TaskHandle,
    pub(crate) priority: u8,
    pub(crate) param: usize,
    pub(crate) state: &'a mut TaskState,
    pub(crate) period: &'a mut Tick,
    pub(crate) suspend: &'a mut Tick,
    pub(crate) kills: &'a mut Vec<TaskHandle, MAX_TASKS>,
}

impl TaskControl<'_> {
    /// Handle of the task being dispatched
    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    /// Priority of the task being dispatched
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// The opaque user token supplied at task creation
    pub fn param(&self) -> usize {
        self.param
    }

    /// Current state (normally `Running` while inside the handler)
    pub fn state(&self) -> TaskState {
        *self.state
    }

    /// Keep running periodically after this dispatch
    pub fn start(&mut self) {
        *self.state = TaskState::Started;
    }

    /// Stop after this dispatch; explicit reactivation required
    pub fn stop(&mut self) {
        *self.state = TaskState::Stopped;
    }

    /// Run once more after `duration` ticks, then revert to periodic
    pub fn suspend(&mut self, duration: Tick) {
        *self.state = TaskState::Suspended;
        *self.suspend = duration;
    }

    /// Scheduling period of this task
    pub fn period(&self) -> Tick {
        *self.period
    }

    /// Change the scheduling period
    pub fn set_period(&mut self, period: Tick) {
        *self.period = period;
    }

    /// Request removal of a task, including this one
    ///
    /// Removal from inside a dispatch is deferred: the request is queued
    /// and applied by the run loop after the current handler returns, so
    /// the dispatcher never frees the slot it is executing.
    ///
    /// # Errors
    ///
    /// Returns `AllocationExhausted` if the deferred-removal queue is
    /// full.
    pub fn kill(&mut self, handle: TaskHandle) -> Result<(), SchedulerError> {
        self.kills
            .push(handle)
            .map_err(|_| SchedulerError::AllocationExhausted)
    }
}
