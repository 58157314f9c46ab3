//! Cooperative task scheduler
//!
//! Priority-ordered, non-preemptive scheduling: a task runs by having its
//! handler called to completion from the run loop, once per elapsed
//! period. Tasks live in a fixed arena addressed by stable handles; the
//! scan order is a separate index list sorted by descending priority.
//!
//! A permanent idle task (priority 0, period 0) is created with the
//! scheduler and can never be removed, so a full traversal of the scan
//! list always finds an eligible task and the run loop cannot stall.
//!
//! After every dispatch the scan restarts from the head of the list, so a
//! continuously eligible high-priority task is served before lower
//! priorities are revisited. Under sustained high-priority load this
//! starves lower-priority tasks indefinitely; that is accepted behavior,
//! not a defect.

pub mod task;
pub mod types;

pub use task::{ClockFn, MeasureFn, MeasurePhase, TaskControl, TaskFn};
pub use types::{SchedulerError, TaskHandle, TaskInfo, TaskState, Tick, MAX_TASKS};

use heapless::Vec;

use task::{Measurement, Task};
use types::IDLE_PRIORITY;

/// Handler of the permanent idle task
fn idle_handler<E>(_ctl: &mut TaskControl<'_>, _env: &mut E) {}

/// Cooperative scheduler over an application environment `E`
///
/// The environment is whatever the application wants its handlers to see:
/// timers, driver state, the analyzer. The scheduler only threads it
/// through; the one thing it reads itself is the tick count, via the
/// clock projection supplied at construction.
pub struct Scheduler<E> {
    /// Task arena; a slot is `None` until created and after removal
    slots: [Option<Task<E>>; MAX_TASKS],
    /// Slot indices sorted by descending priority, ties in arrival order
    order: Vec<u8, MAX_TASKS>,
    /// Scan position within `order`
    cursor: usize,
    /// Next handle value; monotonically assigned, never reused
    next_handle: u32,
    clock: ClockFn<E>,
    /// Removal requests queued from inside a dispatch
    deferred_kills: Vec<TaskHandle, MAX_TASKS>,
}

impl<E> Scheduler<E> {
    /// Create a scheduler with its permanent idle task already started
    ///
    /// # Arguments
    ///
    /// * `clock` - Projection reading the monotonic tick count out of the
    ///   application environment
    pub fn new(clock: ClockFn<E>) -> Self {
        let mut slots: [Option<Task<E>>; MAX_TASKS] = core::array::from_fn(|_| None);

        let mut idle = Task::new(TaskHandle::IDLE, IDLE_PRIORITY, 0, idle_handler::<E>, 0);
        idle.state = TaskState::Started;
        slots[0] = Some(idle);

        let mut order = Vec::new();
        // The first entry into an empty list cannot fail
        let _ = order.push(0);

        Self {
            slots,
            order,
            cursor: 0,
            next_handle: 1,
            clock,
            deferred_kills: Vec::new(),
        }
    }

    /// Create a task in state `Stopped`
    ///
    /// The task does not take part in scheduling until [`Scheduler::add_task`]
    /// inserts it into the scan list.
    ///
    /// # Errors
    ///
    /// Returns `AllocationExhausted` when the arena cannot hold another
    /// task; no partially initialized task is left behind.
    pub fn create_task(
        &mut self,
        priority: u8,
        period: Tick,
        handler: TaskFn<E>,
        param: usize,
    ) -> Result<TaskHandle, SchedulerError> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(SchedulerError::AllocationExhausted)?;

        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        self.slots[slot] = Some(Task::new(handle, priority, period, handler, param));
        Ok(handle)
    }

    /// Insert a created task into the scan list and start it
    ///
    /// The task is placed after all tasks of equal or higher priority and
    /// before the first strictly lower one, so equal priorities keep
    /// their arrival order. Adding a task that is already scheduled only
    /// restarts it.
    ///
    /// # Errors
    ///
    /// `NotFound` for a dead handle, `AllocationExhausted` if the scan
    /// list cannot take another entry.
    pub fn add_task(&mut self, handle: TaskHandle) -> Result<(), SchedulerError> {
        let slot = self.slot_of(handle).ok_or(SchedulerError::NotFound)?;
        let priority = self.priority_of(slot);

        if !self.order.iter().any(|&i| i as usize == slot) {
            let pos = self
                .order
                .iter()
                .position(|&i| self.priority_of(i as usize) < priority)
                .unwrap_or(self.order.len());
            self.order
                .insert(pos, slot as u8)
                .map_err(|_| SchedulerError::AllocationExhausted)?;
            crate::log_debug!("task {} scheduled at priority {}", handle.raw(), priority);
        }

        self.start_task(handle)
    }

    /// Remove a task and its scan-list entry
    ///
    /// The scan cursor is reset to the head of the list so it can never
    /// reference the freed slot. To remove a task from inside its own
    /// dispatch use [`TaskControl::kill`], which defers until the
    /// dispatch completes.
    ///
    /// # Errors
    ///
    /// `NotFound` if no live task matches; `IdleTask` for the permanent
    /// idle task.
    pub fn remove_task(&mut self, handle: TaskHandle) -> Result<(), SchedulerError> {
        if handle == TaskHandle::IDLE {
            return Err(SchedulerError::IdleTask);
        }
        let slot = self.slot_of(handle).ok_or(SchedulerError::NotFound)?;

        self.order.retain(|&i| i as usize != slot);
        self.slots[slot] = None;
        self.cursor = 0;
        crate::log_debug!("task {} removed", handle.raw());
        Ok(())
    }

    /// Remove the task matching `handle`, if any
    ///
    /// A handle that matches nothing is a no-op, not an error; the lookup
    /// is bounded by the arena, so this terminates whether or not a match
    /// exists. The idle task is skipped.
    pub fn kill_task(&mut self, handle: TaskHandle) {
        match self.remove_task(handle) {
            Ok(()) => {}
            Err(SchedulerError::NotFound) => {}
            Err(SchedulerError::IdleTask) => {
                crate::log_warn!("refusing to kill the idle task");
            }
            Err(_) => {}
        }
    }

    /// Transition a task to `Started`
    pub fn start_task(&mut self, handle: TaskHandle) -> Result<(), SchedulerError> {
        self.with_task(handle, |t| t.state = TaskState::Started)
    }

    /// Transition a task to `Stopped`
    pub fn stop_task(&mut self, handle: TaskHandle) -> Result<(), SchedulerError> {
        self.with_task(handle, |t| t.state = TaskState::Stopped)
    }

    /// Suspend a task: dispatch it once after `duration` ticks have
    /// elapsed, then revert to periodic scheduling
    pub fn suspend_task(&mut self, handle: TaskHandle, duration: Tick) -> Result<(), SchedulerError> {
        self.with_task(handle, |t| {
            t.state = TaskState::Suspended;
            t.suspend = duration;
        })
    }

    /// Change a task's scheduling period
    pub fn set_task_period(&mut self, handle: TaskHandle, period: Tick) -> Result<(), SchedulerError> {
        self.with_task(handle, |t| t.period = period)
    }

    /// Get a task's scheduling period
    pub fn get_task_period(&self, handle: TaskHandle) -> Result<Tick, SchedulerError> {
        let slot = self.slot_of(handle).ok_or(SchedulerError::NotFound)?;
        Ok(self.slots[slot].as_ref().map(|t| t.period).unwrap_or(0))
    }

    /// Get a task's current state
    pub fn get_task_state(&self, handle: TaskHandle) -> Result<TaskState, SchedulerError> {
        let slot = self.slot_of(handle).ok_or(SchedulerError::NotFound)?;
        Ok(self.slots[slot]
            .as_ref()
            .map(|t| t.state)
            .unwrap_or(TaskState::Stopped))
    }

    /// Install the measurement hook pair on a task
    ///
    /// The dispatch protocol invokes `hook` with [`MeasurePhase::Start`]
    /// immediately before the handler and [`MeasurePhase::Stop`]
    /// immediately after, passing `wrapper` through uninterpreted. Used
    /// by the analyzer.
    pub fn set_measure_hook(
        &mut self,
        handle: TaskHandle,
        hook: MeasureFn<E>,
        wrapper: usize,
    ) -> Result<(), SchedulerError> {
        self.with_task(handle, |t| t.measure = Some(Measurement { hook, wrapper }))
    }

    /// Number of live tasks, the idle task included
    pub fn task_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Snapshot the scheduled tasks in scan order
    pub fn tasks(&self) -> impl Iterator<Item = TaskInfo> + '_ {
        self.order.iter().filter_map(move |&i| {
            self.slots[i as usize].as_ref().map(|t| TaskInfo {
                handle: t.handle,
                priority: t.priority,
                state: t.state,
                period: t.period,
                last_start: t.last_start,
            })
        })
    }

    /// Perform one step of the scan
    ///
    /// Inspects the task at the cursor: dispatches it if eligible (and
    /// restarts the scan from the head), otherwise advances the cursor.
    /// [`Scheduler::run`] is this in a loop; tests drive `poll` directly.
    pub fn poll(&mut self, env: &mut E) {
        let now = (self.clock)(env);

        if self.cursor >= self.order.len() {
            self.cursor = 0;
        }
        let slot = self.order[self.cursor] as usize;

        let (state, eligible) = {
            let task = match self.slots[slot].as_ref() {
                Some(t) => t,
                // A scan entry without a live task means the bookkeeping
                // is corrupt; there is no safe continuation.
                None => unreachable!("scan entry without a live task"),
            };
            let gate = match task.state {
                TaskState::Started => task.period,
                TaskState::Suspended => task.suspend,
                _ => 0,
            };
            (task.state, now.wrapping_sub(task.last_start) >= gate)
        };

        match state {
            TaskState::Started | TaskState::Suspended if eligible => {
                self.dispatch(slot, now, env);
                // Begin a new scan from the head
                self.cursor = 0;
            }
            TaskState::Started | TaskState::Suspended => {
                self.cursor += 1;
            }
            TaskState::Stopped | TaskState::Waiting => {
                // Waiting is reserved for event-driven blocking and is
                // deliberately inert for now
                self.cursor += 1;
            }
            TaskState::Running => {
                // Only a reentrant or concurrent dispatch can put a
                // Running task in front of the scan
                debug_assert!(false, "scan observed a task in Running state");
                self.cursor += 1;
            }
        }
    }

    /// Run the dispatch loop forever
    ///
    /// The permanent idle task guarantees forward progress even when no
    /// other task is eligible.
    pub fn run(&mut self, env: &mut E) -> ! {
        loop {
            self.poll(env);
        }
    }

    /// Dispatch the task in `slot`: hook, handler, hook, state restore,
    /// then any removals the handler requested
    fn dispatch(&mut self, slot: usize, now: Tick, env: &mut E) {
        let slots = &mut self.slots;
        let kills = &mut self.deferred_kills;

        let task = match slots[slot].as_mut() {
            Some(t) => t,
            None => unreachable!("dispatch of an empty slot"),
        };

        let measure = task.measure;
        if let Some(m) = measure {
            (m.hook)(env, m.wrapper, MeasurePhase::Start);
        }

        task.last_start = now;
        task.state = TaskState::Running;

        let handler = task.handler;
        {
            let mut ctl = TaskControl {
                handle: task.handle,
                priority: task.priority,
                param: task.param,
                state: &mut task.state,
                period: &mut task.period,
                suspend: &mut task.suspend,
                kills,
            };
            handler(&mut ctl, env);
        }

        if let Some(m) = measure {
            (m.hook)(env, m.wrapper, MeasurePhase::Stop);
        }

        // If the handler did not set a state itself, return to Started
        if task.state == TaskState::Running {
            task.state = TaskState::Started;
        }

        // Apply removals requested during the dispatch
        let pending = core::mem::take(&mut self.deferred_kills);
        for handle in pending {
            self.kill_task(handle);
        }
    }

    fn slot_of(&self, handle: TaskHandle) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|t| t.handle == handle))
    }

    fn priority_of(&self, slot: usize) -> u8 {
        self.slots[slot].as_ref().map(|t| t.priority).unwrap_or(0)
    }

    fn with_task(
        &mut self,
        handle: TaskHandle,
        f: impl FnOnce(&mut Task<E>),
    ) -> Result<(), SchedulerError> {
        let slot = self.slot_of(handle).ok_or(SchedulerError::NotFound)?;
        match self.slots[slot].as_mut() {
            Some(task) => {
                f(task);
                Ok(())
            }
            None => Err(SchedulerError::NotFound),
        }
    }
}
