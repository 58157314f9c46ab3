//! Task execution-time analyzer
//!
//! Opt-in profiling built on the scheduler's measurement hooks. The
//! analyzer gates a free-running hardware counter around the dispatch of
//! every measured task, accumulates the readings per task, and
//! periodically streams a report over the serial transport from its own
//! scheduled task.
//!
//! Reports are interval counters: every record is zeroed after it is
//! sent, so each report covers only the work done since the previous one.

use heapless::Vec;

use crate::platform::traits::{CounterInterface, UartInterface};
use crate::platform::Result as PlatformResult;

use super::scheduler::{
    MeasureFn, MeasurePhase, Scheduler, SchedulerError, TaskFn, TaskHandle, Tick,
};

/// Priority of the analyzer's report task; just above idle so reporting
/// never displaces real work
pub const ANALYZER_TASK_PRIORITY: u8 = 1;

/// Ticks between reports
#[cfg(debug_assertions)]
pub const ANALYZER_REPORT_INTERVAL: Tick = 50;

/// Ticks between reports
#[cfg(not(debug_assertions))]
pub const ANALYZER_REPORT_INTERVAL: Tick = 1000;

/// Maximum number of measured tasks
pub const MAX_MEASURES: usize = 16;

/// Identity of a measurement record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureId(usize);

impl MeasureId {
    /// Index of the record in the analyzer's list
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Accounting for one measured task
#[derive(Debug, Clone, Copy)]
pub struct TaskMeasure {
    /// Caller-chosen report tag, distinct from the task handle
    tag: u8,
    /// The measured task
    task: TaskHandle,
    /// Counter ticks accumulated since the last report
    accumulated: u32,
}

impl TaskMeasure {
    /// Report tag of this record
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Handle of the measured task
    pub fn task(&self) -> TaskHandle {
        self.task
    }

    /// Counter ticks accumulated since the last report
    pub fn accumulated(&self) -> u32 {
        self.accumulated
    }
}

/// Execution-time analyzer
///
/// Owns the measurement counter and the report transport. One instance
/// lives in the application environment next to the scheduler; the
/// report task and the measurement hooks reach it through app-supplied
/// projection functions (see [`Analyzer::enable`] and
/// [`Analyzer::measure_task`]).
pub struct Analyzer<C, U> {
    enabled: bool,
    /// Handle of the periodic report task while enabled
    task: Option<TaskHandle>,
    /// Measurement records in registration order
    records: Vec<TaskMeasure, MAX_MEASURES>,
    /// Counter reading taken at the Start phase of the dispatch in
    /// progress; dispatch is non-preemptive, so one slot suffices
    inflight: Option<u32>,
    counter: C,
    uart: U,
}

impl<C: CounterInterface, U: UartInterface> Analyzer<C, U> {
    /// Create a disabled analyzer owning its counter and transport
    pub fn new(counter: C, uart: U) -> Self {
        Self {
            enabled: false,
            task: None,
            records: Vec::new(),
            inflight: None,
            counter,
            uart,
        }
    }

    /// Enable periodic reporting
    ///
    /// Idempotent: enabling an enabled analyzer is a no-op success and
    /// creates no second task. Otherwise this schedules the report task
    /// and zeroes the measurement counter.
    ///
    /// `report` is the handler of the report task; the application
    /// supplies it as a projection onto [`Analyzer::report`]:
    ///
    /// ```ignore
    /// fn report_task(_ctl: &mut TaskControl<'_>, env: &mut App) {
    ///     if env.analyzer.report().is_err() {
    ///         crate::log_error!("analyzer report failed");
    ///     }
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Propagates the scheduler's allocation errors; nothing is left
    /// scheduled on failure.
    pub fn enable<E>(
        &mut self,
        sched: &mut Scheduler<E>,
        report: TaskFn<E>,
    ) -> Result<(), SchedulerError> {
        if self.enabled {
            return Ok(());
        }

        let handle =
            sched.create_task(ANALYZER_TASK_PRIORITY, ANALYZER_REPORT_INTERVAL, report, 0)?;
        if let Err(e) = sched.add_task(handle) {
            sched.kill_task(handle);
            return Err(e);
        }

        self.counter.stop();
        self.counter.reset();
        self.task = Some(handle);
        self.enabled = true;
        crate::log_info!("analyzer enabled, reporting every {} ticks", ANALYZER_REPORT_INTERVAL);
        Ok(())
    }

    /// Disable periodic reporting
    ///
    /// Removes the report task but deliberately leaves the measurement
    /// records and the per-task hooks installed: measured tasks stay
    /// wired, they just stop being reported. Re-enabling resumes
    /// reporting without re-registration.
    pub fn disable<E>(&mut self, sched: &mut Scheduler<E>) {
        self.enabled = false;
        if let Some(handle) = self.task.take() {
            sched.kill_task(handle);
        }
        crate::log_info!("analyzer disabled");
    }

    /// Register a task for measurement
    ///
    /// Appends a record to the analyzer's list (registration order is the
    /// report order) and installs the measurement hook pair on the task.
    /// `hook` is the application's projection onto
    /// [`Analyzer::on_measure`]:
    ///
    /// ```ignore
    /// fn measure_hook(env: &mut App, wrapper: usize, phase: MeasurePhase) {
    ///     env.analyzer.on_measure(wrapper, phase);
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// `AllocationExhausted` when the record list is full, `NotFound` for
    /// a dead handle. No record is kept on failure.
    pub fn measure_task<E>(
        &mut self,
        sched: &mut Scheduler<E>,
        handle: TaskHandle,
        tag: u8,
        hook: MeasureFn<E>,
    ) -> Result<MeasureId, SchedulerError> {
        if self.records.is_full() {
            return Err(SchedulerError::AllocationExhausted);
        }

        let wrapper = self.records.len();
        sched.set_measure_hook(handle, hook, wrapper)?;
        self.records
            .push(TaskMeasure {
                tag,
                task: handle,
                accumulated: 0,
            })
            .map_err(|_| SchedulerError::AllocationExhausted)?;

        crate::log_debug!("measuring task {} with tag {}", handle.raw(), tag);
        Ok(MeasureId(wrapper))
    }

    /// Measurement hook body
    ///
    /// `Start` records the counter reading and starts the counter;
    /// `Stop` stops it and adds the wrapped difference into the record.
    /// A `Stop` with no reading in flight means the hook was invoked
    /// outside the dispatch protocol: the counter is stopped and the
    /// value discarded, and a debug build flags the violation.
    pub fn on_measure(&mut self, wrapper: usize, phase: MeasurePhase) {
        match phase {
            MeasurePhase::Start => {
                debug_assert!(
                    self.inflight.is_none(),
                    "measurement started while another is in flight"
                );
                self.inflight = Some(self.counter.read());
                self.counter.start();
            }
            MeasurePhase::Stop => {
                self.counter.stop();
                let end = self.counter.read();
                match self.inflight.take() {
                    Some(start) => {
                        if let Some(rec) = self.records.get_mut(wrapper) {
                            rec.accumulated = rec.accumulated.wrapping_add(end.wrapping_sub(start));
                        }
                    }
                    None => {
                        debug_assert!(false, "measurement stopped with none in flight");
                    }
                }
            }
        }
    }

    /// Emit one report over the transport and zero the records
    ///
    /// Wire format, all integers little-endian:
    ///
    /// ```text
    /// [4 bytes] payload_length = 4 + 5 * record_count
    /// [4 bytes] counter ticks since the last report
    /// repeated record_count times:
    ///   [1 byte] tag
    ///   [4 bytes] accumulated ticks
    /// ```
    ///
    /// # Errors
    ///
    /// Propagates transport failures; records already written before the
    /// failure have been zeroed.
    pub fn report(&mut self) -> PlatformResult<()> {
        let elapsed = self.counter.read();
        self.counter.reset();

        let payload_length = 4 + 5 * self.records.len() as u32;
        self.uart.write(&payload_length.to_le_bytes())?;
        self.uart.write(&elapsed.to_le_bytes())?;

        for rec in self.records.iter_mut() {
            self.uart.write(&[rec.tag])?;
            self.uart.write(&rec.accumulated.to_le_bytes())?;
            rec.accumulated = 0;
        }

        self.uart.flush()
    }

    /// Whether periodic reporting is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Handle of the report task while enabled
    pub fn task_handle(&self) -> Option<TaskHandle> {
        self.task
    }

    /// Number of registered measurement records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Look up a measurement record
    pub fn record(&self, id: MeasureId) -> Option<&TaskMeasure> {
        self.records.get(id.index())
    }

    /// The measurement counter, e.g. for host tests simulating load
    pub fn counter_mut(&mut self) -> &mut C {
        &mut self.counter
    }

    /// The report transport, e.g. for host tests inspecting the wire
    pub fn transport_mut(&mut self) -> &mut U {
        &mut self.uart
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scheduler::{TaskControl, MAX_TASKS};
    use crate::platform::mock::{MockCounter, MockTimer, MockUart};
    use crate::platform::traits::timer::TimerInterface;

    struct App {
        timer: MockTimer,
        analyzer: Analyzer<MockCounter, MockUart>,
    }

    impl App {
        fn new() -> Self {
            Self {
                timer: MockTimer::new(),
                analyzer: Analyzer::new(MockCounter::new(), MockUart::new()),
            }
        }
    }

    fn clock(env: &App) -> Tick {
        env.timer.now()
    }

    fn measure_hook(env: &mut App, wrapper: usize, phase: MeasurePhase) {
        env.analyzer.on_measure(wrapper, phase);
    }

    fn report_task(_ctl: &mut TaskControl<'_>, env: &mut App) {
        env.analyzer.report().unwrap();
    }

    /// Burns `param` counter ticks per dispatch
    fn busy_handler(ctl: &mut TaskControl<'_>, env: &mut App) {
        env.analyzer.counter_mut().tick(ctl.param() as u32);
    }

    fn idle_like_handler(_ctl: &mut TaskControl<'_>, _env: &mut App) {}

    fn pump(sched: &mut Scheduler<App>, env: &mut App, ticks: u32) {
        for _ in 0..ticks {
            env.timer.advance(1);
            for _ in 0..2 * MAX_TASKS {
                sched.poll(env);
            }
        }
    }

    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn test_enable_is_idempotent() {
        let mut sched: Scheduler<App> = Scheduler::new(clock);
        let mut env = App::new();

        env.analyzer.enable(&mut sched, report_task).unwrap();
        assert!(env.analyzer.is_enabled());
        let count = sched.task_count();

        env.analyzer.enable(&mut sched, report_task).unwrap();
        assert_eq!(sched.task_count(), count, "no second report task");
    }

    #[test]
    fn test_disable_removes_task_keeps_records() {
        let mut sched: Scheduler<App> = Scheduler::new(clock);
        let mut env = App::new();

        let h = sched.create_task(5, 10, busy_handler, 20).unwrap();
        sched.add_task(h).unwrap();

        env.analyzer.enable(&mut sched, report_task).unwrap();
        env.analyzer
            .measure_task(&mut sched, h, 1, measure_hook)
            .unwrap();

        let report_handle = env.analyzer.task_handle().unwrap();
        env.analyzer.disable(&mut sched);

        assert!(!env.analyzer.is_enabled());
        assert_eq!(
            sched.get_task_state(report_handle),
            Err(SchedulerError::NotFound)
        );
        assert_eq!(env.analyzer.record_count(), 1, "records survive disable");
    }

    #[test]
    fn test_reenable_resumes_without_reregistration() {
        let mut sched: Scheduler<App> = Scheduler::new(clock);
        let mut env = App::new();

        let h = sched.create_task(5, 10, busy_handler, 20).unwrap();
        sched.add_task(h).unwrap();

        env.analyzer.enable(&mut sched, report_task).unwrap();
        let id = env
            .analyzer
            .measure_task(&mut sched, h, 9, measure_hook)
            .unwrap();

        env.analyzer.disable(&mut sched);

        // Hooks stay wired while disabled: dispatches keep accumulating
        pump(&mut sched, &mut env, 10);
        assert_eq!(env.analyzer.record(id).unwrap().accumulated(), 20);

        env.analyzer.enable(&mut sched, report_task).unwrap();

        // The next report interval emits the record without any
        // re-registration
        pump(&mut sched, &mut env, ANALYZER_REPORT_INTERVAL);
        let tx = env.analyzer.transport_mut().tx_bytes().to_vec();
        assert!(!tx.is_empty());
        assert_eq!(read_u32(&tx, 0), 4 + 5);
    }

    #[test]
    fn test_measure_task_not_found() {
        let mut sched: Scheduler<App> = Scheduler::new(clock);
        let mut env = App::new();

        let dead = TaskHandle(4242);
        assert_eq!(
            env.analyzer.measure_task(&mut sched, dead, 1, measure_hook),
            Err(SchedulerError::NotFound)
        );
        assert_eq!(env.analyzer.record_count(), 0);
    }

    #[test]
    fn test_measure_task_record_exhaustion() {
        let mut sched: Scheduler<App> = Scheduler::new(clock);
        let mut env = App::new();

        let h = sched.create_task(5, 10, idle_like_handler, 0).unwrap();
        sched.add_task(h).unwrap();

        for tag in 0..MAX_MEASURES as u8 {
            env.analyzer
                .measure_task(&mut sched, h, tag, measure_hook)
                .unwrap();
        }
        assert_eq!(
            env.analyzer.measure_task(&mut sched, h, 99, measure_hook),
            Err(SchedulerError::AllocationExhausted)
        );
    }

    #[test]
    fn test_hook_accumulates_per_dispatch() {
        let mut sched: Scheduler<App> = Scheduler::new(clock);
        let mut env = App::new();

        let h = sched.create_task(5, 10, busy_handler, 30).unwrap();
        sched.add_task(h).unwrap();
        let id = env
            .analyzer
            .measure_task(&mut sched, h, 2, measure_hook)
            .unwrap();

        // Three dispatches at t = 10, 20, 30
        pump(&mut sched, &mut env, 30);

        assert_eq!(env.analyzer.record(id).unwrap().accumulated(), 3 * 30);
        assert!(!env.analyzer.counter_mut().is_running(), "counter gated off");
    }

    #[test]
    fn test_report_wire_format_and_reset() {
        let mut env = App::new();
        let mut sched: Scheduler<App> = Scheduler::new(clock);

        let a = sched.create_task(5, 10, busy_handler, 0).unwrap();
        let b = sched.create_task(5, 10, busy_handler, 0).unwrap();
        let id_a = env
            .analyzer
            .measure_task(&mut sched, a, 3, measure_hook)
            .unwrap();
        let id_b = env
            .analyzer
            .measure_task(&mut sched, b, 7, measure_hook)
            .unwrap();

        // Synthesize measurements through the hook protocol
        env.analyzer.counter_mut().reset();
        env.analyzer.on_measure(id_a.index(), MeasurePhase::Start);
        env.analyzer.counter_mut().tick(100);
        env.analyzer.on_measure(id_a.index(), MeasurePhase::Stop);
        env.analyzer.on_measure(id_b.index(), MeasurePhase::Start);
        env.analyzer.counter_mut().tick(250);
        env.analyzer.on_measure(id_b.index(), MeasurePhase::Stop);

        env.analyzer.report().unwrap();

        let tx = env.analyzer.transport_mut().tx_bytes().to_vec();
        assert_eq!(tx.len(), 4 + 4 + 2 * 5);
        assert_eq!(read_u32(&tx, 0), 4 + 5 * 2, "payload length header");
        assert_eq!(read_u32(&tx, 4), 350, "total measured ticks");
        assert_eq!(tx[8], 3, "first tag");
        assert_eq!(read_u32(&tx, 9), 100);
        assert_eq!(tx[13], 7, "second tag");
        assert_eq!(read_u32(&tx, 14), 250);
        assert_eq!(env.analyzer.transport_mut().flush_count(), 1);

        // Interval semantics: everything reads zero after the report
        assert_eq!(env.analyzer.record(id_a).unwrap().accumulated(), 0);
        assert_eq!(env.analyzer.record(id_b).unwrap().accumulated(), 0);

        env.analyzer.transport_mut().clear_tx();
        env.analyzer.report().unwrap();
        let tx = env.analyzer.transport_mut().tx_bytes().to_vec();
        assert_eq!(read_u32(&tx, 4), 0, "counter was reset by the report");
        assert_eq!(read_u32(&tx, 9), 0);
        assert_eq!(read_u32(&tx, 14), 0);
    }

    #[test]
    fn test_report_with_no_records() {
        let mut env = App::new();
        env.analyzer.report().unwrap();

        let tx = env.analyzer.transport_mut().tx_bytes().to_vec();
        assert_eq!(tx.len(), 8);
        assert_eq!(read_u32(&tx, 0), 4);
    }

    #[test]
    fn test_counter_rollover_measurement() {
        let mut env = App::new();
        let mut sched: Scheduler<App> = Scheduler::new(clock);

        let h = sched.create_task(5, 10, busy_handler, 0).unwrap();
        let id = env
            .analyzer
            .measure_task(&mut sched, h, 1, measure_hook)
            .unwrap();

        // Counter sits just below the rollover when the dispatch starts
        env.analyzer.counter_mut().start();
        env.analyzer.counter_mut().tick(u32::MAX - 9);
        env.analyzer.counter_mut().stop();

        env.analyzer.on_measure(id.index(), MeasurePhase::Start);
        env.analyzer.counter_mut().tick(20);
        env.analyzer.on_measure(id.index(), MeasurePhase::Stop);

        // Wrapping subtraction still yields the elapsed 20
        assert_eq!(env.analyzer.record(id).unwrap().accumulated(), 20);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "none in flight")]
    fn test_stop_without_start_is_flagged() {
        let mut env = App::new();
        env.analyzer.on_measure(0, MeasurePhase::Stop);
    }
}
