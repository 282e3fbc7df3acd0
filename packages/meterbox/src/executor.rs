use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::num::NonZero;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use scopeguard::defer;
use tracing::warn;

use crate::{
    Clock, Counter, ERR_POISONED_LOCK, Error, Histogram, Meter, MetricId, MetricRegistry, Result,
    Timer,
};

/// A unit of work submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A repeating unit of work submitted to a scheduled executor.
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

/// Accepts tasks for eventual execution.
///
/// Tasks submitted after [`shutdown()`][Self::shutdown] are dropped with a warning;
/// tasks already queued at shutdown still run.
pub trait Executor: Send + Sync {
    /// Submits one task.
    fn execute(&self, task: Task);

    /// Submits a batch of tasks.
    fn execute_all(&self, tasks: Vec<Task>) {
        for task in tasks {
            self.execute(task);
        }
    }

    /// Stops accepting new tasks. Already queued tasks still run.
    fn shutdown(&self);

    /// Whether [`shutdown()`][Self::shutdown] has been called.
    fn is_shutdown(&self) -> bool;

    /// Blocks until all workers have exited or the timeout elapses. Returns whether
    /// termination completed within the timeout.
    fn await_termination(&self, timeout: Duration) -> bool;
}

/// Accepts delayed and repeating tasks for eventual execution.
pub trait ScheduledExecutor: Send + Sync {
    /// Runs `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task);

    /// Runs `task` repeatedly, aiming to start successive runs `period` apart,
    /// starting after `initial_delay`.
    fn schedule_at_fixed_rate(&self, initial_delay: Duration, period: Duration, task: RepeatingTask);

    /// Runs `task` repeatedly, waiting `delay` between the end of one run and the
    /// start of the next, starting after `initial_delay`.
    fn schedule_with_fixed_delay(
        &self,
        initial_delay: Duration,
        delay: Duration,
        task: RepeatingTask,
    );
}

/// Runs every task inline on the submitting thread.
#[derive(Debug, Default)]
pub struct DirectExecutor {
    shutdown: AtomicBool,
}

impl DirectExecutor {
    /// Creates a direct executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for DirectExecutor {
    fn execute(&self, task: Task) {
        if self.is_shutdown() {
            warn!("task submitted after shutdown was dropped");
            return;
        }

        task();
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn await_termination(&self, _timeout: Duration) -> bool {
        // Nothing runs asynchronously, so shutdown and termination coincide.
        self.is_shutdown()
    }
}

struct PoolState {
    queue: VecDeque<Task>,
    shutdown: bool,
    live_workers: usize,
}

struct PoolShared {
    state: Mutex<PoolState>,
    work_available: Condvar,
    terminated: Condvar,
}

/// A fixed-size pool of worker threads draining a shared queue.
///
/// A panicking task is caught and logged; the worker survives and moves on to the
/// next task.
pub struct ThreadExecutor {
    shared: Arc<PoolShared>,
}

impl ThreadExecutor {
    /// Creates a pool with the given number of worker threads.
    #[must_use]
    pub fn new(workers: NonZero<usize>) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                shutdown: false,
                live_workers: workers.get(),
            }),
            work_available: Condvar::new(),
            terminated: Condvar::new(),
        });

        for _ in 0..workers.get() {
            let shared = Arc::clone(&shared);
            thread::spawn(move || Self::worker(&shared));
        }

        Self { shared }
    }

    fn worker(shared: &PoolShared) {
        loop {
            let task = {
                let mut state = shared.state.lock().expect(ERR_POISONED_LOCK);

                loop {
                    if let Some(task) = state.queue.pop_front() {
                        break Some(task);
                    }

                    if state.shutdown {
                        break None;
                    }

                    state = shared
                        .work_available
                        .wait(state)
                        .expect(ERR_POISONED_LOCK);
                }
            };

            let Some(task) = task else {
                break;
            };

            if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
                warn!(panic = panic_message(panic.as_ref()), "executor task panicked");
            }
        }

        let mut state = shared.state.lock().expect(ERR_POISONED_LOCK);
        state.live_workers -= 1;
        if state.live_workers == 0 {
            shared.terminated.notify_all();
        }
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) {
        let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);

        if state.shutdown {
            warn!("task submitted after shutdown was dropped");
            return;
        }

        state.queue.push_back(task);
        self.shared.work_available.notify_one();
    }

    fn execute_all(&self, tasks: Vec<Task>) {
        let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);

        if state.shutdown {
            warn!("tasks submitted after shutdown were dropped");
            return;
        }

        state.queue.extend(tasks);
        self.shared.work_available.notify_all();
    }

    fn shutdown(&self) {
        let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);
        state.shutdown = true;
        self.shared.work_available.notify_all();
    }

    fn is_shutdown(&self) -> bool {
        self.shared.state.lock().expect(ERR_POISONED_LOCK).shutdown
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        // A `None` deadline means the timeout is too large to represent; wait unbounded.
        let deadline = Instant::now().checked_add(timeout);

        let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);

        while state.live_workers > 0 {
            match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }

                    state = self
                        .shared
                        .terminated
                        .wait_timeout(state, remaining)
                        .expect(ERR_POISONED_LOCK)
                        .0;
                }
                None => {
                    state = self
                        .shared
                        .terminated
                        .wait(state)
                        .expect(ERR_POISONED_LOCK);
                }
            }
        }

        true
    }
}

impl Drop for ThreadExecutor {
    fn drop(&mut self) {
        // Workers hold a clone of the shared state and would otherwise block forever.
        self.shutdown();
    }
}

impl fmt::Debug for ThreadExecutor {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock().expect(ERR_POISONED_LOCK);

        f.debug_struct("ThreadExecutor")
            .field("queued", &state.queue.len())
            .field("shutdown", &state.shutdown)
            .field("live_workers", &state.live_workers)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
struct ExecutorMetrics {
    submitted: Arc<Meter>,
    running: Arc<Counter>,
    completed: Arc<Meter>,
    duration: Arc<Timer>,
    scheduled_once: Arc<Meter>,
    scheduled_repetitively: Arc<Meter>,
    scheduled_overrun: Arc<Meter>,
    scheduled_percent_of_period: Arc<Histogram>,
}

impl ExecutorMetrics {
    fn new(registry: &MetricRegistry, name: &str) -> Result<Self> {
        let id = |metric: &str| MetricId::new(format!("executor.{metric}")).with_tag("name", name);

        Ok(Self {
            submitted: registry.meter(id("submitted"))?,
            running: registry.counter(id("running"))?,
            completed: registry.meter(id("completed"))?,
            duration: registry.timer(id("duration"))?,
            scheduled_once: registry.meter(id("scheduled.once"))?,
            scheduled_repetitively: registry.meter(id("scheduled.repetitively"))?,
            scheduled_overrun: registry.meter(id("scheduled.overrun"))?,
            scheduled_percent_of_period: registry.histogram(id("scheduled.percent-of-period"))?,
        })
    }
}

/// Wraps an executor so that every submitted task is accounted for in a registry.
///
/// All instrumented executors share one family of `executor.*` metric names; instances
/// are told apart by the `name` tag, so several executors can report into one registry.
///
/// Per task, the wrapper marks submission before delegating, counts the task as running
/// while it executes and records its wall-clock duration when it finishes, whether it
/// returns or panics. Repeating tasks additionally report how much of their period each
/// run consumed and how often a run overran the period.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use meterbox::{
///     DirectExecutor, Executor, InstrumentedExecutor, MetricId, MetricRegistry, SystemClock,
/// };
///
/// let registry = Arc::new(MetricRegistry::new());
///
/// let executor = InstrumentedExecutor::new(
///     DirectExecutor::new(),
///     "replication",
///     &registry,
///     Arc::new(SystemClock::new()),
/// )?;
///
/// executor.execute(Box::new(|| {}));
///
/// let submitted = registry
///     .get(&MetricId::new("executor.submitted").with_tag("name", "replication"))
///     .unwrap();
/// assert_eq!(submitted.as_meter().unwrap().count(), 1);
/// # Ok::<(), meterbox::Error>(())
/// ```
pub struct InstrumentedExecutor<E> {
    delegate: E,
    name: Box<str>,
    metrics: ExecutorMetrics,
    clock: Arc<dyn Clock>,
}

impl<E> InstrumentedExecutor<E> {
    /// Wraps `delegate`, resolving the executor metrics in `registry` under the given
    /// instance name.
    ///
    /// # Errors
    ///
    /// [`Error::BlankName`] when `name` is empty or whitespace. [`Error::TypeMismatch`]
    /// when one of the `executor.*` identities is taken by a metric of the wrong kind.
    pub fn new(
        delegate: E,
        name: &str,
        registry: &MetricRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::BlankName {
                what: "executor name",
            });
        }

        Ok(Self {
            delegate,
            name: name.into(),
            metrics: ExecutorMetrics::new(registry, name)?,
            clock,
        })
    }

    /// The wrapped executor.
    pub fn delegate(&self) -> &E {
        &self.delegate
    }

    /// The instance name used as the `name` tag on all metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn wrap(&self, task: Task) -> Task {
        let metrics = self.metrics.clone();
        let clock = Arc::clone(&self.clock);

        Box::new(move || {
            metrics.running.inc();
            let start = clock.now();

            // Bookkeeping must happen even when the task panics.
            defer! {
                metrics.duration.record(clock.now().saturating_sub(start));
                metrics.running.dec();
                metrics.completed.mark();
            }

            task();
        })
    }

    /// Wraps a repeating task. When `period` is given, each run also reports its
    /// consumption of the period and whether it overran it.
    fn wrap_repeating(&self, mut task: RepeatingTask, period: Option<Duration>) -> RepeatingTask {
        let metrics = self.metrics.clone();
        let clock = Arc::clone(&self.clock);

        Box::new(move || {
            metrics.running.inc();
            let start = clock.now();

            defer! {
                let elapsed = clock.now().saturating_sub(start);

                metrics.duration.record(elapsed);
                metrics.running.dec();
                metrics.completed.mark();

                if let Some(period) = period {
                    if elapsed > period {
                        metrics.scheduled_overrun.mark();
                    }

                    metrics.scheduled_percent_of_period.record(percent_of(elapsed, period));
                }
            }

            task();
        })
    }
}

impl<E: Executor> Executor for InstrumentedExecutor<E> {
    fn execute(&self, task: Task) {
        // Marked before delegation so rejected or dropped tasks still count as submitted.
        self.metrics.submitted.mark();
        self.delegate.execute(self.wrap(task));
    }

    fn execute_all(&self, tasks: Vec<Task>) {
        // The whole batch is marked before delegation, same as a single submission.
        let count = u64::try_from(tasks.len()).expect("batch size fits in u64");
        self.metrics.submitted.mark_n(count);

        let wrapped = tasks.into_iter().map(|task| self.wrap(task)).collect();
        self.delegate.execute_all(wrapped);
    }

    fn shutdown(&self) {
        self.delegate.shutdown();
    }

    fn is_shutdown(&self) -> bool {
        self.delegate.is_shutdown()
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        self.delegate.await_termination(timeout)
    }
}

impl<E: ScheduledExecutor> ScheduledExecutor for InstrumentedExecutor<E> {
    fn schedule(&self, delay: Duration, task: Task) {
        self.metrics.scheduled_once.mark();
        self.delegate.schedule(delay, self.wrap(task));
    }

    fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) {
        self.metrics.scheduled_repetitively.mark();

        // A zero period makes the period-relative metrics meaningless; keep the plain
        // bookkeeping and let the delegate decide what a zero period means for pacing.
        let period_for_metrics = (period > Duration::ZERO).then_some(period);
        if period_for_metrics.is_none() {
            warn!(
                executor = self.name(),
                "zero period; overrun and percent-of-period will not be reported"
            );
        }

        self.delegate.schedule_at_fixed_rate(
            initial_delay,
            period,
            self.wrap_repeating(task, period_for_metrics),
        );
    }

    fn schedule_with_fixed_delay(
        &self,
        initial_delay: Duration,
        delay: Duration,
        task: RepeatingTask,
    ) {
        self.metrics.scheduled_repetitively.mark();

        // Fixed-delay runs cannot overrun; the next run is always scheduled relative to
        // the end of the previous one.
        self.delegate
            .schedule_with_fixed_delay(initial_delay, delay, self.wrap_repeating(task, None));
    }
}

impl<E: fmt::Debug> fmt::Debug for InstrumentedExecutor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedExecutor")
            .field("delegate", &self.delegate)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// How much of `period` the run consumed, as a whole percentage. A run twice as long
/// as the period reports 200.
#[expect(
    clippy::cast_possible_truncation,
    reason = "a run billions of times longer than its period is out of contract"
)]
fn percent_of(elapsed: Duration, period: Duration) -> i64 {
    (elapsed.as_nanos().saturating_mul(100) / period.as_nanos()) as i64
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
