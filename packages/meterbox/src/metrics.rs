use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicI64, AtomicU64};
use std::time::Duration;

/// We use `Relaxed` ordering for all metric mutation so the hot path stays as close as
/// possible to a plain store on 64-bit platforms. Readers may observe logically torn
/// combinations of different fields; each individual value is always one that was extant
/// at some recent point in time.
const METRIC_ACCESS_ORDERING: atomic::Ordering = atomic::Ordering::Relaxed;

/// The kind of a registered metric, stored alongside each registry entry and compared
/// by value when detecting registration conflicts.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricKind {
    /// An up/down integer value.
    Counter,
    /// A value computed on demand by a caller-supplied function.
    Gauge,
    /// A monotonically increasing occurrence count.
    Meter,
    /// A distribution of observed magnitudes.
    Histogram,
    /// A distribution of observed durations.
    Timer,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Meter => "meter",
            Self::Histogram => "histogram",
            Self::Timer => "timer",
        };

        f.write_str(name)
    }
}

/// An up/down counter.
///
/// # Example
///
/// ```
/// use meterbox::Counter;
///
/// let in_flight = Counter::new();
/// in_flight.inc();
/// in_flight.inc();
/// in_flight.dec();
///
/// assert_eq!(in_flight.count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
}

impl Counter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter by one.
    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    /// Decrements the counter by one.
    #[inline]
    pub fn dec(&self) {
        self.add(-1);
    }

    /// Adds a (possibly negative) delta to the counter.
    #[inline]
    pub fn add(&self, delta: i64) {
        self.value.fetch_add(delta, METRIC_ACCESS_ORDERING);
    }

    /// The current value.
    #[must_use]
    pub fn count(&self) -> i64 {
        self.value.load(METRIC_ACCESS_ORDERING)
    }
}

/// A monotonically increasing occurrence counter.
#[derive(Debug, Default)]
pub struct Meter {
    count: AtomicU64,
}

impl Meter {
    /// Creates a meter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one occurrence.
    #[inline]
    pub fn mark(&self) {
        self.mark_n(1);
    }

    /// Marks `n` occurrences in one call, for batch submissions.
    #[inline]
    pub fn mark_n(&self, n: u64) {
        self.count.fetch_add(n, METRIC_ACCESS_ORDERING);
    }

    /// The number of occurrences marked so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(METRIC_ACCESS_ORDERING)
    }
}

/// A distribution of observed integer magnitudes.
///
/// Tracks count, sum, minimum and maximum. Mean is derived on demand and is `NaN`
/// when no magnitudes have been recorded, never a substitute zero.
#[derive(Debug)]
pub struct Histogram {
    count: AtomicU64,
    sum: AtomicI64,
    min: AtomicI64,
    max: AtomicI64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicI64::new(0),
            min: AtomicI64::new(i64::MAX),
            max: AtomicI64::new(i64::MIN),
        }
    }
}

impl Histogram {
    /// Creates an empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observed magnitude.
    #[inline]
    pub fn record(&self, magnitude: i64) {
        self.count.fetch_add(1, METRIC_ACCESS_ORDERING);
        self.sum.fetch_add(magnitude, METRIC_ACCESS_ORDERING);
        self.min.fetch_min(magnitude, METRIC_ACCESS_ORDERING);
        self.max.fetch_max(magnitude, METRIC_ACCESS_ORDERING);
    }

    /// Takes a point-in-time snapshot of the distribution.
    ///
    /// Different fields of the snapshot are not guaranteed to be mutually consistent
    /// under concurrent recording; each is a value that was extant at some recent time.
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        let count = self.count.load(METRIC_ACCESS_ORDERING);

        HistogramSnapshot {
            count,
            sum: self.sum.load(METRIC_ACCESS_ORDERING),
            min: (count > 0).then(|| self.min.load(METRIC_ACCESS_ORDERING)),
            max: (count > 0).then(|| self.max.load(METRIC_ACCESS_ORDERING)),
        }
    }

    /// The number of recorded magnitudes.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(METRIC_ACCESS_ORDERING)
    }

    /// Mean of the recorded magnitudes; `NaN` when nothing has been recorded.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "approximate statistics; magnitudes near i64::MAX are out of contract"
    )]
    pub fn mean(&self) -> f64 {
        let snapshot = self.snapshot();
        if snapshot.count == 0 {
            return f64::NAN;
        }

        snapshot.sum as f64 / snapshot.count as f64
    }
}

/// A point-in-time view of a [`Histogram`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HistogramSnapshot {
    /// Number of recorded magnitudes.
    pub count: u64,

    /// Sum of recorded magnitudes.
    pub sum: i64,

    /// Smallest recorded magnitude; `None` when nothing has been recorded.
    pub min: Option<i64>,

    /// Largest recorded magnitude; `None` when nothing has been recorded.
    pub max: Option<i64>,
}

/// A distribution of observed durations.
#[derive(Debug, Default)]
pub struct Timer {
    count: AtomicU64,
    total_nanos: AtomicU64,
}

impl Timer {
    /// Creates an empty timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observed duration.
    #[inline]
    pub fn record(&self, elapsed: Duration) {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "a single recorded duration above ~584 years is out of contract"
        )]
        let nanos = elapsed.as_nanos() as u64;

        self.count.fetch_add(1, METRIC_ACCESS_ORDERING);
        self.total_nanos.fetch_add(nanos, METRIC_ACCESS_ORDERING);
    }

    /// The number of recorded durations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(METRIC_ACCESS_ORDERING)
    }

    /// The sum of all recorded durations.
    #[must_use]
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(METRIC_ACCESS_ORDERING))
    }
}

/// A value computed on demand by a caller-supplied function.
///
/// Derived gauges whose denominator may be zero report [`f64::NAN`] for the undefined
/// case rather than substituting zero; see [`crate::CacheStats`] for the ratio rules.
pub struct Gauge {
    read: Box<dyn Fn() -> f64 + Send + Sync>,
}

impl Gauge {
    /// Creates a gauge from its read function.
    pub fn new(read: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        Self {
            read: Box::new(read),
        }
    }

    /// Computes the current value.
    #[must_use]
    pub fn value(&self) -> f64 {
        (self.read)()
    }
}

impl fmt::Debug for Gauge {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge").finish_non_exhaustive()
    }
}

/// A registered metric of any kind, shared out of the registry via cheap `Arc` clones.
#[derive(Clone, Debug)]
pub enum Metric {
    /// An up/down integer value.
    Counter(Arc<Counter>),
    /// A value computed on demand.
    Gauge(Arc<Gauge>),
    /// A monotonically increasing occurrence count.
    Meter(Arc<Meter>),
    /// A distribution of observed magnitudes.
    Histogram(Arc<Histogram>),
    /// A distribution of observed durations.
    Timer(Arc<Timer>),
}

impl Metric {
    /// The kind tag used for registration conflict detection.
    #[must_use]
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Meter(_) => MetricKind::Meter,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Timer(_) => MetricKind::Timer,
        }
    }

    /// The inner counter, when this is one.
    #[must_use]
    pub fn as_counter(&self) -> Option<&Arc<Counter>> {
        match self {
            Self::Counter(counter) => Some(counter),
            _ => None,
        }
    }

    /// The inner gauge, when this is one.
    #[must_use]
    pub fn as_gauge(&self) -> Option<&Arc<Gauge>> {
        match self {
            Self::Gauge(gauge) => Some(gauge),
            _ => None,
        }
    }

    /// The inner meter, when this is one.
    #[must_use]
    pub fn as_meter(&self) -> Option<&Arc<Meter>> {
        match self {
            Self::Meter(meter) => Some(meter),
            _ => None,
        }
    }

    /// The inner histogram, when this is one.
    #[must_use]
    pub fn as_histogram(&self) -> Option<&Arc<Histogram>> {
        match self {
            Self::Histogram(histogram) => Some(histogram),
            _ => None,
        }
    }

    /// The inner timer, when this is one.
    #[must_use]
    pub fn as_timer(&self) -> Option<&Arc<Timer>> {
        match self {
            Self::Timer(timer) => Some(timer),
            _ => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn counter_goes_up_and_down() {
        let counter = Counter::new();

        counter.inc();
        counter.inc();
        counter.inc();
        counter.dec();

        assert_eq!(counter.count(), 2);

        counter.add(-10);

        assert_eq!(counter.count(), -8);
    }

    #[test]
    fn meter_accumulates_marks() {
        let meter = Meter::new();

        meter.mark();
        meter.mark_n(4);

        assert_eq!(meter.count(), 5);
    }

    #[test]
    fn empty_histogram_has_no_extremes_and_nan_mean() {
        let histogram = Histogram::new();

        let snapshot = histogram.snapshot();

        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.sum, 0);
        assert_eq!(snapshot.min, None);
        assert_eq!(snapshot.max, None);
        assert!(histogram.mean().is_nan());
    }

    #[test]
    fn histogram_tracks_extremes() {
        let histogram = Histogram::new();

        histogram.record(10);
        histogram.record(-5);
        histogram.record(150);

        let snapshot = histogram.snapshot();

        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.sum, 155);
        assert_eq!(snapshot.min, Some(-5));
        assert_eq!(snapshot.max, Some(150));
    }

    #[test]
    fn histogram_mean_is_exact_for_exact_inputs() {
        let histogram = Histogram::new();

        histogram.record(2);
        histogram.record(4);

        assert!((histogram.mean() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn timer_accumulates_durations() {
        let timer = Timer::new();

        timer.record(Duration::from_millis(100));
        timer.record(Duration::from_millis(150));

        assert_eq!(timer.count(), 2);
        assert_eq!(timer.total(), Duration::from_millis(250));
    }

    #[test]
    fn gauge_reads_on_demand() {
        let value = Arc::new(AtomicI64::new(7));

        let source = Arc::clone(&value);
        #[expect(clippy::cast_precision_loss, reason = "small test values")]
        let gauge = Gauge::new(move || source.load(atomic::Ordering::Relaxed) as f64);

        assert!((gauge.value() - 7.0).abs() < f64::EPSILON);

        value.store(9, atomic::Ordering::Relaxed);

        assert!((gauge.value() - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn metric_reports_its_kind() {
        assert_eq!(
            Metric::Counter(Arc::new(Counter::new())).kind(),
            MetricKind::Counter
        );
        assert_eq!(
            Metric::Gauge(Arc::new(Gauge::new(|| 0.0))).kind(),
            MetricKind::Gauge
        );
        assert_eq!(
            Metric::Meter(Arc::new(Meter::new())).kind(),
            MetricKind::Meter
        );
        assert_eq!(
            Metric::Histogram(Arc::new(Histogram::new())).kind(),
            MetricKind::Histogram
        );
        assert_eq!(
            Metric::Timer(Arc::new(Timer::new())).kind(),
            MetricKind::Timer
        );
    }

    #[test]
    fn metric_downcasts_to_matching_kind_only() {
        let metric = Metric::Meter(Arc::new(Meter::new()));

        assert!(metric.as_meter().is_some());
        assert!(metric.as_counter().is_none());
        assert!(metric.as_gauge().is_none());
        assert!(metric.as_histogram().is_none());
        assert!(metric.as_timer().is_none());
    }

    // All metric primitives are shared across threads through the registry.
    static_assertions::assert_impl_all!(Counter: Send, Sync);
    static_assertions::assert_impl_all!(Meter: Send, Sync);
    static_assertions::assert_impl_all!(Histogram: Send, Sync);
    static_assertions::assert_impl_all!(Timer: Send, Sync);
    static_assertions::assert_impl_all!(Gauge: Send, Sync);
    static_assertions::assert_impl_all!(Metric: Send, Sync);
}
