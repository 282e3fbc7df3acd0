use std::sync::{Arc, Mutex};

use foldhash::{HashMap, HashMapExt};
use tracing::{debug, warn};

use crate::{
    Counter, ERR_POISONED_LOCK, Error, Gauge, Histogram, Meter, Metric, MetricId, MetricKind,
    Result, Timer,
};

/// A concurrent registry of named (and optionally tagged) metrics.
///
/// The registry is the one shared mutable resource of this crate. All mutation happens
/// under a single registry-wide mutex so that concurrent first-time registration is
/// race-free; the mutex is only held across lookups and inserts, never across user code,
/// so unrelated calls are not serialized.
///
/// Three registration disciplines are offered, with distinct collision policies that
/// each API documents:
///
/// * [`register_safe()`][Self::register_safe]: idempotent register-or-get; keeps the
///   existing instance on a kind match (with a warning) and fails on a kind conflict.
/// * [`register_with_replacement()`][Self::register_with_replacement]: swaps in the
///   new instance on a kind match; used when re-registering is intentional, such as
///   re-wrapping a cache under the same name.
/// * the typed accessors ([`counter()`][Self::counter], [`meter()`][Self::meter],
///   [`histogram()`][Self::histogram], [`timer()`][Self::timer]): get-or-create that
///   treats a kind mismatch as a programming error.
///
/// # Example
///
/// ```
/// use meterbox::{MetricId, MetricRegistry};
///
/// let registry = MetricRegistry::new();
///
/// let requests = registry.meter(MetricId::new("server.requests"))?;
/// requests.mark();
///
/// // The same identity resolves to the same instance.
/// let again = registry.meter(MetricId::new("server.requests"))?;
/// assert_eq!(again.count(), 1);
/// # Ok::<(), meterbox::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct MetricRegistry {
    metrics: Mutex<HashMap<MetricId, Metric>>,
}

impl MetricRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up the metric registered under `id`, if any.
    #[must_use]
    pub fn get(&self, id: &MetricId) -> Option<Metric> {
        self.metrics
            .lock()
            .expect(ERR_POISONED_LOCK)
            .get(id)
            .cloned()
    }

    /// Registers `metric` under `id`, failing if the identity is already taken.
    ///
    /// # Errors
    ///
    /// [`Error::NameConflict`] when any metric is already registered under `id`.
    pub fn register(&self, id: MetricId, metric: Metric) -> Result<Metric> {
        let mut metrics = self.metrics.lock().expect(ERR_POISONED_LOCK);

        if let Some(existing) = metrics.get(&id) {
            return Err(Error::NameConflict {
                existing: existing.kind(),
                offered: metric.kind(),
                id,
            });
        }

        metrics.insert(id, metric.clone());
        Ok(metric)
    }

    /// Removes the metric registered under `id`. Returns whether anything was removed.
    pub fn remove(&self, id: &MetricId) -> bool {
        self.metrics
            .lock()
            .expect(ERR_POISONED_LOCK)
            .remove(id)
            .is_some()
    }

    /// Idempotent register-or-get.
    ///
    /// If nothing is registered under `id`, registers and returns `metric`. If a metric
    /// of the same kind is already registered there, logs a warning and returns the
    /// **existing** instance; the offered one is discarded (last writer loses). A
    /// registered metric of a different kind is a caller error.
    ///
    /// # Errors
    ///
    /// [`Error::NameConflict`] when the existing metric is of a different kind.
    pub fn register_safe(&self, id: MetricId, metric: Metric) -> Result<Metric> {
        self.register_or_replace(id, metric, false)
    }

    /// Register-or-replace.
    ///
    /// Same conflict rules as [`register_safe()`][Self::register_safe], but on a kind
    /// match the existing metric is removed and the offered one installed and returned
    /// (last writer wins). Use this when re-registering is intentional, e.g. binding
    /// fresh gauges to a new cache instance under an existing name.
    ///
    /// # Errors
    ///
    /// [`Error::NameConflict`] when the existing metric is of a different kind.
    pub fn register_with_replacement(&self, id: MetricId, metric: Metric) -> Result<Metric> {
        self.register_or_replace(id, metric, true)
    }

    fn register_or_replace(&self, id: MetricId, metric: Metric, replace: bool) -> Result<Metric> {
        let mut metrics = self.metrics.lock().expect(ERR_POISONED_LOCK);

        let Some(existing) = metrics.get(&id) else {
            metrics.insert(id, metric.clone());
            return Ok(metric);
        };

        if existing.kind() != metric.kind() {
            return Err(Error::NameConflict {
                existing: existing.kind(),
                offered: metric.kind(),
                id,
            });
        }

        if replace {
            debug!(id = %id, "replacing existing registered metric");
            metrics.insert(id, metric.clone());
            Ok(metric)
        } else {
            warn!(id = %id, "metric already registered at this identity, keeping existing");
            Ok(existing.clone())
        }
    }

    /// Returns the counter registered under `id`, creating it first when absent.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] when `id` is taken by a metric of another kind.
    pub fn counter(&self, id: MetricId) -> Result<Arc<Counter>> {
        self.get_or_add(id, MetricKind::Counter, || {
            Metric::Counter(Arc::new(Counter::new()))
        })
        .map(|metric| match metric {
            Metric::Counter(counter) => counter,
            _ => unreachable!("get_or_add verified the kind"),
        })
    }

    /// Returns the meter registered under `id`, creating it first when absent.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] when `id` is taken by a metric of another kind.
    pub fn meter(&self, id: MetricId) -> Result<Arc<Meter>> {
        self.get_or_add(id, MetricKind::Meter, || Metric::Meter(Arc::new(Meter::new())))
            .map(|metric| match metric {
                Metric::Meter(meter) => meter,
                _ => unreachable!("get_or_add verified the kind"),
            })
    }

    /// Returns the histogram registered under `id`, creating it first when absent.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] when `id` is taken by a metric of another kind.
    pub fn histogram(&self, id: MetricId) -> Result<Arc<Histogram>> {
        self.get_or_add(id, MetricKind::Histogram, || {
            Metric::Histogram(Arc::new(Histogram::new()))
        })
        .map(|metric| match metric {
            Metric::Histogram(histogram) => histogram,
            _ => unreachable!("get_or_add verified the kind"),
        })
    }

    /// Returns the timer registered under `id`, creating it first when absent.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] when `id` is taken by a metric of another kind.
    pub fn timer(&self, id: MetricId) -> Result<Arc<Timer>> {
        self.get_or_add(id, MetricKind::Timer, || Metric::Timer(Arc::new(Timer::new())))
            .map(|metric| match metric {
                Metric::Timer(timer) => timer,
                _ => unreachable!("get_or_add verified the kind"),
            })
    }

    /// Registers a gauge under `id` via the [`register_safe()`][Self::register_safe]
    /// policy and returns the registered instance.
    ///
    /// # Errors
    ///
    /// [`Error::NameConflict`] when `id` is taken by a metric of another kind.
    pub fn gauge(
        &self,
        id: MetricId,
        read: impl Fn() -> f64 + Send + Sync + 'static,
    ) -> Result<Arc<Gauge>> {
        self.register_safe(id, Metric::Gauge(Arc::new(Gauge::new(read))))
            .map(|metric| match metric {
                Metric::Gauge(gauge) => gauge,
                _ => unreachable!("register_safe verified the kind"),
            })
    }

    /// Get-or-create under the registry lock.
    ///
    /// With lock-free lookups this would be the optimistic build-then-race path; under
    /// the registry-wide mutex the race collapses into a single occupied-entry check,
    /// with the same observable contract: whoever registers first wins and later callers
    /// receive the winner, or a [`Error::TypeMismatch`] when the winner is of an
    /// unexpected kind.
    fn get_or_add(
        &self,
        id: MetricId,
        expected: MetricKind,
        build: impl FnOnce() -> Metric,
    ) -> Result<Metric> {
        let mut metrics = self.metrics.lock().expect(ERR_POISONED_LOCK);

        if let Some(existing) = metrics.get(&id) {
            if existing.kind() != expected {
                return Err(Error::TypeMismatch {
                    expected,
                    found: existing.kind(),
                    id,
                });
            }

            return Ok(existing.clone());
        }

        let metric = build();
        debug_assert_eq!(metric.kind(), expected);

        metrics.insert(id, metric.clone());
        Ok(metric)
    }

    /// The number of registered metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.lock().expect(ERR_POISONED_LOCK).len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered identities, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<MetricId> {
        let mut ids: Vec<_> = self
            .metrics
            .lock()
            .expect(ERR_POISONED_LOCK)
            .keys()
            .cloned()
            .collect();

        ids.sort();
        ids
    }

    /// All metrics whose name starts with `prefix`, sorted by identity.
    #[must_use]
    pub fn metrics_prefixed_by(&self, prefix: &str) -> Vec<(MetricId, Metric)> {
        let mut matching: Vec<_> = self
            .metrics
            .lock()
            .expect(ERR_POISONED_LOCK)
            .iter()
            .filter(|(id, _)| id.name().starts_with(prefix))
            .map(|(id, metric)| (id.clone(), metric.clone()))
            .collect();

        matching.sort_by(|(a, _), (b, _)| a.cmp(b));
        matching
    }
}
