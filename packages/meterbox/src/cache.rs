use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{Clock, ERR_POISONED_LOCK, Error, Gauge, Metric, MetricId, MetricRegistry, Result};

/// How long one cache statistics snapshot is served before the source is polled again.
///
/// Cache statistics are scraped gauge by gauge, so without memoization a single scrape
/// of nine gauges would poll the cache nine times and the derived ratios would mix
/// snapshots.
const STATS_MEMOIZATION_WINDOW: Duration = Duration::from_millis(500);

/// A point-in-time snapshot of cache effectiveness counters.
///
/// All fields are cumulative since cache creation. The derived accessors follow the
/// undefined-as-`NaN` rule for ratios and report a zero penalty when nothing has been
/// loaded yet.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    /// Number of lookups that found a value.
    pub hit_count: u64,

    /// Number of lookups that found nothing.
    pub miss_count: u64,

    /// Number of loads that produced a value.
    pub load_success_count: u64,

    /// Number of loads that failed.
    pub load_failure_count: u64,

    /// Total time spent loading values.
    pub total_load_time: Duration,

    /// Number of entries evicted.
    pub eviction_count: u64,
}

impl CacheStats {
    /// Total number of lookups.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.hit_count.saturating_add(self.miss_count)
    }

    /// Fraction of lookups that hit; `NaN` when there have been no lookups.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        ratio(self.hit_count, self.request_count())
    }

    /// Fraction of lookups that missed; `NaN` when there have been no lookups.
    #[must_use]
    pub fn miss_ratio(&self) -> f64 {
        ratio(self.miss_count, self.request_count())
    }

    /// Mean time spent per load, in nanoseconds; zero when nothing has been loaded.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "approximate statistics derived from cumulative counters"
    )]
    pub fn average_load_penalty(&self) -> f64 {
        let loads = self
            .load_success_count
            .saturating_add(self.load_failure_count);
        if loads == 0 {
            return 0.0;
        }

        self.total_load_time.as_nanos() as f64 / loads as f64
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "approximate statistics derived from cumulative counters"
)]
fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return f64::NAN;
    }

    part as f64 / whole as f64
}

/// Anything that can report its current [`CacheStats`], typically a cache wrapper.
///
/// Implementations are polled at most once per memoization window per registered cache,
/// so a moderately expensive snapshot is acceptable.
pub trait CacheStatsSource: std::fmt::Debug + Send + Sync {
    /// The cumulative statistics at this moment.
    fn stats(&self) -> CacheStats;
}

/// Serves a recent snapshot from the source, polling it at most once per window.
///
/// All gauges of one registered cache share a single instance of this, so one scrape
/// pass observes one coherent snapshot and derived ratios are internally consistent.
#[derive(Debug)]
struct MemoizedCacheStats {
    source: Arc<dyn CacheStatsSource>,
    clock: Arc<dyn Clock>,
    cell: Mutex<Option<(Duration, CacheStats)>>,
}

impl MemoizedCacheStats {
    fn new(source: Arc<dyn CacheStatsSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            cell: Mutex::new(None),
        }
    }

    fn current(&self) -> CacheStats {
        let now = self.clock.now();

        {
            let cell = self.cell.lock().expect(ERR_POISONED_LOCK);
            if let Some((taken_at, stats)) = *cell {
                if now.saturating_sub(taken_at) < STATS_MEMOIZATION_WINDOW {
                    return stats;
                }
            }
        }

        // Polled without holding the cell lock; concurrent expiry may poll the source
        // more than once, which is harmless.
        let stats = self.source.stats();
        *self.cell.lock().expect(ERR_POISONED_LOCK) = Some((now, stats));
        stats
    }
}

/// Registers the standard set of effectiveness gauges for a named cache.
///
/// Nine gauges are registered under the cache name (`{name}.request.count`,
/// `{name}.hit.ratio` and so on), all reading from one shared snapshot that is
/// refreshed at most every 500 milliseconds. Registration uses the
/// replacement policy, so re-registering a cache under an existing name rebinds the
/// gauges to the new source rather than failing.
///
/// # Errors
///
/// [`Error::BlankName`] when `name` is empty or whitespace. [`Error::NameConflict`]
/// when one of the gauge identities is taken by a non-gauge metric.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use meterbox::{
///     CacheStats, CacheStatsSource, MetricId, MetricRegistry, SystemClock,
///     register_cache_metrics,
/// };
///
/// #[derive(Debug)]
/// struct FixedStats;
///
/// impl CacheStatsSource for FixedStats {
///     fn stats(&self) -> CacheStats {
///         CacheStats {
///             hit_count: 3,
///             miss_count: 1,
///             ..CacheStats::default()
///         }
///     }
/// }
///
/// let registry = MetricRegistry::new();
/// register_cache_metrics(
///     &registry,
///     "sessions",
///     Arc::new(FixedStats),
///     Arc::new(SystemClock::new()),
/// )?;
///
/// let hit_ratio = registry
///     .get(&MetricId::new("sessions.hit.ratio"))
///     .unwrap();
/// assert!((hit_ratio.as_gauge().unwrap().value() - 0.75).abs() < f64::EPSILON);
/// # Ok::<(), meterbox::Error>(())
/// ```
pub fn register_cache_metrics(
    registry: &MetricRegistry,
    name: &str,
    source: Arc<dyn CacheStatsSource>,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::BlankName { what: "cache name" });
    }

    let memoized = Arc::new(MemoizedCacheStats::new(source, clock));

    #[expect(
        clippy::cast_precision_loss,
        reason = "approximate statistics derived from cumulative counters"
    )]
    let gauges: [(&str, Box<dyn Fn(&CacheStats) -> f64 + Send + Sync>); 9] = [
        ("request.count", Box::new(|s| s.request_count() as f64)),
        ("hit.count", Box::new(|s| s.hit_count as f64)),
        ("hit.ratio", Box::new(CacheStats::hit_ratio)),
        ("miss.count", Box::new(|s| s.miss_count as f64)),
        ("miss.ratio", Box::new(CacheStats::miss_ratio)),
        ("eviction.count", Box::new(|s| s.eviction_count as f64)),
        (
            "averageLoadPenalty",
            Box::new(CacheStats::average_load_penalty),
        ),
        (
            "loadSuccess.count",
            Box::new(|s| s.load_success_count as f64),
        ),
        (
            "loadFailure.count",
            Box::new(|s| s.load_failure_count as f64),
        ),
    ];

    for (suffix, derive) in gauges {
        let memoized = Arc::clone(&memoized);
        let id = MetricId::new(format!("{name}.{suffix}"));

        registry.register_with_replacement(
            id,
            Metric::Gauge(Arc::new(Gauge::new(move || derive(&memoized.current())))),
        )?;
    }

    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::ManualClock;

    use super::*;

    /// Counts how often it is polled and reports that count as the hit count.
    #[derive(Debug, Default)]
    struct CountingSource {
        polls: AtomicU64,
    }

    impl CacheStatsSource for CountingSource {
        fn stats(&self) -> CacheStats {
            let polls = self.polls.fetch_add(1, Ordering::Relaxed) + 1;

            CacheStats {
                hit_count: polls,
                miss_count: 1,
                ..CacheStats::default()
            }
        }
    }

    fn gauge_value(registry: &MetricRegistry, name: &str) -> f64 {
        registry
            .get(&MetricId::new(name))
            .unwrap()
            .as_gauge()
            .unwrap()
            .value()
    }

    #[test]
    fn empty_stats_have_nan_ratios_and_zero_penalty() {
        let stats = CacheStats::default();

        assert_eq!(stats.request_count(), 0);
        assert!(stats.hit_ratio().is_nan());
        assert!(stats.miss_ratio().is_nan());
        assert!((stats.average_load_penalty() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn derived_stats_follow_the_counters() {
        let stats = CacheStats {
            hit_count: 9,
            miss_count: 3,
            load_success_count: 2,
            load_failure_count: 2,
            total_load_time: Duration::from_nanos(400),
            eviction_count: 5,
        };

        assert_eq!(stats.request_count(), 12);
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
        assert!((stats.miss_ratio() - 0.25).abs() < f64::EPSILON);
        assert!((stats.average_load_penalty() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn registers_all_nine_gauges() {
        let registry = MetricRegistry::new();

        register_cache_metrics(
            &registry,
            "sessions",
            Arc::new(CountingSource::default()),
            Arc::new(ManualClock::new()),
        )
        .unwrap();

        assert_eq!(registry.metrics_prefixed_by("sessions.").len(), 9);
    }

    #[test]
    fn blank_name_is_rejected() {
        let registry = MetricRegistry::new();

        let error = register_cache_metrics(
            &registry,
            "  ",
            Arc::new(CountingSource::default()),
            Arc::new(ManualClock::new()),
        )
        .unwrap_err();

        assert!(matches!(error, Error::BlankName { .. }));
    }

    #[test]
    fn snapshot_is_shared_across_gauges_within_the_window() {
        let registry = MetricRegistry::new();
        let source = Arc::new(CountingSource::default());

        register_cache_metrics(
            &registry,
            "c",
            Arc::clone(&source) as Arc<dyn CacheStatsSource>,
            Arc::new(ManualClock::new()),
        )
        .unwrap();

        // Reading every gauge polls the source exactly once.
        let _ = gauge_value(&registry, "c.hit.count");
        let _ = gauge_value(&registry, "c.miss.count");
        let _ = gauge_value(&registry, "c.hit.ratio");
        let _ = gauge_value(&registry, "c.request.count");

        assert_eq!(source.polls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn snapshot_refreshes_after_the_window_elapses() {
        let registry = MetricRegistry::new();
        let source = Arc::new(CountingSource::default());
        let clock = Arc::new(ManualClock::new());

        register_cache_metrics(
            &registry,
            "c",
            Arc::clone(&source) as Arc<dyn CacheStatsSource>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();

        assert!((gauge_value(&registry, "c.hit.count") - 1.0).abs() < f64::EPSILON);

        // Just inside the window: still the memoized snapshot.
        clock.advance(Duration::from_millis(499));
        assert!((gauge_value(&registry, "c.hit.count") - 1.0).abs() < f64::EPSILON);

        // Window elapsed: the source is polled again.
        clock.advance(Duration::from_millis(1));
        assert!((gauge_value(&registry, "c.hit.count") - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reregistration_rebinds_gauges_to_the_new_source() {
        let registry = MetricRegistry::new();
        let clock = Arc::new(ManualClock::new());

        register_cache_metrics(
            &registry,
            "c",
            Arc::new(CountingSource::default()),
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();

        #[derive(Debug)]
        struct Evictions;

        impl CacheStatsSource for Evictions {
            fn stats(&self) -> CacheStats {
                CacheStats {
                    eviction_count: 42,
                    ..CacheStats::default()
                }
            }
        }

        register_cache_metrics(&registry, "c", Arc::new(Evictions), clock).unwrap();

        assert!((gauge_value(&registry, "c.eviction.count") - 42.0).abs() < f64::EPSILON);
        assert_eq!(registry.metrics_prefixed_by("c.").len(), 9);
    }
}
