//! End to end exercise of the registry with both adapters attached: a cache reporting
//! effectiveness gauges and a pooled executor reporting task accounting, all into one
//! shared registry.

#![cfg(not(miri))] // Talks to real threads and the real clock.

use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use meterbox::{
    CacheStats, CacheStatsSource, Executor, InstrumentedExecutor, MetricId, MetricRegistry,
    SystemClock, ThreadExecutor, register_cache_metrics,
};

#[derive(Debug)]
struct SharedCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStatsSource for SharedCounters {
    fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }
}

#[test]
fn cache_and_executor_report_into_one_registry() {
    let registry = Arc::new(MetricRegistry::new());
    let clock = Arc::new(SystemClock::new());

    let cache = Arc::new(SharedCounters {
        hits: AtomicU64::new(0),
        misses: AtomicU64::new(0),
    });

    register_cache_metrics(
        &registry,
        "lookup",
        Arc::clone(&cache) as Arc<dyn CacheStatsSource>,
        Arc::clone(&clock) as Arc<dyn meterbox::Clock>,
    )
    .unwrap();

    let executor = InstrumentedExecutor::new(
        ThreadExecutor::new(NonZero::new(4).unwrap()),
        "pipeline",
        &registry,
        clock,
    )
    .unwrap();

    // Tasks simulate cache traffic: three hits for every miss.
    for i in 0..32 {
        let cache = Arc::clone(&cache);
        executor.execute(Box::new(move || {
            if i % 4 == 0 {
                cache.misses.fetch_add(1, Ordering::Relaxed);
            } else {
                cache.hits.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    executor.shutdown();
    assert!(executor.await_termination(Duration::from_secs(10)));

    let submitted = registry
        .get(&MetricId::new("executor.submitted").with_tag("name", "pipeline"))
        .unwrap();
    assert_eq!(submitted.as_meter().unwrap().count(), 32);

    let completed = registry
        .get(&MetricId::new("executor.completed").with_tag("name", "pipeline"))
        .unwrap();
    assert_eq!(completed.as_meter().unwrap().count(), 32);

    let running = registry
        .get(&MetricId::new("executor.running").with_tag("name", "pipeline"))
        .unwrap();
    assert_eq!(running.as_counter().unwrap().count(), 0);

    let hit_ratio = registry
        .get(&MetricId::new("lookup.hit.ratio"))
        .unwrap();
    assert!((hit_ratio.as_gauge().unwrap().value() - 0.75).abs() < f64::EPSILON);

    // 9 cache gauges plus 8 executor metrics.
    assert_eq!(registry.len(), 17);
}
