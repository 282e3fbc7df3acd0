//! Benchmark comparing a bare delegate call with dispatch through an instrumented
//! wrapper, in its disabled, no-op and metric-reporting configurations.

#![expect(missing_docs, reason = "benchmarks do not require API documentation")]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use meterbox::MetricRegistry;
use wiretap::{Instrumented, InstrumentationProperties, NoOpHandler};

#[derive(Debug)]
struct Adder;

impl Adder {
    fn add(&self, a: u64, b: u64) -> u64 {
        a.wrapping_add(b)
    }
}

fn enabled_properties() -> Arc<InstrumentationProperties> {
    Arc::new(InstrumentationProperties::from_overrides(true, []))
}

fn dispatch_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    let bare = Instrumented::uninstrumented(Adder);

    let disabled = Instrumented::builder(Adder, "bench")
        .with_handler(Arc::new(NoOpHandler))
        .with_properties(Arc::new(InstrumentationProperties::from_overrides(
            false,
            [],
        )))
        .build()
        .unwrap();

    let noop = Instrumented::builder(Adder, "bench")
        .with_handler(Arc::new(NoOpHandler))
        .with_properties(enabled_properties())
        .build()
        .unwrap();

    let metered = Instrumented::builder(Adder, "bench")
        .with_metrics(Arc::new(MetricRegistry::new()))
        .with_properties(enabled_properties())
        .build()
        .unwrap();

    for (label, service) in [
        ("uninstrumented", &bare),
        ("disabled", &disabled),
        ("noop_handler", &noop),
        ("metrics_handler", &metered),
    ] {
        group.bench_with_input(BenchmarkId::new(label, "add"), &(), |b, ()| {
            b.iter(|| {
                let sum = service.call_infallible("add", &[], |a| a.add(black_box(1), 2));
                black_box(sum);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, dispatch_comparison);
criterion_main!(benches);
