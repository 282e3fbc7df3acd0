#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! # meterbox
//!
//! A concurrent metric registry with tagged identities, plus ready-made adapters that
//! bind caches and executors to it.
//!
//! # Metrics and the registry
//!
//! Five metric kinds are provided: [`Counter`], [`Gauge`], [`Meter`], [`Histogram`]
//! and [`Timer`]. All of them are lock-free to update and safe to share across threads.
//! A [`MetricRegistry`] maps a [`MetricId`] (a dotted name plus an unordered tag set)
//! to exactly one metric instance, so every component that asks for the same identity
//! ends up updating the same data:
//!
//! ```
//! use meterbox::{MetricId, MetricRegistry};
//!
//! let registry = MetricRegistry::new();
//!
//! let requests = registry.meter(MetricId::new("server.requests"))?;
//! requests.mark();
//!
//! let same = registry.meter(MetricId::new("server.requests"))?;
//! assert_eq!(same.count(), 1);
//! # Ok::<(), meterbox::Error>(())
//! ```
//!
//! Identities already registered with a *different* kind are always an error; how a
//! *matching* registration is resolved depends on which registration API is used. See
//! [`MetricRegistry`] for the three policies.
//!
//! # Cache instrumentation
//!
//! Anything that can report [`CacheStats`] can be bound to a registry with
//! [`register_cache_metrics()`], which installs the standard nine effectiveness
//! gauges under the cache name. Statistics are memoized for 500 milliseconds so that one
//! scrape pass observes one coherent snapshot.
//!
//! # Executor instrumentation
//!
//! [`InstrumentedExecutor`] wraps any [`Executor`] or [`ScheduledExecutor`] and
//! accounts for every task in the registry under tagged `executor.*` identities:
//! submissions, concurrently running tasks, completions, wall-clock durations and,
//! for fixed-rate tasks, period overruns. [`DirectExecutor`] and [`ThreadExecutor`]
//! are provided for inline and pooled execution.
//!
//! # Time
//!
//! Everything that measures elapsed time reads it through the [`Clock`] trait.
//! Production code uses [`SystemClock`]; tests substitute [`ManualClock`] to make
//! durations and memoization windows deterministic.
//!
//! # Panic policy
//!
//! Metric updates never panic. Registry operations return [`Error`] instead of
//! panicking on conflicting registrations. Executor tasks that panic are caught,
//! logged and accounted for; the worker and the bookkeeping both survive.

mod cache;
mod error;
mod executor;
mod id;
mod metrics;
mod registry;
mod time;

pub use cache::*;
pub use error::*;
pub use executor::*;
pub use id::*;
pub use metrics::*;
pub use registry::*;
pub use time::*;
