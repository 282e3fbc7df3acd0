#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! # wiretap
//!
//! Intercept calls to a wrapped value and report what happened to composable
//! observers, without ever affecting the intercepted call itself.
//!
//! # Wrapping a value
//!
//! [`Instrumented`] pairs a delegate with a dispatcher. Calls go through
//! [`call()`][Instrumented::call] (fallible) or
//! [`call_infallible()`][Instrumented::call_infallible]:
//!
//! ```
//! use std::sync::Arc;
//!
//! use meterbox::{MetricId, MetricRegistry};
//! use wiretap::Instrumented;
//!
//! #[derive(Debug)]
//! struct Greeter;
//!
//! impl Greeter {
//!     fn greet(&self, name: &str) -> String {
//!         format!("hello, {name}")
//!     }
//! }
//!
//! let registry = Arc::new(MetricRegistry::new());
//!
//! let greeter = Instrumented::builder(Greeter, "greeter")
//!     .with_metrics(Arc::clone(&registry))
//!     .with_logging()
//!     .build()?;
//!
//! let greeting = greeter.call_infallible("greet", &[&"world"], |g| g.greet("world"));
//! assert_eq!(greeting, "hello, world");
//!
//! let timer = registry.timer(MetricId::new("greeter.greet")).unwrap();
//! assert_eq!(timer.count(), 1);
//! # Ok::<(), wiretap::ConfigError>(())
//! ```
//!
//! # Observers
//!
//! An [`InvocationEventHandler`] is asked for an [`InvocationContext`] before the call
//! and receives it back on success or failure. [`MetricsHandler`] reports into a
//! [`meterbox::MetricRegistry`], [`LoggingHandler`] logs via `tracing`, and
//! [`CompositeHandler`] fans out to several handlers while keeping each paired with
//! its own context. An [`InstrumentationFilter`] decides per method whether the
//! observers run at all.
//!
//! # Observers cannot break the call
//!
//! The dispatcher contains every observer panic, logs it and carries on; the
//! intercepted call's result always reaches the caller unchanged. The only way this
//! crate fails loudly is at construction time, via [`ConfigError`].
//!
//! # Runtime toggles
//!
//! [`InstrumentationProperties`] reads `INSTRUMENT` and `INSTRUMENT_<NAME>`
//! environment variables. Instrumentation is on by default; a disabled instance costs
//! one lock-free load per call.

mod composite;
mod dispatch;
mod error;
mod filter;
mod handler;
mod invocation;
mod metrics;
mod panics;
mod properties;

pub use composite::*;
pub use dispatch::*;
pub use error::*;
pub use filter::*;
pub use handler::*;
pub use invocation::*;
pub use metrics::*;
pub use properties::*;
