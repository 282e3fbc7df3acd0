use std::error::Error;
use std::fmt;
use std::sync::Arc;

use meterbox::{Clock, MetricId, MetricRegistry};
use tracing::{debug, warn};

use crate::{ConfigError, Invocation, InvocationContext, InvocationEventHandler, Result};

/// Reports intercepted calls into a [`MetricRegistry`].
///
/// Each successful call of method `m` is recorded in a timer named `{prefix}.m`; each
/// failed call marks the `{prefix}.failures` meter. Timers are resolved in the registry
/// on first use per method and shared from then on.
///
/// Registry conflicts (someone registered a non-timer under a method's identity) are
/// logged and the sample is dropped; a misconfigured registry must not break the
/// observed call.
#[derive(Debug)]
pub struct MetricsHandler {
    registry: Arc<MetricRegistry>,
    prefix: Box<str>,
    clock: Arc<dyn Clock>,
}

impl MetricsHandler {
    /// Creates a handler reporting under `prefix` into `registry`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::BlankName`] when `prefix` is empty or whitespace.
    pub fn new(registry: Arc<MetricRegistry>, prefix: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        if prefix.trim().is_empty() {
            return Err(ConfigError::BlankName {
                what: "metric prefix",
            });
        }

        Ok(Self {
            registry,
            prefix: prefix.into(),
            clock,
        })
    }

    /// The prefix under which this handler reports.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl InvocationEventHandler for MetricsHandler {
    fn pre_invocation(&self, invocation: &Invocation<'_>) -> Option<InvocationContext> {
        Some(InvocationContext::new(invocation, self.clock.now()))
    }

    fn on_success(&self, context: Option<&InvocationContext>, _result: &dyn fmt::Debug) {
        let Some(context) = context else {
            debug!("successful call completed without a metric context; not recorded");
            return;
        };

        let elapsed = self.clock.now().saturating_sub(context.start());
        let id = MetricId::new(format!("{}.{}", self.prefix, context.method()));

        match self.registry.timer(id) {
            Ok(timer) => timer.record(elapsed),
            Err(error) => warn!(%error, "could not resolve call timer; sample dropped"),
        }
    }

    fn on_failure(&self, _context: Option<&InvocationContext>, _error: &(dyn Error + 'static)) {
        let id = MetricId::new(format!("{}.failures", self.prefix));

        match self.registry.meter(id) {
            Ok(failures) => failures.mark(),
            Err(error) => warn!(%error, "could not resolve failure meter; sample dropped"),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use meterbox::ManualClock;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("nope")]
    struct Nope;

    fn handler_with_clock(registry: &Arc<MetricRegistry>, clock: &Arc<ManualClock>) -> MetricsHandler {
        MetricsHandler::new(
            Arc::clone(registry),
            "service",
            Arc::clone(clock) as Arc<dyn Clock>,
        )
        .unwrap()
    }

    #[test]
    fn blank_prefix_is_rejected() {
        let error = MetricsHandler::new(
            Arc::new(MetricRegistry::new()),
            " ",
            Arc::new(ManualClock::new()),
        )
        .unwrap_err();

        assert!(matches!(error, ConfigError::BlankName { .. }));
    }

    #[test]
    fn success_records_elapsed_time_per_method() {
        let registry = Arc::new(MetricRegistry::new());
        let clock = Arc::new(ManualClock::new());
        let handler = handler_with_clock(&registry, &clock);

        let context = handler
            .pre_invocation(&Invocation::new("svc", "get", &[]))
            .unwrap();
        clock.advance(Duration::from_millis(12));
        handler.on_success(Some(&context), &"ok");

        let timer = registry.timer(MetricId::new("service.get")).unwrap();
        assert_eq!(timer.count(), 1);
        assert_eq!(timer.total(), Duration::from_millis(12));
    }

    #[test]
    fn methods_report_into_separate_timers() {
        let registry = Arc::new(MetricRegistry::new());
        let clock = Arc::new(ManualClock::new());
        let handler = handler_with_clock(&registry, &clock);

        for method in ["get", "get", "put"] {
            let invocation = Invocation::new("svc", method, &[]);
            let context = handler.pre_invocation(&invocation).unwrap();
            handler.on_success(Some(&context), &"ok");
        }

        assert_eq!(
            registry.timer(MetricId::new("service.get")).unwrap().count(),
            2
        );
        assert_eq!(
            registry.timer(MetricId::new("service.put")).unwrap().count(),
            1
        );
    }

    #[test]
    fn failures_share_one_meter() {
        let registry = Arc::new(MetricRegistry::new());
        let clock = Arc::new(ManualClock::new());
        let handler = handler_with_clock(&registry, &clock);

        let context = handler
            .pre_invocation(&Invocation::new("svc", "get", &[]))
            .unwrap();

        handler.on_failure(Some(&context), &Nope);
        handler.on_failure(None, &Nope);

        let failures = registry.meter(MetricId::new("service.failures")).unwrap();
        assert_eq!(failures.count(), 2);
    }

    #[test]
    fn success_without_context_is_dropped_quietly() {
        let registry = Arc::new(MetricRegistry::new());
        let clock = Arc::new(ManualClock::new());
        let handler = handler_with_clock(&registry, &clock);

        handler.on_success(None, &"ok");

        assert!(registry.is_empty());
    }

    #[test]
    fn registry_conflict_drops_the_sample_instead_of_panicking() {
        let registry = Arc::new(MetricRegistry::new());
        let clock = Arc::new(ManualClock::new());
        let handler = handler_with_clock(&registry, &clock);

        // Occupy the timer identity with the wrong kind.
        registry.counter(MetricId::new("service.get")).unwrap();

        let context = handler
            .pre_invocation(&Invocation::new("svc", "get", &[]))
            .unwrap();
        handler.on_success(Some(&context), &"ok");

        // Still a counter; the sample went nowhere.
        assert!(registry.timer(MetricId::new("service.get")).is_err());
    }

    static_assertions::assert_impl_all!(MetricsHandler: Send, Sync);
}
