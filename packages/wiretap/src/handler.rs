use std::error::Error;
use std::fmt;
use std::sync::Arc;

use meterbox::{Clock, SystemClock};
use tracing::{debug, warn};

use crate::{Invocation, InvocationContext};

/// Observes the lifecycle of intercepted calls.
///
/// A handler is asked for a context before the call runs and receives the same
/// context back exactly once, through [`on_success()`][Self::on_success] or
/// [`on_failure()`][Self::on_failure]. Returning `None` from
/// [`pre_invocation()`][Self::pre_invocation] declines the invocation; the completion
/// callback still fires, with `None`, so failure accounting does not depend on having
/// built a context.
///
/// Handlers observe; they must not affect the observed call. The dispatcher enforces
/// this by containing handler panics, but well-behaved handlers do not panic in the
/// first place.
pub trait InvocationEventHandler: Send + Sync {
    /// Whether this handler currently wants to observe anything. Checked per dispatch;
    /// a disabled handler costs one boolean check per call.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Called before the intercepted call runs. The returned context is handed back
    /// to the completion callback.
    fn pre_invocation(&self, invocation: &Invocation<'_>) -> Option<InvocationContext>;

    /// Called after the intercepted call returns a value.
    fn on_success(&self, context: Option<&InvocationContext>, result: &dyn fmt::Debug);

    /// Called after the intercepted call returns an error.
    fn on_failure(&self, context: Option<&InvocationContext>, error: &(dyn Error + 'static));
}

/// Observes nothing. Useful as a stand-in and for measuring dispatch overhead.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpHandler;

impl InvocationEventHandler for NoOpHandler {
    fn pre_invocation(&self, _invocation: &Invocation<'_>) -> Option<InvocationContext> {
        None
    }

    fn on_success(&self, _context: Option<&InvocationContext>, _result: &dyn fmt::Debug) {}

    fn on_failure(&self, _context: Option<&InvocationContext>, _error: &(dyn Error + 'static)) {}
}

/// Logs each completed call: successes at debug level, failures as warnings.
///
/// Arguments are rendered into the context up front, so the failure log can show them
/// even though the call frame is gone by then.
#[derive(Debug)]
pub struct LoggingHandler {
    clock: Arc<dyn Clock>,
}

impl LoggingHandler {
    /// Creates a handler logging against the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Creates a handler measuring elapsed time with the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn elapsed_micros(&self, context: Option<&InvocationContext>) -> Option<u128> {
        context.map(|context| {
            self.clock
                .now()
                .saturating_sub(context.start())
                .as_micros()
        })
    }
}

impl Default for LoggingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationEventHandler for LoggingHandler {
    fn pre_invocation(&self, invocation: &Invocation<'_>) -> Option<InvocationContext> {
        Some(InvocationContext::new(invocation, self.clock.now()))
    }

    fn on_success(&self, context: Option<&InvocationContext>, _result: &dyn fmt::Debug) {
        let Some(context) = context else {
            return;
        };

        debug!(
            instance = context.instance_name(),
            method = context.method(),
            elapsed_micros = self.elapsed_micros(Some(context)),
            "call succeeded"
        );
    }

    fn on_failure(&self, context: Option<&InvocationContext>, error: &(dyn Error + 'static)) {
        match context {
            Some(context) => warn!(
                instance = context.instance_name(),
                method = context.method(),
                args = ?context.args(),
                elapsed_micros = self.elapsed_micros(Some(context)),
                error = %error,
                "call failed"
            ),
            None => warn!(error = %error, "call failed"),
        }
    }
}
