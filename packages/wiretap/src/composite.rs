use std::error::Error;
use std::fmt;
use std::sync::Arc;

use meterbox::{Clock, SystemClock};

use crate::panics::isolated;
use crate::{Invocation, InvocationContext, InvocationEventHandler};

/// Fans one invocation out to several handlers, keeping each handler paired with the
/// context it produced.
///
/// Per-handler contexts travel in the composite's own context, in handler order, so a
/// handler that declined (or panicked) during pre-invocation receives `None` at
/// completion while its neighbours receive their own contexts. One misbehaving handler
/// never silences the others and never affects the observed call.
///
/// Isolation extends to [`is_enabled()`][InvocationEventHandler::is_enabled]: a handler
/// that panics while answering is treated as disabled for that check rather than
/// failing the composite, so enablement probes stay as harmless as the other hooks.
pub struct CompositeHandler {
    handlers: Box<[Arc<dyn InvocationEventHandler>]>,
    clock: Arc<dyn Clock>,
}

/// The per-handler context slots, in handler order.
type ContextSlots = Vec<Option<InvocationContext>>;

impl CompositeHandler {
    /// Combines the given handlers into one, observing against the system clock.
    #[must_use]
    pub fn new(handlers: Vec<Arc<dyn InvocationEventHandler>>) -> Self {
        Self::with_clock(handlers, Arc::new(SystemClock::new()))
    }

    /// Combines the given handlers into one, using the given clock for the composite's
    /// own context timestamps.
    #[must_use]
    pub fn with_clock(handlers: Vec<Arc<dyn InvocationEventHandler>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            handlers: handlers.into_boxed_slice(),
            clock,
        }
    }

    /// How many handlers this composite fans out to.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether this composite has no handlers at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn slot<'a>(context: Option<&'a InvocationContext>, index: usize) -> Option<&'a InvocationContext> {
        context
            .and_then(InvocationContext::extension::<ContextSlots>)
            .and_then(|slots| slots.get(index))
            .and_then(Option::as_ref)
    }
}

impl InvocationEventHandler for CompositeHandler {
    fn is_enabled(&self) -> bool {
        self.handlers
            .iter()
            .any(|handler| isolated("is_enabled", || handler.is_enabled()).unwrap_or(false))
    }

    fn pre_invocation(&self, invocation: &Invocation<'_>) -> Option<InvocationContext> {
        let slots: ContextSlots = self
            .handlers
            .iter()
            .map(|handler| {
                let enabled = isolated("is_enabled", || handler.is_enabled()).unwrap_or(false);
                if !enabled {
                    return None;
                }

                isolated("pre_invocation", || handler.pre_invocation(invocation)).flatten()
            })
            .collect();

        Some(InvocationContext::new(invocation, self.clock.now()).with_extension(slots))
    }

    fn on_success(&self, context: Option<&InvocationContext>, result: &dyn fmt::Debug) {
        for (index, handler) in self.handlers.iter().enumerate() {
            let slot = Self::slot(context, index);
            isolated("on_success", || handler.on_success(slot, result));
        }
    }

    fn on_failure(&self, context: Option<&InvocationContext>, error: &(dyn Error + 'static)) {
        for (index, handler) in self.handlers.iter().enumerate() {
            let slot = Self::slot(context, index);
            isolated("on_failure", || handler.on_failure(slot, error));
        }
    }
}

impl fmt::Debug for CompositeHandler {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeHandler")
            .field("handler_count", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
