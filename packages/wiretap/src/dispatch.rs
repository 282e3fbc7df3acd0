use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use meterbox::{Clock, MetricRegistry, SystemClock};

use crate::panics::isolated;
use crate::{
    CompositeHandler, ConfigError, InstrumentAll, InstrumentationFilter,
    InstrumentationProperties, Invocation, InvocationEventHandler, LoggingHandler, MetricsHandler,
    Result,
};

/// Routes one intercepted call through the enablement check, the filter and the
/// handler, in that order, and guarantees the call itself is never affected.
///
/// The fast path is cheap on purpose: a disabled dispatcher, a disabled handler or a
/// filtered-out method all collapse to plain delegation with no allocation and no
/// formatting. Handler panics are contained and logged; the intercepted call's result
/// always reaches the caller unchanged.
pub struct InterceptionDispatcher {
    instance_name: Arc<str>,
    handler: Arc<dyn InvocationEventHandler>,
    filter: Arc<dyn InstrumentationFilter>,
    enabled: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl InterceptionDispatcher {
    /// Creates a dispatcher for the named instance, instrumenting every method and
    /// consulting the process-wide [`InstrumentationProperties`] for enablement.
    #[must_use]
    pub fn new(instance_name: &str, handler: Arc<dyn InvocationEventHandler>) -> Self {
        Self {
            instance_name: Arc::from(instance_name),
            handler,
            filter: Arc::new(InstrumentAll),
            enabled: InstrumentationProperties::global().enabled_supplier(instance_name),
        }
    }

    /// Replaces the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn InstrumentationFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Replaces the enablement supplier.
    #[must_use]
    pub fn with_enabled_supplier(mut self, enabled: Arc<dyn Fn() -> bool + Send + Sync>) -> Self {
        self.enabled = enabled;
        self
    }

    /// The name this dispatcher reports under.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    fn is_active(&self, invocation: &Invocation<'_>) -> bool {
        isolated("enabled_supplier", || (self.enabled)()).unwrap_or(false)
            && isolated("is_enabled", || self.handler.is_enabled()).unwrap_or(false)
            && isolated("filter", || self.filter.should_instrument(invocation)).unwrap_or(false)
    }

    /// Runs `call`, reporting its outcome to the handler.
    ///
    /// The result is returned to the caller exactly as `call` produced it, whatever
    /// the handler does or fails to do.
    pub fn dispatch<T, E, F>(
        &self,
        method: &'static str,
        args: &[&dyn fmt::Debug],
        call: F,
    ) -> std::result::Result<T, E>
    where
        T: fmt::Debug,
        E: Error + 'static,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let invocation = Invocation::new(&self.instance_name, method, args);

        if !self.is_active(&invocation) {
            return call();
        }

        let context =
            isolated("pre_invocation", || self.handler.pre_invocation(&invocation)).flatten();

        let result = call();

        match &result {
            Ok(value) => {
                isolated("on_success", || {
                    self.handler.on_success(context.as_ref(), value);
                });
            }
            Err(error) => {
                isolated("on_failure", || {
                    self.handler.on_failure(context.as_ref(), error);
                });
            }
        }

        result
    }

    /// Runs a call that cannot fail, reporting it as a success.
    pub fn dispatch_infallible<T, F>(&self, method: &'static str, args: &[&dyn fmt::Debug], call: F) -> T
    where
        T: fmt::Debug,
        F: FnOnce() -> T,
    {
        match self.dispatch::<T, Infallible, _>(method, args, || Ok(call())) {
            Ok(value) => value,
            Err(infallible) => match infallible {},
        }
    }
}

impl fmt::Debug for InterceptionDispatcher {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionDispatcher")
            .field("instance_name", &self.instance_name)
            .finish_non_exhaustive()
    }
}

/// A delegate paired with an optional dispatcher.
///
/// Every observed call goes through [`call()`][Self::call] or
/// [`call_infallible()`][Self::call_infallible], which delegate directly when no
/// instrumentation was configured.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use meterbox::{MetricId, MetricRegistry};
/// use wiretap::Instrumented;
///
/// #[derive(Debug)]
/// struct Doubler;
///
/// impl Doubler {
///     fn double(&self, n: u64) -> u64 {
///         n * 2
///     }
/// }
///
/// let registry = Arc::new(MetricRegistry::new());
///
/// let service = Instrumented::builder(Doubler, "doubler")
///     .with_metrics(Arc::clone(&registry))
///     .build()?;
///
/// let result = service.call_infallible("double", &[&21], |d| d.double(21));
/// assert_eq!(result, 42);
///
/// let timer = registry.timer(MetricId::new("doubler.double")).unwrap();
/// assert_eq!(timer.count(), 1);
/// # Ok::<(), wiretap::ConfigError>(())
/// ```
pub struct Instrumented<T> {
    delegate: T,
    dispatcher: Option<InterceptionDispatcher>,
}

impl<T> Instrumented<T> {
    /// Starts building instrumentation around `delegate`, registered under `name`.
    #[must_use]
    pub fn builder(delegate: T, name: &str) -> InstrumentationBuilder<T> {
        InstrumentationBuilder::new(delegate, name)
    }

    /// Wraps `delegate` with no instrumentation at all; every call is plain
    /// delegation.
    #[must_use]
    pub fn uninstrumented(delegate: T) -> Self {
        Self {
            delegate,
            dispatcher: None,
        }
    }

    /// Runs a fallible call against the delegate, reporting its outcome.
    pub fn call<R, E, F>(
        &self,
        method: &'static str,
        args: &[&dyn fmt::Debug],
        f: F,
    ) -> std::result::Result<R, E>
    where
        R: fmt::Debug,
        E: Error + 'static,
        F: FnOnce(&T) -> std::result::Result<R, E>,
    {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(method, args, || f(&self.delegate)),
            None => f(&self.delegate),
        }
    }

    /// Runs an infallible call against the delegate, reporting it as a success.
    pub fn call_infallible<R, F>(&self, method: &'static str, args: &[&dyn fmt::Debug], f: F) -> R
    where
        R: fmt::Debug,
        F: FnOnce(&T) -> R,
    {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch_infallible(method, args, || f(&self.delegate)),
            None => f(&self.delegate),
        }
    }

    /// The wrapped delegate.
    pub fn delegate(&self) -> &T {
        &self.delegate
    }

    /// Unwraps the delegate, discarding the instrumentation.
    pub fn into_inner(self) -> T {
        self.delegate
    }

    /// Whether any instrumentation is attached.
    #[must_use]
    pub fn is_instrumented(&self) -> bool {
        self.dispatcher.is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for Instrumented<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumented")
            .field("delegate", &self.delegate)
            .field("instrumented", &self.dispatcher.is_some())
            .finish()
    }
}

impl<T: fmt::Display> fmt::Display for Instrumented<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.delegate.fmt(f)
    }
}

/// Assembles an [`Instrumented`] instance: which handlers observe, which methods are
/// filtered and where enablement comes from.
///
/// With no handlers configured, [`build()`][Self::build] produces an uninstrumented
/// wrapper whose calls are plain delegation.
pub struct InstrumentationBuilder<T> {
    delegate: T,
    name: String,
    handlers: Vec<Arc<dyn InvocationEventHandler>>,
    metrics_registry: Option<Arc<MetricRegistry>>,
    logging: bool,
    filter: Arc<dyn InstrumentationFilter>,
    clock: Arc<dyn Clock>,
    properties: Arc<InstrumentationProperties>,
}

impl<T> InstrumentationBuilder<T> {
    fn new(delegate: T, name: &str) -> Self {
        Self {
            delegate,
            name: name.to_owned(),
            handlers: Vec::new(),
            metrics_registry: None,
            logging: false,
            filter: Arc::new(InstrumentAll),
            clock: Arc::new(SystemClock::new()),
            properties: Arc::clone(InstrumentationProperties::global()),
        }
    }

    /// Adds a custom handler. May be called repeatedly; handlers observe in the order
    /// they were added.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn InvocationEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Adds metric reporting into `registry`, with the instance name as the metric
    /// prefix.
    #[must_use]
    pub fn with_metrics(mut self, registry: Arc<MetricRegistry>) -> Self {
        self.metrics_registry = Some(registry);
        self
    }

    /// Adds per-call logging.
    #[must_use]
    pub fn with_logging(mut self) -> Self {
        self.logging = true;
        self
    }

    /// Replaces the filter deciding which methods are observed.
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn InstrumentationFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Replaces the clock used by the built-in handlers.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Consults the given properties for enablement instead of the process-wide ones.
    #[must_use]
    pub fn with_properties(mut self, properties: Arc<InstrumentationProperties>) -> Self {
        self.properties = properties;
        self
    }

    /// Builds the instrumented instance.
    ///
    /// # Errors
    ///
    /// [`ConfigError::BlankName`] when the instance name is empty or whitespace.
    pub fn build(self) -> Result<Instrumented<T>> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::BlankName {
                what: "instance name",
            });
        }

        let mut handlers = self.handlers;

        if let Some(registry) = self.metrics_registry {
            handlers.push(Arc::new(MetricsHandler::new(
                registry,
                &self.name,
                Arc::clone(&self.clock),
            )?));
        }

        if self.logging {
            handlers.push(Arc::new(LoggingHandler::with_clock(Arc::clone(&self.clock))));
        }

        let handler: Arc<dyn InvocationEventHandler> = match handlers.len() {
            0 => {
                return Ok(Instrumented {
                    delegate: self.delegate,
                    dispatcher: None,
                });
            }
            1 => handlers.remove(0),
            _ => Arc::new(CompositeHandler::with_clock(handlers, Arc::clone(&self.clock))),
        };

        let dispatcher = InterceptionDispatcher::new(&self.name, handler)
            .with_filter(self.filter)
            .with_enabled_supplier(self.properties.enabled_supplier(&self.name));

        Ok(Instrumented {
            delegate: self.delegate,
            dispatcher: Some(dispatcher),
        })
    }
}

impl<T> fmt::Debug for InstrumentationBuilder<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentationBuilder")
            .field("name", &self.name)
            .field("handler_count", &self.handlers.len())
            .field("metrics", &self.metrics_registry.is_some())
            .field("logging", &self.logging)
            .finish_non_exhaustive()
    }
}
