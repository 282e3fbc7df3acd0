use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A borrowed description of one intercepted call, assembled on the stack at the
/// dispatch site and handed to filters and handlers by reference.
///
/// Nothing is allocated or formatted to build one of these; argument rendering only
/// happens if a handler decides to snapshot the invocation into an
/// [`InvocationContext`].
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    instance_name: &'a str,
    method: &'static str,
    args: &'a [&'a dyn fmt::Debug],
}

impl<'a> Invocation<'a> {
    /// Describes a call of `method` on the named instrumented instance.
    #[must_use]
    pub fn new(instance_name: &'a str, method: &'static str, args: &'a [&'a dyn fmt::Debug]) -> Self {
        Self {
            instance_name,
            method,
            args,
        }
    }

    /// The name the instrumented instance was registered under.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        self.instance_name
    }

    /// The intercepted method name.
    #[must_use]
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The call arguments, as opaque debuggable values.
    #[must_use]
    pub fn args(&self) -> &[&dyn fmt::Debug] {
        self.args
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("instance_name", &self.instance_name)
            .field("method", &self.method)
            .field("arg_count", &self.args.len())
            .finish()
    }
}

/// An owned snapshot of one intercepted call, produced by a handler before the call
/// runs and handed back to the same handler when the call finishes.
///
/// The snapshot owns rendered copies of the arguments so it can outlive the call
/// frame. A handler may stash arbitrary state for its completion callback in the
/// extension slot; the slot travels through the dispatcher untouched.
pub struct InvocationContext {
    instance_name: Arc<str>,
    method: &'static str,
    args: Box<[String]>,
    start: Duration,
    extension: Option<Box<dyn Any + Send>>,
}

impl InvocationContext {
    /// Snapshots an invocation, rendering each argument with its `Debug`
    /// implementation and recording `start` as the moment interception began.
    #[must_use]
    pub fn new(invocation: &Invocation<'_>, start: Duration) -> Self {
        Self {
            instance_name: Arc::from(invocation.instance_name()),
            method: invocation.method(),
            args: invocation
                .args()
                .iter()
                .map(|arg| format!("{arg:?}"))
                .collect(),
            start,
            extension: None,
        }
    }

    /// Attaches handler-private state to carry to the completion callback.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Any + Send) -> Self {
        self.extension = Some(Box::new(extension));
        self
    }

    /// The name the instrumented instance was registered under.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// The intercepted method name.
    #[must_use]
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The rendered call arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The clock reading at the moment interception began, from the clock of the
    /// handler that created this context.
    #[must_use]
    pub fn start(&self) -> Duration {
        self.start
    }

    /// The handler-private state, when present and of the expected type.
    #[must_use]
    pub fn extension<T: Any>(&self) -> Option<&T> {
        self.extension.as_ref()?.downcast_ref()
    }
}

impl fmt::Debug for InvocationContext {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("instance_name", &self.instance_name)
            .field("method", &self.method)
            .field("args", &self.args)
            .field("start", &self.start)
            .field("has_extension", &self.extension.is_some())
            .finish()
    }
}
