use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::warn;

/// Runs one observer callback, converting a panic into a logged warning.
///
/// Observers must never break the observed call, so their panics are contained here
/// and the dispatcher carries on as if the observer had declined to participate.
pub(crate) fn isolated<T>(observer: &'static str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(panic) => {
            warn!(
                observer,
                panic = panic_message(panic.as_ref()),
                "instrumentation observer panicked; continuing without it"
            );
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
