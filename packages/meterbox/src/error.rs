use thiserror::Error;

use crate::{MetricId, MetricKind};

/// Errors surfaced by metric registration and instrumentation construction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A metric is already registered under this identity with a different kind.
    ///
    /// This indicates a programming or configuration error in the caller; it is never
    /// swallowed by the registry.
    #[error("metric '{id}' is already registered as a {existing}, cannot register a {offered}")]
    NameConflict {
        /// The contested identity.
        id: MetricId,

        /// Kind of the metric already in the registry.
        existing: MetricKind,

        /// Kind of the metric the caller tried to register.
        offered: MetricKind,
    },

    /// A metric exists under this identity but is of a different kind than the typed
    /// accessor expected.
    #[error("metric '{id}' is a {found}, expected a {expected}")]
    TypeMismatch {
        /// The looked-up identity.
        id: MetricId,

        /// Kind the accessor expected.
        expected: MetricKind,

        /// Kind actually found in the registry.
        found: MetricKind,
    },

    /// A name that participates in metric naming was blank.
    #[error("{what} cannot be blank")]
    BlankName {
        /// Which name was blank (e.g. "cache name").
        what: &'static str,
    },
}

/// A specialized `Result` type returning the crate's [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

/// Expect message for lock acquisition; we never poison our own locks because no code
/// panics while holding them.
pub(crate) const ERR_POISONED_LOCK: &str = "lock was poisoned by a panicking thread";

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn conflict_errors_name_both_kinds() {
        let error = Error::NameConflict {
            id: MetricId::new("x"),
            existing: MetricKind::Counter,
            offered: MetricKind::Gauge,
        };

        let message = error.to_string();
        assert!(message.contains("counter"));
        assert!(message.contains("gauge"));
    }

    #[test]
    fn mismatch_errors_name_both_kinds() {
        let error = Error::TypeMismatch {
            id: MetricId::new("x"),
            expected: MetricKind::Timer,
            found: MetricKind::Meter,
        };

        let message = error.to_string();
        assert!(message.contains("timer"));
        assert!(message.contains("meter"));
    }
}
