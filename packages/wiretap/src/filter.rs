use crate::Invocation;

/// Decides per invocation whether the handler pipeline runs at all.
///
/// The filter is consulted before any handler work happens, so a selective filter
/// keeps excluded methods at plain delegation cost.
pub trait InstrumentationFilter: Send + Sync {
    /// Whether this invocation should be observed by the handlers.
    fn should_instrument(&self, invocation: &Invocation<'_>) -> bool;
}

/// Instruments every invocation. The default filter.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstrumentAll;

impl InstrumentationFilter for InstrumentAll {
    fn should_instrument(&self, _invocation: &Invocation<'_>) -> bool {
        true
    }
}

/// Instruments nothing; every call is plain delegation.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstrumentNone;

impl InstrumentationFilter for InstrumentNone {
    fn should_instrument(&self, _invocation: &Invocation<'_>) -> bool {
        false
    }
}

/// Any `Fn(&Invocation) -> bool` closure is a filter.
impl<F> InstrumentationFilter for F
where
    F: Fn(&Invocation<'_>) -> bool + Send + Sync,
{
    fn should_instrument(&self, invocation: &Invocation<'_>) -> bool {
        self(invocation)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn builtin_filters_are_constant() {
        let invocation = Invocation::new("svc", "get", &[]);

        assert!(InstrumentAll.should_instrument(&invocation));
        assert!(!InstrumentNone.should_instrument(&invocation));
    }

    #[test]
    fn closures_filter_by_invocation() {
        let only_writes = |invocation: &Invocation<'_>| invocation.method().starts_with("put");

        assert!(only_writes.should_instrument(&Invocation::new("svc", "put_record", &[])));
        assert!(!only_writes.should_instrument(&Invocation::new("svc", "get_record", &[])));
    }

    static_assertions::assert_impl_all!(InstrumentAll: Send, Sync);
    static_assertions::assert_impl_all!(InstrumentNone: Send, Sync);
}
