use std::fmt;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::ERR_POISONED_LOCK;

/// A monotonic time source, expressed as a duration since an arbitrary fixed origin.
///
/// Everything in this crate that measures elapsed time or ages a memoized snapshot reads
/// time through this trait, so tests and deterministic consumers can substitute their own
/// source via [`ManualClock`]. Timestamps from two different clock instances are not
/// comparable.
///
/// We use duration-since-origin instead of [`std::time::Instant`] because fake clocks
/// cannot fabricate `Instant` values.
pub trait Clock: fmt::Debug + Send + Sync {
    /// The current reading of the clock. Monotonically non-decreasing.
    fn now(&self) -> Duration;
}

/// The real wall clock, relative to the first moment any [`SystemClock`] was read
/// in this process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

static SYSTEM_CLOCK_ORIGIN: OnceLock<Instant> = OnceLock::new();

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SYSTEM_CLOCK_ORIGIN.get_or_init(Instant::now).elapsed()
    }
}

/// A clock that only moves when told to, for deterministic tests of duration
/// measurement and snapshot memoization.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use meterbox::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// assert_eq!(clock.now(), Duration::ZERO);
///
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now(), Duration::from_millis(250));
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a manual clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by the given amount.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect(ERR_POISONED_LOCK);
        *now = now.saturating_add(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().expect(ERR_POISONED_LOCK)
    }
}
