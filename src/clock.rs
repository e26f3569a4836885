//! Wall-clock sources for time-bucketed stores.
//!
//! Stores read the current time through the [`Clock`] trait so that the
//! bucketing logic can be driven deterministically. Production code uses
//! [`SystemClock`]; [`ManualClock`] only moves when told to.

use std::fmt::{self, Debug};
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use atomic_time::AtomicSystemTime;

/// A source of wall-clock time.
pub trait Clock: Debug + Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;
}

/// The operating system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only advances when told to.
///
/// The current time lives in an [`AtomicSystemTime`], so the clock can be
/// shared between writer threads and a thread driving time forward.
///
/// # Examples
///
/// ```rust
/// use finestre::clock::{Clock, ManualClock};
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let clock = ManualClock::new(UNIX_EPOCH + Duration::from_secs(60));
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now(), UNIX_EPOCH + Duration::from_secs(65));
/// ```
pub struct ManualClock {
    now: AtomicSystemTime,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: AtomicSystemTime::new(now),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        // the closure never returns None
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.checked_add(by).unwrap_or(now))
            });
    }

    /// Sets the clock to `now`, which may be in the past.
    pub fn set(&self, now: SystemTime) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.now.load(Ordering::SeqCst)
    }
}

impl Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now())
            .finish()
    }
}

/// Truncates `time` down to a multiple of `period` since the Unix epoch.
pub(crate) fn truncate(time: SystemTime, period: Duration) -> SystemTime {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    let period_nanos = period.as_nanos();
    if period_nanos == 0 {
        return time;
    }
    let excess = saturating_nanos(since_epoch.as_nanos() % period_nanos);
    (UNIX_EPOCH + since_epoch)
        .checked_sub(excess)
        .unwrap_or(UNIX_EPOCH)
}

/// Number of whole periods elapsed between `start` and `now`.
///
/// Returns 0 when `now` precedes `start`.
pub(crate) fn periods_between(start: SystemTime, now: SystemTime, period: Duration) -> u64 {
    let elapsed = now.duration_since(start).unwrap_or_default();
    let periods = elapsed.as_nanos() / period.as_nanos().max(1);
    u64::try_from(periods).unwrap_or(u64::MAX)
}

/// Returns `start + period * index`.
pub(crate) fn window_start(start: SystemTime, period: Duration, index: u64) -> SystemTime {
    start + saturating_nanos(period.as_nanos() * u128::from(index))
}

fn saturating_nanos(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
