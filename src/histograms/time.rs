//! Bounded key/value counter store partitioned into time windows.
//!
//! This module provides [`TimeHistogram`], the counter store every other
//! store kind is built on. Many writer threads call
//! [`add`](TimeHistogram::add) concurrently; a single reader periodically
//! calls [`ready`](TimeHistogram::ready) and [`flush`](TimeHistogram::flush)
//! to collect completed windows.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::clock::{self, Clock, SystemClock};
use crate::error::{MetricsError, Result};
use crate::histograms::{Detached, Generation, DEFAULT_MAX_STORE_LENGTH};
use crate::key::{Key, MetricKey, Value};
use crate::ready::ReadyTimeHistogram;

/// A time-windowed, cardinality-bounded counter map.
///
/// Each key's counter lives in the bucket of the window the write happened
/// in. A window becomes *ready* once it lies entirely in the past, and is
/// handed out exactly once by [`flush`](Self::flush). The window that is
/// still in progress is never flushed: it is carried over, untouched, into
/// the next generation.
///
/// # Algorithm
///
/// - The bucket index of a write is `floor((now - start) / period)`, where
///   `start` is fixed by the first write of a generation and read lock-free
///   afterwards.
/// - Updating a key that already exists in its bucket never takes an
///   exclusive lock: the flush lock is held shared and the counter is bumped
///   with an atomic add.
/// - A new key reserves one of the bucket's `max_length` slots with a CAS;
///   once the bucket is full new keys are rejected with
///   [`MaxStoreLengthError`](crate::error::MaxStoreLengthError), while
///   existing keys remain updatable.
///
/// # Examples
///
/// ```rust
/// use finestre::clock::ManualClock;
/// use finestre::histograms::time::TimeHistogram;
/// use finestre::ready::Window;
/// use std::sync::Arc;
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let clock = Arc::new(ManualClock::new(UNIX_EPOCH + Duration::from_secs(600)));
/// let hits = TimeHistogram::new(Duration::from_secs(60))
///     .unwrap()
///     .with_clock(clock.clone());
///
/// hits.add("sql_injection", 1).unwrap();
/// hits.add("sql_injection", 2).unwrap();
/// assert!(!hits.ready());
///
/// clock.advance(Duration::from_secs(60));
/// assert!(hits.ready());
///
/// let windows = hits.flush();
/// assert_eq!(windows.len(), 1);
/// assert_eq!(windows[0].metrics()["sql_injection"], 3);
/// assert_eq!(windows[0].finish() - Duration::from_secs(60), windows[0].start());
/// ```
#[derive(Debug)]
pub struct TimeHistogram<K: MetricKey> {
    period: Duration,
    max_len: usize,
    clock: Arc<dyn Clock>,
    generation: RwLock<Generation<K>>,
}

impl<K: MetricKey> TimeHistogram<K> {
    /// Creates an empty store with windows `period` wide.
    ///
    /// The store reads the system clock and allows
    /// [`DEFAULT_MAX_STORE_LENGTH`] distinct keys per window.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidPeriod`] if `period` is zero.
    pub fn new(period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(MetricsError::InvalidPeriod);
        }
        Ok(TimeHistogram {
            period,
            max_len: DEFAULT_MAX_STORE_LENGTH,
            clock: Arc::new(SystemClock),
            generation: RwLock::new(Generation::new()),
        })
    }

    /// Sets the maximum number of distinct keys per window.
    ///
    /// The bound is at least 1: the first write of a window fixes the
    /// window, so it must always be accepted.
    pub fn with_max_length(self, max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
            ..self
        }
    }

    /// Sets the clock used to place writes into windows.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    /// Returns the width of a window.
    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns the maximum number of distinct keys per window.
    #[inline]
    pub fn max_length(&self) -> usize {
        self.max_len
    }

    /// Adds `delta` to `key`'s counter in the current window.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::MaxStoreLength`] if `key` is new to the current
    /// window and the window already holds `max_length` keys. The observation
    /// is dropped; existing keys are unaffected.
    #[inline]
    pub fn add(&self, key: K, delta: i64) -> Result<()> {
        self.record(key, delta, None)
    }

    /// Returns `true` if at least one window has fully elapsed since the
    /// oldest unflushed write.
    ///
    /// Only takes the flush lock in shared mode, so it never blocks writers.
    pub fn ready(&self) -> bool {
        let generation = self.generation.read();
        match generation.start.get() {
            Some(start) => clock::periods_between(*start, self.clock.now(), self.period) >= 1,
            None => false,
        }
    }

    /// Returns `true` if the store holds no unflushed writes.
    pub fn is_empty(&self) -> bool {
        self.generation.read().buckets.is_empty()
    }

    /// Detaches every completed window and returns them in ascending order.
    ///
    /// The window containing "now", if it has data, stays in the store and
    /// becomes the first window of the next generation. Flushing a store with
    /// no completed window returns an empty vector.
    ///
    /// Only one thread should flush a given store at a time; concurrent
    /// [`add`](Self::add) calls are always safe.
    pub fn flush(&self) -> Vec<ReadyTimeHistogram<K>> {
        self.flush_detached()
            .into_iter()
            .map(|detached| {
                ReadyTimeHistogram::new(detached.start, detached.finish, detached.bucket.metrics())
            })
            .collect()
    }

    /// Records a write, optionally raising the window's peak.
    pub(crate) fn record(&self, key: K, delta: i64, peak: Option<f64>) -> Result<()> {
        let now = self.clock.now();
        let generation = self.generation.read();
        let start = generation.start_or_init(now, self.period);
        let index = clock::periods_between(start, now, self.period);

        generation.with_bucket(index, |bucket| {
            if let Some(value) = peak {
                bucket.observe_peak(value);
            }
            bucket.add(key, delta, self.max_len).map_err(|err| {
                trace!(max_len = err.max_len, index, "rejected new metric key");
                MetricsError::from(err)
            })
        })
    }

    /// Swaps out the current generation and returns its completed buckets.
    pub(crate) fn flush_detached(&self) -> Vec<Detached<K>> {
        let (start, buckets, carried) = {
            let mut generation = self.generation.write();
            let Some(start) = generation.start.get().copied() else {
                return Vec::new();
            };
            // read under the lock: no writer can still hold a later "now"
            let now = self.clock.now();
            let current = clock::periods_between(start, now, self.period);
            let next = clock::window_start(start, self.period, current);
            let old = std::mem::replace(&mut *generation, Generation::after(next));

            let carried = match old.buckets.remove(&current) {
                Some((_, bucket)) => {
                    generation.start.get_or_init(|| next);
                    generation.buckets.insert(0, bucket);
                    true
                }
                None => false,
            };
            (start, old.buckets, carried)
        };

        let mut detached: Vec<_> = buckets
            .into_iter()
            .map(|(index, bucket)| {
                let window_start = clock::window_start(start, self.period, index);
                Detached {
                    start: window_start,
                    finish: window_start + self.period,
                    bucket,
                }
            })
            .collect();
        detached.sort_by_key(|d| d.start);

        debug!(
            windows = detached.len(),
            carried,
            period_ms = self.period.as_millis() as u64,
            "flushed time histogram"
        );
        detached
    }

    /// Returns the start of the oldest unflushed window, if any.
    pub fn start(&self) -> Option<SystemTime> {
        self.generation.read().start.get().copied()
    }
}

impl TimeHistogram<Key> {
    /// Adds `delta` to a dynamically typed key.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidKey`] if `key` is nil or not comparable,
    /// and otherwise the same errors as [`add`](Self::add).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use finestre::histograms::time::TimeHistogram;
    /// use finestre::key::{Key, Value};
    /// use std::time::Duration;
    ///
    /// let hist: TimeHistogram<Key> = TimeHistogram::new(Duration::from_secs(60)).unwrap();
    /// assert!(hist.add_value(&Value::from("xss"), 1).is_ok());
    /// assert!(hist.add_value(&Value::Nil, 1).is_err());
    /// ```
    pub fn add_value(&self, key: &Value, delta: i64) -> Result<()> {
        self.add(Key::try_from(key)?, delta)
    }
}
