//! Immutable snapshots of completed time windows.
//!
//! A flush turns every completed bucket of a store into one ready window.
//! Windows are plain values: they are never mutated after creation and can be
//! read any number of times. Shipping each window exactly once is the
//! caller's responsibility.
//!
//! The [`Window`] trait gives uniform access to the window bounds and
//! counters of both window kinds, while [`ReadyStore`] carries either kind
//! through the [`Engine`](crate::engine::Engine).

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use crate::key::MetricKey;

/// Common accessors of a ready window.
pub trait Window {
    /// The key type of the window's counters.
    type Key: MetricKey;

    /// Returns the inclusive start of the window.
    fn start(&self) -> SystemTime;

    /// Returns the exclusive end of the window.
    fn finish(&self) -> SystemTime;

    /// Returns the counters accumulated during the window.
    fn metrics(&self) -> &HashMap<Self::Key, i64>;

    /// Returns the width of the window.
    fn period(&self) -> Duration {
        self.finish()
            .duration_since(self.start())
            .unwrap_or_default()
    }
}

/// One completed window of a [`TimeHistogram`](crate::histograms::time::TimeHistogram).
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyTimeHistogram<K: MetricKey> {
    start: SystemTime,
    finish: SystemTime,
    metrics: HashMap<K, i64>,
}

impl<K: MetricKey> ReadyTimeHistogram<K> {
    pub(crate) fn new(start: SystemTime, finish: SystemTime, metrics: HashMap<K, i64>) -> Self {
        Self {
            start,
            finish,
            metrics,
        }
    }

    /// Consumes the window and returns its counters.
    pub fn into_metrics(self) -> HashMap<K, i64> {
        self.metrics
    }

    /// Returns the sum of all counters in the window.
    pub fn total(&self) -> i64 {
        self.metrics.values().sum()
    }
}

impl<K: MetricKey> Window for ReadyTimeHistogram<K> {
    type Key = K;

    #[inline]
    fn start(&self) -> SystemTime {
        self.start
    }

    #[inline]
    fn finish(&self) -> SystemTime {
        self.finish
    }

    #[inline]
    fn metrics(&self) -> &HashMap<K, i64> {
        &self.metrics
    }
}

/// One completed window of a [`PerfHistogram`](crate::histograms::perf::PerfHistogram).
///
/// Counters are keyed by perf bucket id. Bucket 1 covers `[0, unit)` and
/// bucket `n >= 2` covers `[unit * base^(n-2), unit * base^(n-1))`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyPerfHistogram {
    histogram: ReadyTimeHistogram<u64>,
    max: f64,
    unit: f64,
    base: f64,
}

impl ReadyPerfHistogram {
    pub(crate) fn new(histogram: ReadyTimeHistogram<u64>, max: f64, unit: f64, base: f64) -> Self {
        Self {
            histogram,
            max,
            unit,
            base,
        }
    }

    /// Returns the largest raw value observed during the window.
    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns the upper bound of perf bucket 1.
    #[inline]
    pub fn unit(&self) -> f64 {
        self.unit
    }

    /// Returns the growth factor between consecutive perf buckets.
    #[inline]
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Returns the number of observations in the window.
    pub fn count(&self) -> i64 {
        self.histogram.total()
    }
}

impl Window for ReadyPerfHistogram {
    type Key = u64;

    #[inline]
    fn start(&self) -> SystemTime {
        self.histogram.start
    }

    #[inline]
    fn finish(&self) -> SystemTime {
        self.histogram.finish
    }

    #[inline]
    fn metrics(&self) -> &HashMap<u64, i64> {
        &self.histogram.metrics
    }
}

/// A ready window of either store kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyStore<K: MetricKey> {
    /// A counter window.
    Time(ReadyTimeHistogram<K>),
    /// A performance histogram window.
    Perf(ReadyPerfHistogram),
}

impl<K: MetricKey> ReadyStore<K> {
    /// Returns the inclusive start of the window.
    pub fn start(&self) -> SystemTime {
        match self {
            ReadyStore::Time(w) => w.start(),
            ReadyStore::Perf(w) => w.start(),
        }
    }

    /// Returns the exclusive end of the window.
    pub fn finish(&self) -> SystemTime {
        match self {
            ReadyStore::Time(w) => w.finish(),
            ReadyStore::Perf(w) => w.finish(),
        }
    }

    /// Returns the counter window, if this is one.
    pub fn as_time(&self) -> Option<&ReadyTimeHistogram<K>> {
        match self {
            ReadyStore::Time(w) => Some(w),
            ReadyStore::Perf(_) => None,
        }
    }

    /// Returns the performance window, if this is one.
    pub fn as_perf(&self) -> Option<&ReadyPerfHistogram> {
        match self {
            ReadyStore::Perf(w) => Some(w),
            ReadyStore::Time(_) => None,
        }
    }
}

impl<K: MetricKey> From<ReadyTimeHistogram<K>> for ReadyStore<K> {
    fn from(window: ReadyTimeHistogram<K>) -> Self {
        ReadyStore::Time(window)
    }
}

impl<K: MetricKey> From<ReadyPerfHistogram> for ReadyStore<K> {
    fn from(window: ReadyPerfHistogram) -> Self {
        ReadyStore::Perf(window)
    }
}
