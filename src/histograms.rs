//! Time-bucketed metric stores and their shared bucket infrastructure.
//!
//! Both store kinds split the timeline into fixed-width windows (the store's
//! *period*). The first accepted write fixes the store's `start`, truncated
//! to the period, and every later write lands in the bucket
//! `floor((now - start) / period)`. All buckets sharing one `start` form a
//! *generation*, which [`flush`](time::TimeHistogram::flush) swaps out
//! wholesale.
//!
//! # Architecture
//!
//! ```text
//!                    ┌───────────────────────────────────────────┐
//!                    │  RwLock<Generation>       (flush lock)    │
//!                    │  ├─ start: OnceLock<SystemTime>           │
//!   Writer ──read──► │  └─ buckets: DashMap<u64, Bucket>         │
//!   Writer ──read──► │       [0] len │ DashMap<K, AtomicI64> │ peak│
//!   Writer ──read──► │       [1] len │ DashMap<K, AtomicI64> │ peak│
//!                    └───────────────────────────────────────────┘
//!                                         ▲
//!   Reader ──write (swap generation)──────┘
//! ```
//!
//! Writers only ever take the flush lock in shared mode. Updating an existing
//! key is a shard read lock plus one `fetch_add`; inserting a new key takes
//! the key's shard write lock and reserves a cardinality slot with a CAS.
//! The reader takes the flush lock exclusively just long enough to swap the
//! generation and carry the in-progress bucket over, then builds the ready
//! windows with no lock held.

pub mod perf;
pub mod time;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use crossbeam_utils::CachePadded;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clock;
use crate::error::MaxStoreLengthError;
use crate::key::MetricKey;

/// Default maximum number of distinct keys per time bucket.
pub const DEFAULT_MAX_STORE_LENGTH: usize = 10_000;

/// Bit pattern marking a peak cell that has not observed anything yet.
///
/// `u64::MAX` decodes to a NaN, and NaN observations are rejected before they
/// reach a bucket, so no real observation can collide with it.
const PEAK_UNSET: u64 = u64::MAX;

/// One time bucket: bounded key→counter map plus a peak cell.
#[derive(Debug)]
pub(crate) struct Bucket<K: MetricKey> {
    len: CachePadded<AtomicUsize>,
    values: DashMap<K, AtomicI64>,
    peak: CachePadded<AtomicU64>,
}

impl<K: MetricKey> Bucket<K> {
    pub(crate) fn new() -> Self {
        Bucket {
            len: CachePadded::new(AtomicUsize::new(0)),
            values: DashMap::new(),
            peak: CachePadded::new(AtomicU64::new(PEAK_UNSET)),
        }
    }

    /// Adds `delta` to `key`, inserting it if the bucket still has room.
    #[inline]
    pub(crate) fn add(&self, key: K, delta: i64, max_len: usize) -> Result<(), MaxStoreLengthError> {
        if let Some(counter) = self.values.get(&key) {
            counter.fetch_add(delta, Ordering::Relaxed);
            return Ok(());
        }
        self.insert(key, delta, max_len)
    }

    #[cold]
    fn insert(&self, key: K, delta: i64, max_len: usize) -> Result<(), MaxStoreLengthError> {
        match self.values.entry(key) {
            Entry::Occupied(entry) => {
                entry.get().fetch_add(delta, Ordering::Relaxed);
                Ok(())
            }
            Entry::Vacant(entry) => {
                self.len
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| {
                        (len < max_len).then_some(len + 1)
                    })
                    .map_err(|_| MaxStoreLengthError { max_len })?;
                entry.insert(AtomicI64::new(delta));
                Ok(())
            }
        }
    }

    /// Raises the bucket's peak to `value` if it is larger.
    ///
    /// The first observation publishes its bit pattern with a single CAS
    /// against the unset marker. Everyone else, including the loser of that
    /// first race, runs the optimistic retry loop.
    #[inline]
    pub(crate) fn observe_peak(&self, value: f64) {
        let bits = value.to_bits();
        let mut current = match self.peak.compare_exchange(
            PEAK_UNSET,
            bits,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return,
            Err(actual) => actual,
        };
        while value > f64::from_bits(current) {
            match self.peak.compare_exchange_weak(
                current,
                bits,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns the largest observed value, if any.
    pub(crate) fn peak(&self) -> Option<f64> {
        match self.peak.load(Ordering::Acquire) {
            PEAK_UNSET => None,
            bits => Some(f64::from_bits(bits)),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Copies the counters out of a detached bucket.
    pub(crate) fn metrics(&self) -> HashMap<K, i64> {
        self.values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Acquire)))
            .collect()
    }
}

/// All buckets sharing one `start`.
#[derive(Debug)]
pub(crate) struct Generation<K: MetricKey> {
    start: OnceLock<SystemTime>,
    floor: Option<SystemTime>,
    buckets: DashMap<u64, Bucket<K>>,
}

impl<K: MetricKey> Generation<K> {
    pub(crate) fn new() -> Self {
        Generation {
            start: OnceLock::new(),
            floor: None,
            buckets: DashMap::new(),
        }
    }

    /// A generation that may not start before `floor`.
    ///
    /// Windows before `floor` have already been flushed; a writer that read
    /// its clock before the flush lands in the window at `floor` instead.
    pub(crate) fn after(floor: SystemTime) -> Self {
        Generation {
            floor: Some(floor),
            ..Self::new()
        }
    }

    /// Returns the generation's start, fixing it from `now` on first use.
    #[inline]
    pub(crate) fn start_or_init(&self, now: SystemTime, period: Duration) -> SystemTime {
        *self.start.get_or_init(|| {
            let start = clock::truncate(now, period);
            self.floor.map_or(start, |floor| start.max(floor))
        })
    }

    /// Runs `f` against bucket `index`, creating the bucket on first use.
    #[inline]
    pub(crate) fn with_bucket<R>(&self, index: u64, f: impl FnOnce(&Bucket<K>) -> R) -> R {
        if let Some(bucket) = self.buckets.get(&index) {
            return f(bucket.value());
        }
        let bucket = self.buckets.entry(index).or_insert_with(Bucket::new).downgrade();
        f(bucket.value())
    }
}

/// A bucket detached by a flush, with its window already computed.
#[derive(Debug)]
pub(crate) struct Detached<K: MetricKey> {
    pub(crate) start: SystemTime,
    pub(crate) finish: SystemTime,
    pub(crate) bucket: Bucket<K>,
}
