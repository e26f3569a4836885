//! Serializable snapshots of ready windows.
//!
//! Ready windows hold `SystemTime`s and hash maps, which are awkward to put on
//! the wire. The types in this module flatten them into Unix millisecond
//! timestamps and key-sorted entry lists, ready for any serde format.
//!
//! # Feature Flag
//!
//! This module requires the `serde` feature:
//!
//! ```toml
//! [dependencies]
//! finestre = { version = "0.1", features = ["serde"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use finestre::engine::Engine;
//! use finestre::snapshot::MetricsSnapshot;
//!
//! let engine: Engine = Engine::new();
//! // ... record metrics ...
//!
//! if let Some(ready) = engine.ready_metrics() {
//!     let snapshot = MetricsSnapshot::from_ready(&ready);
//!     let json = serde_json::to_string(&snapshot).unwrap();
//!     let bytes = bincode::serialize(&snapshot).unwrap();
//! }
//! ```

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::key::MetricKey;
use crate::ready::{ReadyPerfHistogram, ReadyStore, ReadyTimeHistogram, Window};

/// One key and its count within a window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricEntry<K> {
    /// The metric key.
    pub key: K,
    /// The accumulated count.
    pub count: i64,
}

/// A ready window flattened for serialization.
///
/// ```rust,ignore
/// {"kind":"time","start_ms":60000,"finish_ms":120000,"metrics":[{"key":"sqli","count":3}]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowSnapshot<K> {
    /// A counter window.
    Time {
        /// Window start, in milliseconds since the Unix epoch.
        start_ms: u64,
        /// Window end, in milliseconds since the Unix epoch.
        finish_ms: u64,
        /// Counters sorted by key.
        metrics: Vec<MetricEntry<K>>,
    },
    /// A performance histogram window.
    Perf {
        /// Window start, in milliseconds since the Unix epoch.
        start_ms: u64,
        /// Window end, in milliseconds since the Unix epoch.
        finish_ms: u64,
        /// Counters sorted by perf bucket id.
        metrics: Vec<MetricEntry<u64>>,
        /// Largest observation in the window.
        max: f64,
        /// Upper bound of perf bucket 1.
        unit: f64,
        /// Growth factor between perf buckets.
        base: f64,
    },
}

impl<K: MetricKey + Ord> WindowSnapshot<K> {
    /// Flattens a counter window.
    pub fn from_time(window: &ReadyTimeHistogram<K>) -> Self {
        WindowSnapshot::Time {
            start_ms: unix_ms(window.start()),
            finish_ms: unix_ms(window.finish()),
            metrics: sorted_entries(window.metrics()),
        }
    }

    /// Flattens a performance window.
    pub fn from_perf(window: &ReadyPerfHistogram) -> Self {
        WindowSnapshot::Perf {
            start_ms: unix_ms(window.start()),
            finish_ms: unix_ms(window.finish()),
            metrics: sorted_entries(window.metrics()),
            max: window.max(),
            unit: window.unit(),
            base: window.base(),
        }
    }

    /// Flattens a window of either kind.
    pub fn from_store(window: &ReadyStore<K>) -> Self {
        match window {
            ReadyStore::Time(w) => Self::from_time(w),
            ReadyStore::Perf(w) => Self::from_perf(w),
        }
    }

    /// Returns the window start in milliseconds since the Unix epoch.
    pub fn start_ms(&self) -> u64 {
        match self {
            WindowSnapshot::Time { start_ms, .. } | WindowSnapshot::Perf { start_ms, .. } => {
                *start_ms
            }
        }
    }
}

/// All windows flushed from one named store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot<K> {
    /// The store name.
    pub name: String,
    /// The store's windows, oldest first.
    pub windows: Vec<WindowSnapshot<K>>,
}

/// Everything collected by one [`Engine::ready_metrics`](crate::engine::Engine::ready_metrics) call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot<K> {
    /// Optional collection time in milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp_ms: Option<u64>,
    /// Stores sorted by name.
    pub stores: Vec<StoreSnapshot<K>>,
}

impl<K: MetricKey + Ord> MetricsSnapshot<K> {
    /// Flattens the result of `ready_metrics`.
    pub fn from_ready(ready: &HashMap<String, Vec<ReadyStore<K>>>) -> Self {
        let mut stores: Vec<_> = ready
            .iter()
            .map(|(name, windows)| StoreSnapshot {
                name: name.clone(),
                windows: windows.iter().map(WindowSnapshot::from_store).collect(),
            })
            .collect();
        stores.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            timestamp_ms: None,
            stores,
        }
    }

    /// Same as [`from_ready`](Self::from_ready), stamped with the current time.
    pub fn from_ready_with_timestamp(ready: &HashMap<String, Vec<ReadyStore<K>>>) -> Self {
        Self {
            timestamp_ms: Some(unix_ms(SystemTime::now())),
            ..Self::from_ready(ready)
        }
    }

    /// Finds a store by name.
    pub fn get(&self, name: &str) -> Option<&StoreSnapshot<K>> {
        self.stores.iter().find(|s| s.name == name)
    }
}

fn sorted_entries<K: MetricKey + Ord>(metrics: &HashMap<K, i64>) -> Vec<MetricEntry<K>> {
    let mut entries: Vec<_> = metrics
        .iter()
        .map(|(key, count)| MetricEntry {
            key: key.clone(),
            count: *count,
        })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    entries
}

/// Milliseconds since the Unix epoch, saturating at 0 for earlier times.
pub(crate) fn unix_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
