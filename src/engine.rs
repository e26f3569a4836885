//! Name-indexed registry of metric stores.
//!
//! Call sites obtain their store from an [`Engine`] by name instead of
//! sharing store handles explicitly. Stores are created lazily on first use
//! and live as long as the engine; asking again for the same name returns
//! the very same store.
//!
//! # Example
//!
//! ```rust
//! use finestre::engine::Engine;
//! use finestre::key::Key;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine: Engine = Engine::new();
//!
//! let hits = engine.time_histogram("rule_hits", Duration::from_secs(60)).unwrap();
//! hits.add(Key::from("sqli"), 1).unwrap();
//!
//! let again = engine.time_histogram("rule_hits", Duration::from_secs(60)).unwrap();
//! assert!(Arc::ptr_eq(&hits, &again));
//!
//! // nothing has been running for a full minute yet
//! assert!(engine.ready_metrics().is_none());
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{MetricsError, Result};
use crate::histograms::perf::PerfHistogram;
use crate::histograms::time::TimeHistogram;
use crate::histograms::DEFAULT_MAX_STORE_LENGTH;
use crate::key::{Key, MetricKey};
use crate::ready::ReadyStore;

/// Settings applied to every store the engine creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Maximum number of distinct keys per time window of each store (at least 1).
    pub max_store_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_store_length: DEFAULT_MAX_STORE_LENGTH,
        }
    }
}

/// A registered store of either kind.
#[derive(Debug)]
pub enum Store<K: MetricKey> {
    /// A counter store.
    Time(Arc<TimeHistogram<K>>),
    /// A performance histogram.
    Perf(Arc<PerfHistogram>),
}

impl<K: MetricKey> Clone for Store<K> {
    fn clone(&self) -> Self {
        match self {
            Store::Time(h) => Store::Time(Arc::clone(h)),
            Store::Perf(h) => Store::Perf(Arc::clone(h)),
        }
    }
}

impl<K: MetricKey> Store<K> {
    /// Returns `"time"` or `"perf"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Store::Time(_) => "time",
            Store::Perf(_) => "perf",
        }
    }

    /// Returns `true` if the store holds at least one completed window.
    pub fn ready(&self) -> bool {
        match self {
            Store::Time(h) => h.ready(),
            Store::Perf(h) => h.ready(),
        }
    }

    /// Flushes the store, wrapping each window in a [`ReadyStore`].
    pub fn flush(&self) -> Vec<ReadyStore<K>> {
        match self {
            Store::Time(h) => h.flush().into_iter().map(ReadyStore::from).collect(),
            Store::Perf(h) => h.flush().into_iter().map(ReadyStore::from).collect(),
        }
    }

    fn as_time(&self, name: &str) -> Result<Arc<TimeHistogram<K>>> {
        match self {
            Store::Time(h) => Ok(Arc::clone(h)),
            other => Err(mismatch(name, "time", other.kind())),
        }
    }

    fn as_perf(&self, name: &str) -> Result<Arc<PerfHistogram>> {
        match self {
            Store::Perf(h) => Ok(Arc::clone(h)),
            other => Err(mismatch(name, "perf", other.kind())),
        }
    }
}

fn mismatch(name: &str, expected: &'static str, found: &'static str) -> MetricsError {
    MetricsError::StoreKindMismatch {
        name: name.to_string(),
        expected,
        found,
    }
}

/// A registry of named metric stores.
///
/// The engine is an ordinary value: build one at startup and share it by
/// reference (or `Arc`) with every call site that records metrics and with
/// the single task that ships ready windows.
///
/// Lookups of existing stores only take the registry lock in shared mode, so
/// call sites using different stores never serialize against each other.
/// Creation uses double-checked locking: a shared lookup first, then an
/// exclusive re-check before the store is built.
#[derive(Debug)]
pub struct Engine<K: MetricKey = Key> {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    stores: RwLock<HashMap<String, Store<K>>>,
}

impl<K: MetricKey> Engine<K> {
    /// Creates an empty engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an empty engine with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Engine {
            config,
            clock: Arc::new(SystemClock),
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the clock handed to every store created afterwards.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the counter store named `name`, creating it if needed.
    ///
    /// `period` is only used when the store is created; an existing store
    /// keeps its original period.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::StoreKindMismatch`] if `name` is registered as
    /// a performance histogram, and [`MetricsError::InvalidPeriod`] if a new
    /// store would have a zero period.
    pub fn time_histogram(&self, name: &str, period: Duration) -> Result<Arc<TimeHistogram<K>>> {
        if let Some(store) = self.stores.read().get(name) {
            return store.as_time(name);
        }

        let mut stores = self.stores.write();
        match stores.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.get().as_time(name),
            Entry::Vacant(entry) => {
                let histogram = Arc::new(
                    TimeHistogram::new(period)?
                        .with_max_length(self.config.max_store_length)
                        .with_clock(Arc::clone(&self.clock)),
                );
                entry.insert(Store::Time(Arc::clone(&histogram)));
                debug!(store = name, period_ms = period.as_millis() as u64, "created time histogram");
                Ok(histogram)
            }
        }
    }

    /// Returns the performance histogram named `name`, creating it if needed.
    ///
    /// `unit`, `base` and `period` are only used when the histogram is
    /// created.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidHistogram`] or
    /// [`MetricsError::InvalidPeriod`] if a new histogram would be invalid
    /// (nothing is registered in that case), and
    /// [`MetricsError::StoreKindMismatch`] if `name` is registered as a
    /// counter store.
    pub fn perf_histogram(
        &self,
        name: &str,
        unit: f64,
        base: f64,
        period: Duration,
    ) -> Result<Arc<PerfHistogram>> {
        if let Some(store) = self.stores.read().get(name) {
            return store.as_perf(name);
        }

        let mut stores = self.stores.write();
        match stores.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.get().as_perf(name),
            Entry::Vacant(entry) => {
                let histogram = Arc::new(
                    PerfHistogram::new(period, unit, base)?
                        .with_max_length(self.config.max_store_length)
                        .with_clock(Arc::clone(&self.clock)),
                );
                entry.insert(Store::Perf(Arc::clone(&histogram)));
                debug!(
                    store = name,
                    unit,
                    base,
                    period_ms = period.as_millis() as u64,
                    "created perf histogram"
                );
                Ok(histogram)
            }
        }
    }

    /// Returns the store registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Store<K>> {
        self.stores.read().get(name).cloned()
    }

    /// Returns the names of all registered stores, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    /// Returns `true` if no store has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.stores.read().is_empty()
    }

    /// Flushes every ready store and returns its windows by store name.
    ///
    /// Returns `None` when no store had a completed window, so callers can
    /// skip shipping cheaply. Every completed window of a store is returned,
    /// oldest first. Only one thread should call this at a time.
    pub fn ready_metrics(&self) -> Option<HashMap<String, Vec<ReadyStore<K>>>> {
        // flush without holding the registry lock
        let stores: Vec<(String, Store<K>)> = self
            .stores
            .read()
            .iter()
            .map(|(name, store)| (name.clone(), store.clone()))
            .collect();

        let ready: HashMap<_, _> = stores
            .into_iter()
            .filter(|(_, store)| store.ready())
            .filter_map(|(name, store)| {
                let windows = store.flush();
                (!windows.is_empty()).then_some((name, windows))
            })
            .collect();

        if ready.is_empty() {
            return None;
        }
        debug!(stores = ready.len(), "collected ready metrics");
        Some(ready)
    }
}

impl<K: MetricKey> Default for Engine<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ready::Window;
    use std::thread;
    use std::time::{SystemTime, UNIX_EPOCH};

    const PERIOD: Duration = Duration::from_secs(10);

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn engine(clock: &Arc<ManualClock>) -> Engine {
        Engine::new().with_clock(clock.clone())
    }

    #[test]
    fn test_default_config() {
        let engine: Engine = Engine::default();
        assert_eq!(engine.config().max_store_length, DEFAULT_MAX_STORE_LENGTH);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_time_histogram_is_idempotent() {
        let engine: Engine = Engine::new();
        let a = engine.time_histogram("x", PERIOD).unwrap();
        let b = engine.time_histogram("x", Duration::from_secs(99)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.period(), PERIOD);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_different_names_are_distinct() {
        let engine: Engine = Engine::new();
        let a = engine.time_histogram("a", PERIOD).unwrap();
        let b = engine.time_histogram("b", PERIOD).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(engine.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_concurrent_creation_returns_same_store() {
        let engine: Arc<Engine> = Arc::new(Engine::new());
        let mut handles = vec![];

        for _ in 0..16 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                engine.time_histogram("x", PERIOD).unwrap()
            }));
        }

        let stores: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for store in &stores[1..] {
            assert!(Arc::ptr_eq(&stores[0], store));
        }
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_kind_mismatch() {
        let engine: Engine = Engine::new();
        engine.perf_histogram("latency", 1.0, 2.0, PERIOD).unwrap();
        assert_eq!(
            engine.time_histogram("latency", PERIOD).unwrap_err(),
            MetricsError::StoreKindMismatch {
                name: "latency".to_string(),
                expected: "time",
                found: "perf",
            }
        );

        engine.time_histogram("hits", PERIOD).unwrap();
        assert!(matches!(
            engine.perf_histogram("hits", 1.0, 2.0, PERIOD),
            Err(MetricsError::StoreKindMismatch { found: "time", .. })
        ));
    }

    #[test]
    fn test_invalid_perf_histogram_is_not_registered() {
        let engine: Engine = Engine::new();
        assert!(matches!(
            engine.perf_histogram("latency", 2.0, 1.0, PERIOD),
            Err(MetricsError::InvalidHistogram { .. })
        ));
        assert!(engine.get("latency").is_none());
        assert!(engine.perf_histogram("latency", 1.0, 2.0, PERIOD).is_ok());
    }

    #[test]
    fn test_perf_histogram_is_idempotent() {
        let engine: Engine = Engine::new();
        let a = engine.perf_histogram("latency", 1.0, 2.0, PERIOD).unwrap();
        let b = engine.perf_histogram("latency", 5.0, 3.0, PERIOD).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.unit(), 1.0);
        assert_eq!(b.base(), 2.0);
        assert_eq!(engine.get("latency").unwrap().kind(), "perf");
    }

    #[test]
    fn test_config_applies_to_new_stores() {
        let engine: Engine = Engine::with_config(EngineConfig {
            max_store_length: 2,
        });
        let hits = engine.time_histogram("hits", PERIOD).unwrap();
        assert_eq!(hits.max_length(), 2);
        hits.add(Key::from("a"), 1).unwrap();
        hits.add(Key::from("b"), 1).unwrap();
        assert!(matches!(
            hits.add(Key::from("c"), 1),
            Err(MetricsError::MaxStoreLength(_))
        ));
    }

    #[test]
    fn test_zero_max_store_length_never_yields_empty_windows() {
        let clock = Arc::new(ManualClock::new(at(1000)));
        let engine: Engine = Engine::with_config(EngineConfig {
            max_store_length: 0,
        })
        .with_clock(clock.clone());
        let hits = engine.time_histogram("hits", PERIOD).unwrap();
        assert_eq!(hits.max_length(), 1);
        hits.add(Key::from("a"), 1).unwrap();
        assert!(hits.add(Key::from("b"), 1).is_err());
        clock.advance(PERIOD);

        let ready = engine.ready_metrics().unwrap();
        assert_eq!(ready["hits"].len(), 1);
        assert_eq!(ready["hits"][0].as_time().unwrap().total(), 1);
    }

    #[test]
    fn test_ready_metrics_none_when_nothing_ready() {
        let clock = Arc::new(ManualClock::new(at(1000)));
        let engine = engine(&clock);
        assert!(engine.ready_metrics().is_none());

        let hits = engine.time_histogram("hits", PERIOD).unwrap();
        hits.add(Key::from("a"), 1).unwrap();
        assert!(engine.ready_metrics().is_none());
    }

    #[test]
    fn test_ready_metrics_collects_all_windows() {
        let clock = Arc::new(ManualClock::new(at(1000)));
        let engine = engine(&clock);
        let hits = engine.time_histogram("hits", PERIOD).unwrap();
        let latency = engine.perf_histogram("latency", 1.0, 2.0, PERIOD).unwrap();
        let idle = engine.time_histogram("idle", PERIOD).unwrap();

        hits.add(Key::from("a"), 1).unwrap();
        latency.add(3.0).unwrap();
        clock.advance(PERIOD);
        hits.add(Key::from("a"), 2).unwrap();
        clock.advance(PERIOD);
        hits.add(Key::from("a"), 4).unwrap();

        let ready = engine.ready_metrics().unwrap();
        assert_eq!(ready.len(), 2);
        assert!(!ready.contains_key("idle"));
        assert!(idle.is_empty());

        let windows = &ready["hits"];
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start(), at(1000));
        assert_eq!(windows[1].start(), at(1010));
        assert_eq!(windows[1].as_time().unwrap().metrics()[&Key::from("a")], 2);

        let perf = ready["latency"][0].as_perf().unwrap();
        assert_eq!(perf.max(), 3.0);
        assert_eq!(perf.metrics()[&3], 1);

        // the in-progress window stays behind
        assert!(engine.ready_metrics().is_none());
        clock.advance(PERIOD);
        let ready = engine.ready_metrics().unwrap();
        assert_eq!(ready["hits"][0].as_time().unwrap().total(), 4);
    }

    #[test]
    fn test_custom_key_type() {
        let clock = Arc::new(ManualClock::new(at(1000)));
        let engine: Engine<(&'static str, u16)> = Engine::new().with_clock(clock.clone());
        let status = engine.time_histogram("status", PERIOD).unwrap();
        status.add(("GET", 200), 1).unwrap();
        status.add(("GET", 200), 1).unwrap();
        status.add(("POST", 500), 1).unwrap();
        clock.advance(PERIOD);

        let ready = engine.ready_metrics().unwrap();
        let window = ready["status"][0].as_time().unwrap();
        assert_eq!(window.metrics()[&("GET", 200)], 2);
        assert_eq!(window.metrics()[&("POST", 500)], 1);
    }
}
