//! # Finestre - Time-Windowed Concurrent Metrics
//!
//! A Rust library for aggregating counters and latency histograms in fixed
//! time windows, written for hot paths where many threads record metrics at
//! once and a single collector periodically ships the completed windows.
//!
//! ## The Problem
//!
//! A request handler wants to count "rule X fired" or "this call took 3.2ms"
//! without paying for a global lock, and a background shipper wants every
//! completed minute of data exactly once. Naive designs either serialize all
//! writers on one mutex or lose writes that race with the collector.
//!
//! ## The Solution: Windowed Buckets Behind a Flush Lock
//!
//! Every store splits time into windows of a fixed *period*. Writes land in
//! the bucket for the current window; the collector swaps out all completed
//! windows at once and keeps the in-progress one.
//!
//! ### Design Principles
//!
//! 1. **Shared-Mode Writers**: Writers only take the flush lock in read mode,
//!    so they never block each other. Updating an existing key is a
//!    [`dashmap`] shard read lock plus one relaxed `fetch_add`.
//!
//! 2. **Cache Line Padding**: Hot per-bucket atomics (cardinality, peak) are
//!    wrapped in [`crossbeam_utils::CachePadded`] to avoid false sharing.
//!
//! 3. **Lock-Free Peak**: The maximum observation of a performance histogram
//!    is kept as `f64` bits in an `AtomicU64` and raised with a CAS loop.
//!
//! 4. **Bounded Cardinality**: Each bucket accepts at most
//!    [`max_length`](histograms::time::TimeHistogram::max_length) distinct
//!    keys. New keys beyond that are rejected with an error; existing keys
//!    keep counting.
//!
//! 5. **Exactly-Once Windows**: A flush removes what it returns. Every
//!    accepted write shows up in exactly one ready window.
//!
//! ## Available Store Types
//!
//! | Type | Description | Use Case |
//! |------|-------------|----------|
//! | [`TimeHistogram`](histograms::time::TimeHistogram) | Per-key counters per window | Rule hits, status codes |
//! | [`PerfHistogram`](histograms::perf::PerfHistogram) | Log-bucketed observations per window | Latencies, payload sizes |
//! | [`Engine`](engine::Engine) | Name-indexed registry of both | Process-wide metrics |
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::{Duration, UNIX_EPOCH};
//!
//! use finestre::clock::ManualClock;
//! use finestre::engine::Engine;
//! use finestre::key::Key;
//! use finestre::ready::Window;
//!
//! let clock = Arc::new(ManualClock::new(UNIX_EPOCH));
//! let engine: Engine = Engine::new().with_clock(clock.clone());
//!
//! // Record from any thread
//! let hits = engine.time_histogram("rule_hits", Duration::from_secs(60)).unwrap();
//! hits.add(Key::from("sqli"), 1).unwrap();
//! hits.add(Key::from("sqli"), 2).unwrap();
//!
//! let latency = engine
//!     .perf_histogram("latency_ms", 1.0, 2.0, Duration::from_secs(60))
//!     .unwrap();
//! latency.add(3.2).unwrap();
//!
//! // Nothing is ready until the first minute is over
//! assert!(engine.ready_metrics().is_none());
//!
//! clock.advance(Duration::from_secs(60));
//! let ready = engine.ready_metrics().unwrap();
//! let window = ready["rule_hits"][0].as_time().unwrap();
//! assert_eq!(window.metrics()[&Key::from("sqli")], 3);
//! assert_eq!(ready["latency_ms"][0].as_perf().unwrap().max(), 3.2);
//! ```
//!
//! ## Thread Safety
//!
//! All stores and the engine are `Send + Sync` and are shared through `Arc`.
//! Any number of writers may run concurrently with one or more collectors.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: `debug` for store creation and
//! flushes, `trace` for rejected writes. Install any subscriber to see them.
//!
//! ## Feature Flags
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `serde` | [`snapshot`] | Serializable snapshots of ready windows |
//! | `json` | [`observers::json`] | Serialize ready windows to JSON |
//! | `full` | All of the above | Enables every optional module |
//!
//! ### Example: JSON Output
//!
//! ```toml
//! [dependencies]
//! finestre = { version = "0.1", features = ["json"] }
//! ```
//!
//! ```rust,ignore
//! use finestre::observers::json::JsonObserver;
//!
//! if let Some(ready) = engine.ready_metrics() {
//!     let json = JsonObserver::new().pretty(true).to_json(&ready)?;
//! }
//! ```

pub mod clock;
pub mod engine;
pub mod error;
pub mod histograms;
pub mod key;
pub mod ready;

#[cfg(feature = "serde")]
pub mod snapshot;

#[cfg(feature = "json")]
pub mod observers;
