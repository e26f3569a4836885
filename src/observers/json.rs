//! JSON observer for ready windows.
//!
//! This module provides [`JsonObserver`], which serializes the windows
//! returned by [`Engine::ready_metrics`](crate::engine::Engine::ready_metrics)
//! through the [`snapshot`](crate::snapshot) types.
//!
//! # Feature Flag
//!
//! This module requires the `json` feature:
//!
//! ```toml
//! [dependencies]
//! finestre = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use finestre::engine::Engine;
//! use finestre::observers::json::JsonObserver;
//!
//! let engine: Engine = Engine::new();
//! // ... record metrics ...
//!
//! if let Some(ready) = engine.ready_metrics() {
//!     let json = JsonObserver::new().to_json(&ready).unwrap();
//!     println!("{}", json);
//!     // {"stores":[{"name":"rule_hits","windows":[{"kind":"time",...}]}]}
//! }
//! ```

use std::collections::HashMap;
use std::io::Write;

use serde::Serialize;

use crate::key::MetricKey;
use crate::observers::Result;
use crate::ready::ReadyStore;
use crate::snapshot::MetricsSnapshot;

/// Configuration for the JSON observer.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to pretty-print the JSON output.
    pub pretty: bool,
    /// Whether to stamp the output with the collection time.
    pub include_timestamp: bool,
}

/// An observer that serializes ready windows to JSON.
///
/// # Examples
///
/// ```rust,ignore
/// use finestre::observers::json::JsonObserver;
///
/// let observer = JsonObserver::new()
///     .pretty(true)
///     .include_timestamp(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    /// Creates a new JSON observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new JSON observer with the specified configuration.
    pub fn with_config(config: JsonConfig) -> Self {
        Self { config }
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Enables or disables the collection timestamp.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.config.include_timestamp = enabled;
        self
    }

    /// Builds the intermediate [`MetricsSnapshot`].
    pub fn collect<K>(&self, ready: &HashMap<String, Vec<ReadyStore<K>>>) -> MetricsSnapshot<K>
    where
        K: MetricKey + Ord,
    {
        if self.config.include_timestamp {
            MetricsSnapshot::from_ready_with_timestamp(ready)
        } else {
            MetricsSnapshot::from_ready(ready)
        }
    }

    /// Serializes ready windows to a JSON string.
    pub fn to_json<K>(&self, ready: &HashMap<String, Vec<ReadyStore<K>>>) -> Result<String>
    where
        K: MetricKey + Ord + Serialize,
    {
        let snapshot = self.collect(ready);
        let json = if self.config.pretty {
            serde_json::to_string_pretty(&snapshot)?
        } else {
            serde_json::to_string(&snapshot)?
        };
        Ok(json)
    }

    /// Serializes ready windows into `writer`.
    pub fn to_writer<K, W>(&self, ready: &HashMap<String, Vec<ReadyStore<K>>>, mut writer: W) -> Result<()>
    where
        K: MetricKey + Ord + Serialize,
        W: Write,
    {
        let snapshot = self.collect(ready);
        if self.config.pretty {
            serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        } else {
            serde_json::to_writer(&mut writer, &snapshot)?;
        }
        writer.flush()?;
        Ok(())
    }
}
