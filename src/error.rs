//! Error types for metric stores.
//!
//! Every fallible operation in this crate returns [`MetricsError`]. Errors are
//! only produced on the write path and at construction time: `ready()`,
//! `flush()` and the accessors of ready windows never fail.
//!
//! # Example
//!
//! ```rust
//! use finestre::error::{MaxStoreLengthError, MetricsError};
//! use finestre::histograms::time::TimeHistogram;
//! use std::time::Duration;
//!
//! let hist = TimeHistogram::new(Duration::from_secs(60))
//!     .unwrap()
//!     .with_max_length(1);
//! hist.add("first", 1).unwrap();
//!
//! match hist.add("second", 1) {
//!     Err(MetricsError::MaxStoreLength(MaxStoreLengthError { max_len })) => assert_eq!(max_len, 1),
//!     other => panic!("unexpected result: {other:?}"),
//! }
//! ```

use thiserror::Error;

/// Returned when a new key would push a time bucket past its cardinality bound.
///
/// Existing keys of the same bucket remain updatable; only the observation
/// carrying the new key is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("maximum metrics store length ({max_len}) reached")]
pub struct MaxStoreLengthError {
    /// The configured maximum number of distinct keys per bucket.
    pub max_len: usize,
}

/// Unified error type for all metric store operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    /// The key is nil or of a type that cannot be compared for equality.
    #[error("invalid metric key: {reason}")]
    InvalidKey {
        /// Why the key was rejected.
        reason: String,
    },

    /// The bucket already holds the maximum number of distinct keys.
    #[error(transparent)]
    MaxStoreLength(#[from] MaxStoreLengthError),

    /// Performance histogram parameters are out of range.
    #[error("invalid performance histogram: {reason}")]
    InvalidHistogram {
        /// Which parameter is invalid and why.
        reason: String,
    },

    /// The observation cannot be classified (NaN or infinite).
    #[error("invalid observation: {value}")]
    InvalidValue {
        /// The rejected observation.
        value: f64,
    },

    /// A store period must be strictly positive.
    #[error("store period must be greater than zero")]
    InvalidPeriod,

    /// The name is already registered for a store of another kind.
    #[error("store '{name}' is a {found} store, not a {expected} store")]
    StoreKindMismatch {
        /// The store name.
        name: String,
        /// The kind requested by the caller.
        expected: &'static str,
        /// The kind already registered under this name.
        found: &'static str,
    },
}

/// Result type for metric store operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
