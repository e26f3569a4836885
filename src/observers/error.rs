//! Unified error type for all observers.
//!
//! # Example
//!
//! ```rust
//! use finestre::engine::Engine;
//! use finestre::observers::json::JsonObserver;
//! use finestre::observers::Result;
//!
//! fn render(engine: &Engine) -> Result<Option<String>> {
//!     engine
//!         .ready_metrics()
//!         .map(|ready| JsonObserver::new().to_json(&ready))
//!         .transpose()
//! }
//!
//! let engine: Engine = Engine::new();
//! assert_eq!(render(&engine).unwrap(), None);
//! ```

use thiserror::Error;

/// Unified error type for all observer operations.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// Error from the JSON observer.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error writing the rendered output.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for observer operations.
pub type Result<T> = std::result::Result<T, ObserverError>;
