//! Observers rendering ready windows for the shipping client.
//!
//! - [`json`] - Serialize the output of
//!   [`Engine::ready_metrics`](crate::engine::Engine::ready_metrics) to JSON
//!
//! # Feature Flags
//!
//! This module requires the `json` feature (`full` enables it too).

mod error;

pub use error::{ObserverError, Result};

pub mod json;
