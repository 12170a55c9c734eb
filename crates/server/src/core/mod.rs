//! Core Service Layer
//!
//! Provides shared infrastructure for the relay server: configuration,
//! data models, errors, routing and the durable store gateway.

pub mod config;
pub mod error;
pub mod models;
pub mod router;
pub mod store;

// Re-exports for convenience
pub use config::{AppState, RelayConfig};
pub use error::{Error, Result};
pub use router::router;
