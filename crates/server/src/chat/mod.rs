//! Presence and Relay Layer
//!
//! Tracks live connections, mirrors presence into the record store and
//! relays chat messages between friends.

pub mod authorizer;
pub mod engine;
pub mod handlers;
pub mod locks;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod relay;

pub use engine::RelayEngine;
pub use handlers::router;
