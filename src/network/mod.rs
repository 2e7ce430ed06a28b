//! Network layer for rawecho
//!
//! Serves HTTP/1.1 over recording connections and correlates each request
//! with the bytes its connection has delivered.

mod correlation;
mod handler;
mod http;
mod lifecycle;

pub use correlation::CorrelationTable;
pub use handler::NetworkHandler;
pub use http::{HttpHandler, RemoteAddr};
pub use lifecycle::{ConnState, ConnStateHook, StateLogger};

/// Pause after a failed accept before trying again
pub const ACCEPT_BACKOFF_MS: u64 = 10;

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
