//! Connection recording: capture every inbound byte on the wire

mod buffer;
mod connection;
mod listener;

pub use buffer::{ConnectionId, Recording};
pub use connection::RecordingConn;
pub use listener::RecordingListener;
