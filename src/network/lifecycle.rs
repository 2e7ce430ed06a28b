//! Connection lifecycle notifications

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::recording::Recording;

/// State of a served connection
///
/// `New` is entered once, before the first read. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnState {
    /// Accepted, not yet serving a request
    New,
    /// A request has been dispatched to the handler
    Active,
    /// The handler produced its response
    Idle,
    /// The connection is finished
    Closed,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Callback invoked by the server on every connection state change
///
/// Hooks for the same connection may run concurrently with its request
/// handler, so implementations must be internally synchronized.
pub trait ConnStateHook: Send + Sync {
    /// Observe a state transition
    fn on_state(&self, recording: &Arc<Recording>, state: ConnState);
}

/// Hook that logs every transition
#[derive(Debug, Default, Clone, Copy)]
pub struct StateLogger;

impl ConnStateHook for StateLogger {
    fn on_state(&self, recording: &Arc<Recording>, state: ConnState) {
        info!(conn = %recording.id(), "Transitioning to {}", state);
    }
}

pub(crate) fn notify(hooks: &[Arc<dyn ConnStateHook>], recording: &Arc<Recording>, state: ConnState) {
    for hook in hooks {
        hook.on_state(recording, state);
    }
}
