//! Correlation of requests with the recording of their connection

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::recording::{ConnectionId, Recording};
use crate::{RawEchoError, Result};

use super::lifecycle::{ConnState, ConnStateHook};

struct Entry {
    id: ConnectionId,
    recording: Weak<Recording>,
}

/// Map from peer address to the live recording of that peer's connection
///
/// Entries do not keep recordings alive. At most one entry exists per peer
/// address; a newer connection from the same address+port replaces it.
#[derive(Default)]
pub struct CorrelationTable {
    entries: DashMap<String, Entry>,
}

impl CorrelationTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its peer address
    ///
    /// Returns the id of the entry that was replaced, if any.
    pub fn register(&self, recording: &Arc<Recording>) -> Option<ConnectionId> {
        let entry = Entry {
            id: recording.id(),
            recording: Arc::downgrade(recording),
        };
        self.entries
            .insert(recording.remote_key(), entry)
            .map(|previous| previous.id)
    }

    /// Remove a connection's entry
    ///
    /// Does nothing if the entry for that address already belongs to a newer
    /// connection. Returns whether an entry was removed.
    pub fn deregister(&self, recording: &Recording) -> bool {
        let id = recording.id();
        self.entries
            .remove_if(&recording.remote_key(), |_, entry| entry.id == id)
            .is_some()
    }

    /// Find the recording for a peer address
    ///
    /// # Errors
    ///
    /// Returns `CorrelationMiss` if no live connection is registered for
    /// the address
    pub fn lookup(&self, remote_addr: &str) -> Result<Arc<Recording>> {
        self.entries
            .get(remote_addr)
            .and_then(|entry| entry.recording.upgrade())
            .ok_or_else(|| RawEchoError::CorrelationMiss {
                remote_addr: remote_addr.to_string(),
            })
    }

    /// Whether a peer address has an entry
    pub fn contains(&self, remote_addr: &str) -> bool {
        self.entries.contains_key(remote_addr)
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no connection is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConnStateHook for CorrelationTable {
    fn on_state(&self, recording: &Arc<Recording>, state: ConnState) {
        match state {
            ConnState::New => {
                if let Some(previous) = self.register(recording) {
                    debug!(
                        conn = %recording.id(),
                        "Replaced stale entry {} for {}",
                        previous,
                        recording.remote_addr()
                    );
                }
            }
            ConnState::Closed => {
                self.deregister(recording);
            }
            ConnState::Active | ConnState::Idle => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(id: u64, remote: &str) -> Arc<Recording> {
        Arc::new(Recording::new(
            ConnectionId(id),
            remote.parse().unwrap(),
            "127.0.0.1:5003".parse().unwrap(),
        ))
    }

    #[test]
    fn test_register_and_lookup() {
        let table = CorrelationTable::new();
        let rec = recording(1, "127.0.0.1:40000");

        assert!(table.register(&rec).is_none());
        let found = table.lookup("127.0.0.1:40000").unwrap();
        assert!(Arc::ptr_eq(&found, &rec));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_miss() {
        let table = CorrelationTable::new();
        let result = table.lookup("127.0.0.1:40000");
        assert!(matches!(
            result,
            Err(RawEchoError::CorrelationMiss { ref remote_addr }) if remote_addr == "127.0.0.1:40000"
        ));
    }

    #[test]
    fn test_dropped_recording_is_a_miss() {
        let table = CorrelationTable::new();
        let rec = recording(1, "127.0.0.1:40000");
        table.register(&rec);
        drop(rec);

        assert!(table.contains("127.0.0.1:40000"));
        assert!(table.lookup("127.0.0.1:40000").is_err());
    }

    #[test]
    fn test_reused_address_replaces_entry() {
        let table = CorrelationTable::new();
        let old = recording(1, "127.0.0.1:40000");
        let new = recording(2, "127.0.0.1:40000");

        table.register(&old);
        assert_eq!(table.register(&new), Some(ConnectionId(1)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("127.0.0.1:40000").unwrap().id(), ConnectionId(2));

        // Late close of the old connection must not evict the new one
        assert!(!table.deregister(&old));
        assert_eq!(table.lookup("127.0.0.1:40000").unwrap().id(), ConnectionId(2));

        assert!(table.deregister(&new));
        assert!(table.is_empty());
    }

    #[test]
    fn test_lifecycle_hook() {
        let table = CorrelationTable::new();
        let rec = recording(5, "[::1]:40000");

        table.on_state(&rec, ConnState::New);
        assert!(table.contains("[::1]:40000"));

        table.on_state(&rec, ConnState::Active);
        table.on_state(&rec, ConnState::Idle);
        assert!(table.contains("[::1]:40000"));

        table.on_state(&rec, ConnState::Closed);
        assert!(table.is_empty());
    }

    #[test]
    fn test_concurrent_register_and_deregister() {
        let table = Arc::new(CorrelationTable::new());
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        let rec = recording(t * 1000 + i, &format!("127.0.0.1:{}", 10000 + t * 100 + i));
                        table.register(&rec);
                        assert_eq!(table.lookup(&rec.remote_key()).unwrap().id(), rec.id());
                        assert!(table.deregister(&rec));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(table.is_empty());
    }
}
