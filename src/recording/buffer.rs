//! Per-connection recording of inbound bytes

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};

/// Identifier assigned to each accepted connection, in accept order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Everything read from one connection so far
///
/// The buffer only grows. Any snapshot is a byte-prefix of every later
/// snapshot.
pub struct Recording {
    id: ConnectionId,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    bytes: Mutex<BytesMut>,
}

impl Recording {
    /// Create an empty recording for a freshly accepted connection
    #[must_use]
    pub fn new(id: ConnectionId, remote_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            local_addr,
            bytes: Mutex::new(BytesMut::new()),
        }
    }

    /// Connection identifier
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer address of the connection
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Local address of the connection
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Key under which this recording is correlated with requests
    pub fn remote_key(&self) -> String {
        self.remote_addr.to_string()
    }

    /// Append bytes read from the transport
    pub(crate) fn append(&self, data: &[u8]) {
        self.lock().extend_from_slice(data);
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock())
    }

    /// Number of bytes recorded so far
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been read yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave a half-appended slice
    // behind, so a poisoned buffer is still valid.
    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Recording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recording")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("local_addr", &self.local_addr)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn recording() -> Recording {
        Recording::new(
            ConnectionId(7),
            "10.0.0.1:40000".parse().unwrap(),
            "10.0.0.2:5003".parse().unwrap(),
        )
    }

    #[test]
    fn test_new_recording_is_empty() {
        let rec = recording();
        assert!(rec.is_empty());
        assert_eq!(rec.snapshot(), Bytes::new());
        assert_eq!(rec.remote_key(), "10.0.0.1:40000");
        assert_eq!(rec.id().to_string(), "conn#7");
    }

    #[test]
    fn test_append_preserves_order() {
        let rec = recording();
        rec.append(b"GET / ");
        rec.append(b"HTTP/1.1\r\n");
        assert_eq!(rec.len(), 16);
        assert_eq!(&rec.snapshot()[..], b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn test_snapshot_is_detached() {
        let rec = recording();
        rec.append(b"abc");
        let before = rec.snapshot();
        rec.append(b"def");
        assert_eq!(&before[..], b"abc");
        assert_eq!(&rec.snapshot()[..], b"abcdef");
    }

    proptest! {
        #[test]
        fn prop_snapshots_are_prefixes(chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..64),
            0..32,
        )) {
            let rec = recording();
            let mut expected = Vec::new();
            let mut previous = rec.snapshot();

            for chunk in &chunks {
                rec.append(chunk);
                expected.extend_from_slice(chunk);

                let current = rec.snapshot();
                prop_assert!(current.starts_with(&previous));
                previous = current;
            }

            prop_assert_eq!(&rec.snapshot()[..], &expected[..]);
        }
    }
}
