//! Transport wrapper that records every byte read

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::{ConnectionId, Recording};

/// Connection that appends everything it reads to a [`Recording`]
///
/// Reads and writes behave exactly like the wrapped transport. Writes are
/// not recorded. Only one task may read at a time.
#[derive(Debug)]
pub struct RecordingConn<T> {
    io: T,
    recording: Arc<Recording>,
}

impl<T> RecordingConn<T> {
    /// Wrap a transport with an empty recording
    pub fn new(io: T, id: ConnectionId, remote_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            io,
            recording: Arc::new(Recording::new(id, remote_addr, local_addr)),
        }
    }

    /// Shared handle to the recording
    pub fn recording(&self) -> Arc<Recording> {
        Arc::clone(&self.recording)
    }

    /// Connection identifier
    pub fn id(&self) -> ConnectionId {
        self.recording.id()
    }

    /// Peer address
    pub fn remote_addr(&self) -> SocketAddr {
        self.recording.remote_addr()
    }

    /// Local address
    pub fn local_addr(&self) -> SocketAddr {
        self.recording.local_addr()
    }

    /// Borrow the wrapped transport
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    /// Unwrap the transport. The recording stays reachable through any
    /// handle obtained from [`RecordingConn::recording`].
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for RecordingConn<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let filled_before = buf.filled().len();

        let poll = Pin::new(&mut this.io).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = poll {
            let fresh = &buf.filled()[filled_before..];
            if !fresh.is_empty() {
                this.recording.append(fresh);
            }
        }

        poll
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for RecordingConn<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn wrap<T>(io: T) -> RecordingConn<T> {
        RecordingConn::new(
            io,
            ConnectionId(1),
            "127.0.0.1:50000".parse().unwrap(),
            "127.0.0.1:5003".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_reads_are_recorded_in_order() {
        let (mut client, server) = duplex(64);
        let mut conn = wrap(server);
        let recording = conn.recording();

        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        let mut buf = [0u8; 16];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"GET / HTTP/1.1\r\n");

        client.write_all(b"Host: x\r\n\r\n").await.unwrap();
        let mut buf = [0u8; 11];
        conn.read_exact(&mut buf).await.unwrap();

        assert_eq!(
            &recording.snapshot()[..],
            b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_read_result_is_unchanged() {
        let (mut client, server) = duplex(64);
        let mut conn = wrap(server);

        client.write_all(b"hello").await.unwrap();
        drop(client);

        let mut out = Vec::new();
        let n = conn.read_to_end(&mut out).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(out, b"hello");

        // EOF is reported as usual and adds nothing
        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&mut buf).await.unwrap(), 0);
        assert_eq!(conn.recording().len(), 5);
    }

    #[tokio::test]
    async fn test_writes_are_not_recorded() {
        let (mut client, server) = duplex(64);
        let mut conn = wrap(server);

        conn.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();
        conn.flush().await.unwrap();

        let mut buf = [0u8; 17];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"HTTP/1.1 200 OK\r\n");
        assert!(conn.recording().is_empty());
    }

    #[tokio::test]
    async fn test_recording_outlives_transport() {
        let (mut client, server) = duplex(64);
        let mut conn = wrap(server);
        let recording = conn.recording();

        client.write_all(b"abc").await.unwrap();
        let mut buf = [0u8; 3];
        conn.read_exact(&mut buf).await.unwrap();
        drop(conn.into_inner());

        assert_eq!(&recording.snapshot()[..], b"abc");
        assert_eq!(recording.id(), ConnectionId(1));
    }
}
