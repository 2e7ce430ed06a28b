//! TCP listener producing recording connections

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::info;

use super::{ConnectionId, RecordingConn};

/// Listener that hands out [`RecordingConn`]s instead of raw streams
#[derive(Debug)]
pub struct RecordingListener {
    inner: TcpListener,
    next_id: AtomicU64,
}

impl RecordingListener {
    /// Bind a TCP listener
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        info!("Listening on tcp/{}", inner.local_addr()?);
        Ok(Self::from_listener(inner))
    }

    /// Wrap an already bound listener
    #[must_use]
    pub fn from_listener(inner: TcpListener) -> Self {
        Self {
            inner,
            next_id: AtomicU64::new(1),
        }
    }

    /// Wait for the next connection and wrap it
    ///
    /// # Errors
    ///
    /// Returns whatever error the underlying listener reports
    pub async fn accept(&self) -> io::Result<RecordingConn<TcpStream>> {
        let (stream, remote_addr) = self.inner.accept().await?;
        let local_addr = stream.local_addr()?;
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        info!(conn = %id, "Accepted {} -> {}", remote_addr, local_addr);

        Ok(RecordingConn::new(stream, id, remote_addr, local_addr))
    }

    /// Local address the listener is bound to
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be queried
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
