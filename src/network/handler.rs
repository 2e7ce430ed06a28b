//! Main network handler

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::recording::{Recording, RecordingConn, RecordingListener};
use crate::Result;

use super::lifecycle::{notify, ConnState, ConnStateHook, StateLogger};
use super::{CorrelationTable, HttpHandler, RemoteAddr, ACCEPT_BACKOFF_MS, SHUTDOWN_TIMEOUT_MS};

/// Main network handler: accepts recording connections and serves them
pub struct NetworkHandler {
    config: Arc<Config>,
    table: Arc<CorrelationTable>,
    hooks: Vec<Arc<dyn ConnStateHook>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl NetworkHandler {
    /// Create a new network handler
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let table = Arc::new(CorrelationTable::new());
        let hooks: Vec<Arc<dyn ConnStateHook>> = vec![
            Arc::new(StateLogger),
            Arc::clone(&table) as Arc<dyn ConnStateHook>,
        ];

        Self {
            config: Arc::new(config),
            table,
            hooks,
            shutdown_tx,
        }
    }

    /// Add a lifecycle hook, called after the built-in ones
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn ConnStateHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Correlation table shared with the request handler
    pub fn table(&self) -> Arc<CorrelationTable> {
        Arc::clone(&self.table)
    }

    /// Sender that stops the accept loop when signalled
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bind the configured address and serve until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound
    pub async fn run(self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = RecordingListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    ///
    /// # Errors
    ///
    /// Per-connection failures are logged, never returned
    pub async fn serve(self, listener: RecordingListener) -> Result<()> {
        let Self {
            config,
            table,
            hooks,
            shutdown_tx,
        } = self;

        let handler = Arc::new(HttpHandler::new(table, config.print_request));
        let hooks: Arc<[Arc<dyn ConnStateHook>]> = hooks.into();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok(conn) => {
                            connections.spawn(serve_connection(
                                conn,
                                Arc::clone(&handler),
                                Arc::clone(&hooks),
                            ));
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                            tokio::time::sleep(Duration::from_millis(ACCEPT_BACKOFF_MS)).await;
                        }
                    }
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Connection task failed: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        // Let in-flight connections finish, then abort the rest
        let shutdown_timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        let drained = tokio::time::timeout(shutdown_timeout, async {
            while let Some(result) = connections.join_next().await {
                if let Err(e) = result {
                    warn!("Task cleanup error: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Aborting {} connections after shutdown timeout", connections.len());
            connections.abort_all();
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Reports `Closed` when dropped, including when the task is aborted
struct ClosedOnDrop {
    hooks: Arc<[Arc<dyn ConnStateHook>]>,
    recording: Arc<Recording>,
}

impl Drop for ClosedOnDrop {
    fn drop(&mut self) {
        notify(&self.hooks, &self.recording, ConnState::Closed);
    }
}

async fn serve_connection(
    conn: RecordingConn<TcpStream>,
    handler: Arc<HttpHandler>,
    hooks: Arc<[Arc<dyn ConnStateHook>]>,
) {
    let recording = conn.recording();
    let remote_addr = RemoteAddr(conn.remote_addr());

    notify(&hooks, &recording, ConnState::New);
    let _closed = ClosedOnDrop {
        hooks: Arc::clone(&hooks),
        recording: Arc::clone(&recording),
    };

    let service = {
        let recording = Arc::clone(&recording);
        let hooks = Arc::clone(&hooks);
        service_fn(move |mut request: Request<Incoming>| {
            let handler = Arc::clone(&handler);
            let hooks = Arc::clone(&hooks);
            let recording = Arc::clone(&recording);
            request.extensions_mut().insert(remote_addr);

            async move {
                notify(&hooks, &recording, ConnState::Active);
                let response = handler.handle(request).await;
                notify(&hooks, &recording, ConnState::Idle);
                Ok::<_, Infallible>(response)
            }
        })
    };

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(conn), service)
        .await
    {
        debug!(conn = %recording.id(), "Connection error: {}", e);
    }
}
