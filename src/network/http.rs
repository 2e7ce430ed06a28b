//! HTTP handler that echoes the raw recording of the request's connection

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONNECTION, CONTENT_LENGTH};
use hyper::{Request, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::recording::Recording;
use crate::{RawEchoError, Result};

use super::CorrelationTable;

/// Peer address of the connection a request arrived on
///
/// Inserted into the request extensions by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// HTTP handler for echoing recorded connections
pub struct HttpHandler {
    table: Arc<CorrelationTable>,
    print_request: bool,
}

impl HttpHandler {
    /// Create a handler reading recordings from `table`
    #[must_use]
    pub fn new(table: Arc<CorrelationTable>, print_request: bool) -> Self {
        Self {
            table,
            print_request,
        }
    }

    /// Handle a request
    ///
    /// Never fails: lookup and drain errors become empty 5xx responses.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        match self.echo(request).await {
            Ok(response) => response,
            Err(e) => Self::error_response(&e),
        }
    }

    async fn echo<B>(&self, request: Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: Body,
        B::Error: Display,
    {
        let remote_key = request
            .extensions()
            .get::<RemoteAddr>()
            .map_or_else(|| "<unknown>".to_string(), |addr| addr.0.to_string());

        let recording = self.table.lookup(&remote_key).map_err(|e| {
            warn!("{}", e);
            e
        })?;
        let conn = recording.id();
        info!(conn = %conn, "Request received");

        // The recording is only complete once the whole body went through
        // the connection.
        let body_len = match Self::read_body(request.into_body()).await {
            Ok(len) => len,
            Err(e) => {
                warn!(conn = %conn, "Reading body failed: {}", e);
                if self.print_request {
                    Self::dump(&recording, None);
                }
                return Err(e);
            }
        };

        let recorded = recording.snapshot();
        if self.print_request {
            Self::dump(&recording, Some(body_len));
        }

        let response = Self::echo_response(recorded);
        info!(conn = %conn, "Done");
        Ok(response)
    }

    /// Read the request body to completion, returning its length
    ///
    /// # Errors
    ///
    /// Returns `BodyDrain` if the body stream fails
    pub async fn read_body<B>(body: B) -> Result<usize>
    where
        B: Body,
        B::Error: Display,
    {
        let collected = body
            .collect()
            .await
            .map_err(|e| RawEchoError::BodyDrain(e.to_string()))?;

        Ok(collected.to_bytes().len())
    }

    /// Build the 200 response carrying the recorded bytes
    #[must_use]
    pub fn echo_response(recorded: Bytes) -> Response<Full<Bytes>> {
        let len = recorded.len();
        let mut response = Response::new(Full::new(recorded));
        let headers = response.headers_mut();
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        response
    }

    /// Create an error response with an empty body
    #[must_use]
    pub fn error_response(error: &RawEchoError) -> Response<Full<Bytes>> {
        debug!("Responding with 500: {}", error);

        let mut response = Self::echo_response(Bytes::new());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }

    fn dump(recording: &Recording, body_len: Option<usize>) {
        let recorded = recording.snapshot();
        let text = String::from_utf8_lossy(&recorded);
        match body_len {
            Some(body_len) => info!(
                conn = %recording.id(),
                "Recorded {} bytes, body is {} bytes:\n{}",
                recorded.len(),
                body_len,
                text
            ),
            None => info!(
                conn = %recording.id(),
                "Recorded {} bytes before failure:\n{}",
                recorded.len(),
                text
            ),
        }
    }
}
