//! Handling of a single accepted connection.
//!
//! Every connection serves exactly one request and moves through:
//!
//! ```text
//!   Reading ──► Dispatching ──► Closed
//!      │                          ▲
//!      └──► Rejecting ────────────┘
//! ```
//!
//! `Rejecting` answers protocol failures (malformed request, oversized
//! request, read timeout) without involving the router.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use futures_util::FutureExt;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, error, info, warn};

use crate::http::context::{ContextError, RequestContext, ResponseHandle};
use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::routing::Router;
use crate::server::ServerOptions;

const READ_CHUNK: usize = 4096;

#[derive(Debug, thiserror::Error)]
enum ReadError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("request exceeds {0} bytes")]
    TooLarge(usize),
    #[error("peer closed the connection mid-request")]
    Truncated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

enum ConnectionState {
    Reading,
    Dispatching(Request),
    Rejecting(StatusCode, String),
    Closed,
}

pub struct Connection {
    reader: OwnedReadHalf,
    buffer: BytesMut,
    response: ResponseHandle,
    peer: SocketAddr,
    router: Arc<Router>,
    options: Arc<ServerOptions>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        router: Arc<Router>,
        options: Arc<ServerOptions>,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            response: ResponseHandle::new(writer),
            peer,
            router,
            options,
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    let read =
                        tokio::time::timeout(self.options.read_timeout, self.read_request()).await;
                    self.state = match read {
                        Ok(Ok(Some(request))) => ConnectionState::Dispatching(request),
                        Ok(Ok(None)) => {
                            debug!("Peer closed before sending a request");
                            ConnectionState::Closed
                        }
                        Ok(Err(e)) => match rejection_status(&e) {
                            Some(status) => ConnectionState::Rejecting(status, e.to_string()),
                            None => {
                                debug!(error = %e, "Dropping connection");
                                ConnectionState::Closed
                            }
                        },
                        Err(_) => ConnectionState::Rejecting(
                            StatusCode::RequestTimeout,
                            "request not received in time".to_string(),
                        ),
                    };
                }

                ConnectionState::Dispatching(request) => {
                    self.dispatch(request).await;
                    self.state = ConnectionState::Closed;
                }

                ConnectionState::Rejecting(status, reason) => {
                    warn!(status = status.as_u16(), reason = %reason, "Rejecting request");
                    self.response.send(Response::error(status, &reason)).await?;
                    self.state = ConnectionState::Closed;
                }

                ConnectionState::Closed => {
                    self.response.close().await;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn read_request(&mut self) -> Result<Option<Request>, ReadError> {
        loop {
            match parse_http_request(&self.buffer) {
                Ok((request, _consumed)) => return Ok(Some(request)),
                Err(ParseError::Incomplete) => {}
                Err(ParseError::IncompleteBody { expected })
                    if expected > self.options.max_request_bytes =>
                {
                    return Err(ReadError::TooLarge(self.options.max_request_bytes));
                }
                Err(ParseError::IncompleteBody { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            if self.buffer.len() >= self.options.max_request_bytes {
                return Err(ReadError::TooLarge(self.options.max_request_bytes));
            }

            self.buffer.reserve(READ_CHUNK);
            let n = self.reader.read_buf(&mut self.buffer).await?;

            if n == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ReadError::Truncated)
                };
            }
        }
    }

    /// Runs the router for one request, turning faults into a 500.
    async fn dispatch(&self, request: Request) {
        let started = Instant::now();
        let ctx = RequestContext::new(request, self.response.clone()).with_peer(self.peer);
        let method = ctx.method().to_string();
        let path = ctx.path().to_string();

        let outcome = AssertUnwindSafe(self.router.dispatch(ctx))
            .catch_unwind()
            .await;

        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                error!(method = %method, path = %path, error = %e, "Handler failed");
                Some(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(method = %method, path = %path, panic = %message, "Handler panicked");
                Some(message)
            }
        };

        if let Some(message) = fault {
            let detail = self
                .options
                .expose_error_details
                .then_some(message.as_str());
            match self.response.send(Response::internal_error(detail)).await {
                Ok(()) => {}
                Err(ContextError::ResponseAlreadySent) => {
                    debug!("Response already sent; fault not reported to client");
                }
                Err(e) => warn!(error = %e, "Failed to write error response"),
            }
        } else if !self.response.is_sent().await {
            warn!(method = %method, path = %path, "Handler returned without writing a response");
            if let Err(e) = self.response.send(Response::internal_error(None)).await {
                warn!(error = %e, "Failed to write error response");
            }
        }

        let status = self.response.status().await.map(|s| s.as_u16());
        info!(
            method = %method,
            path = %path,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request handled"
        );
    }
}

fn rejection_status(error: &ReadError) -> Option<StatusCode> {
    match error {
        ReadError::Parse(ParseError::UnsupportedTransferEncoding) => {
            Some(StatusCode::NotImplemented)
        }
        ReadError::Parse(_) => Some(StatusCode::BadRequest),
        ReadError::TooLarge(_) => Some(StatusCode::PayloadTooLarge),
        ReadError::Truncated | ReadError::Io(_) => None,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
