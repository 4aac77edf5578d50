//! Per-connection request context.
//!
//! A [`RequestContext`] is built for every accepted request. It owns the
//! parsed request, exposes the decoded path and eagerly parsed query
//! parameters, carries the route parameters filled in by the router, and
//! writes exactly one response through a [`ResponseHandle`].
//!
//! The response handle is shared with the connection task that created the
//! context, which lets the server answer with a 500 when a handler fails
//! before responding.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::http::query::parse_query;
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("a response has already been sent for this request")]
    ResponseAlreadySent,
    #[error("request body is not valid {charset}")]
    MalformedBody { charset: String },
    #[error("unsupported request charset: {0}")]
    UnsupportedCharset(String),
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("failed to serialize JSON response: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write response: {0}")]
    Io(#[from] std::io::Error),
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct ResponseSlot {
    writer: Option<BoxedWriter>,
    status: Option<StatusCode>,
}

/// The output side of one connection.
///
/// Cloning yields another handle onto the same output. The first
/// [`send`](Self::send) writes the response and shuts the output down; every
/// later send fails with [`ContextError::ResponseAlreadySent`].
#[derive(Clone)]
pub struct ResponseHandle {
    slot: Arc<Mutex<ResponseSlot>>,
}

impl ResponseHandle {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(ResponseSlot {
                writer: Some(Box::new(writer)),
                status: None,
            })),
        }
    }

    /// Writes `response` and closes the output.
    ///
    /// The output counts as used even if the write fails part way.
    pub async fn send(&self, response: Response) -> Result<(), ContextError> {
        let mut slot = self.slot.lock().await;
        let mut writer = slot
            .writer
            .take()
            .ok_or(ContextError::ResponseAlreadySent)?;
        slot.status = Some(response.status);

        let written = ResponseWriter::new(&response)
            .write_to_stream(&mut writer)
            .await;
        let closed = writer.shutdown().await;
        written?;
        closed?;
        Ok(())
    }

    /// Closes the output without writing anything. No-op once sent.
    pub async fn close(&self) {
        let writer = self.slot.lock().await.writer.take();
        if let Some(mut writer) = writer {
            let _ = writer.shutdown().await;
        }
    }

    pub async fn is_sent(&self) -> bool {
        self.slot.lock().await.status.is_some()
    }

    /// Status of the response written so far, if any.
    pub async fn status(&self) -> Option<StatusCode> {
        self.slot.lock().await.status
    }
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle").finish_non_exhaustive()
    }
}

/// Request data and response writers for one inbound request.
#[derive(Debug)]
pub struct RequestContext {
    request: Request,
    path: String,
    raw_path: String,
    query: HashMap<String, String>,
    route_params: HashMap<String, String>,
    body: Option<Vec<u8>>,
    peer: Option<SocketAddr>,
    response: ResponseHandle,
}

impl RequestContext {
    /// Builds the context, parsing the query string eagerly.
    pub fn new(mut request: Request, response: ResponseHandle) -> Self {
        let (raw_path, query) = request.path_and_query();
        let path = decode_lossy(&raw_path).into_owned();
        let query = query.as_deref().map(parse_query).unwrap_or_default();
        let body = std::mem::take(&mut request.body);

        Self {
            request,
            path,
            raw_path,
            query,
            route_params: HashMap::new(),
            body: Some(body),
            peer: None,
            response,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Percent-decoded path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path exactly as sent, still percent-encoded.
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// The method token as sent by the client.
    pub fn method(&self) -> &str {
        &self.request.method
    }

    pub fn version(&self) -> &str {
        &self.request.version
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.request.headers
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn route_params(&self) -> &HashMap<String, String> {
        &self.route_params
    }

    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.route_params.get(name).map(String::as_str)
    }

    pub(crate) fn set_route_params(&mut self, params: Vec<(String, String)>) {
        self.route_params.extend(params);
    }

    /// Reads the whole body as text in the charset from Content-Type.
    ///
    /// UTF-8 is assumed when no charset is declared. The body is consumed:
    /// only the first call returns it, later calls return an empty string.
    pub fn read_body(&mut self) -> Result<String, ContextError> {
        let charset = self.request.charset();
        let bytes = self.read_body_bytes();
        decode_body(bytes, charset.as_deref().unwrap_or("utf-8"))
    }

    /// Takes the raw body bytes. Empty on every call after the first.
    pub fn read_body_bytes(&mut self) -> Vec<u8> {
        self.body.take().unwrap_or_default()
    }

    /// Reads the body and deserializes it as JSON.
    pub fn read_json<T: DeserializeOwned>(&mut self) -> Result<T, ContextError> {
        let text = self.read_body()?;
        serde_json::from_str(&text).map_err(ContextError::InvalidJson)
    }

    /// Writes an HTML (or plain text) response and closes the output.
    pub async fn write_html(
        &self,
        status: StatusCode,
        body: impl Into<String>,
    ) -> Result<(), ContextError> {
        self.response.send(Response::html(status, body)).await
    }

    /// Writes already-serialized JSON text and closes the output.
    pub async fn write_json(
        &self,
        status: StatusCode,
        json: impl Into<String>,
    ) -> Result<(), ContextError> {
        self.response.send(Response::json(status, json)).await
    }

    /// Serializes `value` with serde_json and writes it.
    pub async fn write_json_value<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        value: &T,
    ) -> Result<(), ContextError> {
        let json = serde_json::to_string(value).map_err(ContextError::Serialize)?;
        self.write_json(status, json).await
    }

    /// Writes a prebuilt response and closes the output.
    pub async fn write_response(&self, response: Response) -> Result<(), ContextError> {
        self.response.send(response).await
    }

    /// Another handle onto this context's output.
    pub fn response_handle(&self) -> ResponseHandle {
        self.response.clone()
    }
}

/// Percent-decodes `raw`, keeping it untouched if the result is not UTF-8.
pub(crate) fn decode_lossy(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

fn decode_body(bytes: Vec<u8>, charset: &str) -> Result<String, ContextError> {
    match charset {
        "utf-8" | "utf8" => String::from_utf8(bytes).map_err(|_| ContextError::MalformedBody {
            charset: "utf-8".to_string(),
        }),
        "us-ascii" | "ascii" => {
            if bytes.is_ascii() {
                // ASCII is a subset of UTF-8.
                String::from_utf8(bytes).map_err(|_| ContextError::MalformedBody {
                    charset: "us-ascii".to_string(),
                })
            } else {
                Err(ContextError::MalformedBody {
                    charset: "us-ascii".to_string(),
                })
            }
        }
        "iso-8859-1" | "latin1" | "latin-1" => Ok(bytes.into_iter().map(char::from).collect()),
        other => Err(ContextError::UnsupportedCharset(other.to_string())),
    }
}
