use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a response into its HTTP/1.1 wire form.
///
/// Headers are written in name order so output is deterministic, followed by
/// `Connection: close` unless the response set its own Connection header.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + resp.body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    let mut headers: Vec<_> = resp.headers.iter().collect();
    headers.sort();
    for (k, v) in headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if resp.header("Connection").is_none() {
        buf.extend_from_slice(b"Connection: close\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf.extend_from_slice(&resp.body);

    buf
}

pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    /// Writes the serialized response, resuming where a previous call stopped.
    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection closed while writing",
                ));
            }

            self.written += n;
        }

        stream.flush().await
    }
}
