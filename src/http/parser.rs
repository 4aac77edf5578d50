use crate::http::request::Request;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequest,
    #[error("invalid method token")]
    InvalidMethod,
    #[error("unsupported protocol version")]
    InvalidVersion,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("unsupported Transfer-Encoding")]
    UnsupportedTransferEncoding,
    #[error("incomplete request")]
    Incomplete,
    /// The header block is complete but the body has not fully arrived.
    /// `expected` is the total request size in bytes.
    #[error("incomplete request body ({expected} bytes expected)")]
    IncompleteBody { expected: usize },
}

/// Parses one HTTP/1.x request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied. Yields
/// `ParseError::Incomplete` while the header block has not fully arrived and
/// `ParseError::IncompleteBody` while the body declared by Content-Length is
/// still short.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str =
        std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split(' ');

    let method = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || target.is_empty() {
        return Err(ParseError::InvalidRequest);
    }
    if !is_token(method) {
        return Err(ParseError::InvalidMethod);
    }
    if !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidVersion);
    }

    // Headers
    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let key = key.trim();
        if !is_token(key) {
            return Err(ParseError::InvalidHeader);
        }

        headers.insert(key.to_string(), value.trim().to_string());
    }

    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    if let Some(encoding) = header("Transfer-Encoding") {
        if !encoding.eq_ignore_ascii_case("identity") {
            return Err(ParseError::UnsupportedTransferEncoding);
        }
    }

    // Body
    let content_length = header("Content-Length")
        .map(|v| {
            v.parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength)
        })
        .transpose()?
        .unwrap_or(0);

    if body_bytes.len() < content_length {
        return Err(ParseError::IncompleteBody {
            expected: headers_end + 4 + content_length,
        });
    }

    let body = body_bytes[..content_length].to_vec();

    let request = Request {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        headers,
        body,
    };

    let total_consumed = headers_end + 4 + content_length;
    Ok((request, total_consumed))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// RFC 9110 token: one or more tchars.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}
