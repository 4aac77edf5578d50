use std::collections::HashMap;

pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// HTTP status codes the server and its handlers can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 202 Accepted
    Accepted,
    /// 204 No Content
    NoContent,
    /// 301 Moved Permanently
    MovedPermanently,
    /// 302 Found
    Found,
    /// 304 Not Modified
    NotModified,
    /// 400 Bad Request
    BadRequest,
    /// 401 Unauthorized
    Unauthorized,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 408 Request Timeout
    RequestTimeout,
    /// 409 Conflict
    Conflict,
    /// 413 Payload Too Large
    PayloadTooLarge,
    /// 415 Unsupported Media Type
    UnsupportedMediaType,
    /// 422 Unprocessable Entity
    UnprocessableEntity,
    /// 500 Internal Server Error
    InternalServerError,
    /// 501 Not Implemented
    NotImplemented,
    /// 503 Service Unavailable
    ServiceUnavailable,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use waypoint::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::Accepted => 202,
            StatusCode::NoContent => 204,
            StatusCode::MovedPermanently => 301,
            StatusCode::Found => 302,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::RequestTimeout => 408,
            StatusCode::Conflict => 409,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::UnsupportedMediaType => 415,
            StatusCode::UnprocessableEntity => 422,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    /// Looks a status up by its numeric code.
    pub fn from_u16(code: u16) -> Option<Self> {
        Some(match code {
            200 => StatusCode::Ok,
            201 => StatusCode::Created,
            202 => StatusCode::Accepted,
            204 => StatusCode::NoContent,
            301 => StatusCode::MovedPermanently,
            302 => StatusCode::Found,
            304 => StatusCode::NotModified,
            400 => StatusCode::BadRequest,
            401 => StatusCode::Unauthorized,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            408 => StatusCode::RequestTimeout,
            409 => StatusCode::Conflict,
            413 => StatusCode::PayloadTooLarge,
            415 => StatusCode::UnsupportedMediaType,
            422 => StatusCode::UnprocessableEntity,
            500 => StatusCode::InternalServerError,
            501 => StatusCode::NotImplemented,
            503 => StatusCode::ServiceUnavailable,
            _ => return None,
        })
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use waypoint::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::Conflict => "Conflict",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::UnsupportedMediaType => "Unsupported Media Type",
            StatusCode::UnprocessableEntity => "Unprocessable Entity",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

impl StatusCode {
    /// Whether a response with this status may carry a body.
    ///
    /// 204 and 304 responses end at the header block.
    pub fn allows_body(&self) -> bool {
        !matches!(self, StatusCode::NoContent | StatusCode::NotModified)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// Represents a complete HTTP response ready to be sent to a client.
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// HTTP headers as key-value pairs
    pub headers: HashMap<String, String>,
    /// Response body as bytes
    pub body: Vec<u8>,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(b"{}".to_vec())
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Builds the final Response.
    ///
    /// Adds the Content-Length header from the body size unless one was set
    /// explicitly. For statuses that forbid a body (204, 304) any body is
    /// discarded and no Content-Length is added.
    pub fn build(mut self) -> Response {
        if !self.status.allows_body() {
            self.body.clear();
            self.headers
                .retain(|k, _| !k.eq_ignore_ascii_case("Content-Length"));
            return Response {
                status: self.status,
                headers: self.headers,
                body: self.body,
            };
        }

        let has_length = self
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("Content-Length"));
        if !has_length {
            self.headers
                .insert("Content-Length".to_string(), self.body.len().to_string());
        }

        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// An HTML response; Content-Length is the UTF-8 byte length of `body`.
    ///
    /// With a body-less status such as 204 the body is dropped.
    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", CONTENT_TYPE_HTML)
            .body(body.into().into_bytes())
            .build()
    }

    /// A JSON response from already-serialized JSON text.
    pub fn json(status: StatusCode, body: impl Into<String>) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", CONTENT_TYPE_JSON)
            .body(body.into().into_bytes())
            .build()
    }

    /// Creates a 404 Not Found response naming the unmatched request.
    pub fn not_found(method: &str, path: &str) -> Self {
        Self::html(
            StatusCode::NotFound,
            error_page(
                StatusCode::NotFound,
                &format!("No route matches {} {}", method, path),
            ),
        )
    }

    /// Creates a 500 Internal Server Error response.
    ///
    /// `detail` is rendered into the page when given; callers decide whether
    /// fault messages may reach the client.
    pub fn internal_error(detail: Option<&str>) -> Self {
        let message = detail.unwrap_or("The server failed to handle the request.");
        Self::html(
            StatusCode::InternalServerError,
            error_page(StatusCode::InternalServerError, message),
        )
    }

    /// A short HTML error page for protocol-level rejections.
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::html(status, error_page(status, message))
    }

    /// Looks up a header, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

fn error_page(status: StatusCode, message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{status}</title></head>\
         <body><h1>{status}</h1><p>{}</p></body></html>",
        escape_html(message)
    )
}

/// Escapes the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
