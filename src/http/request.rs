use std::collections::HashMap;

/// Well-known HTTP request methods.
///
/// Requests carry their method as the raw token sent by the client so that
/// extension methods survive parsing; this enum names the methods the router
/// offers registration shortcuts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method, ignoring ASCII case.
    ///
    /// # Example
    ///
    /// ```
    /// # use waypoint::http::request::Method;
    /// assert_eq!(Method::parse("GET"), Some(Method::GET));
    /// assert_eq!(Method::parse("delete"), Some(Method::DELETE));
    /// assert_eq!(Method::parse("PURGE"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        [
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
            Method::PATCH,
        ]
        .into_iter()
        .find(|m| m.as_str().eq_ignore_ascii_case(s))
    }

    /// Returns the canonical upper-case token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a parsed HTTP request from a client.
///
/// `target` is the request-target exactly as it appeared on the request line,
/// query string included. [`Request::path_and_query`] splits it.
#[derive(Debug, Clone)]
pub struct Request {
    /// The method token as sent by the client
    pub method: String,
    /// The request target (e.g. "/products/42?verbose=true")
    pub target: String,
    /// HTTP version (typically "HTTP/1.1")
    pub version: String,
    /// Request headers as key-value pairs, names as sent
    pub headers: HashMap<String, String>,
    /// Request body, framed by Content-Length
    pub body: Vec<u8>,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<String>,
    target: Option<String>,
    version: Option<String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            target: None,
            version: None,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: impl AsRef<str>) -> Self {
        self.method = Some(method.as_ref().to_string());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            target: self.target.ok_or("target missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            body: self.body,
        })
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Retrieves the Content-Length header value and parses it as a usize.
    ///
    /// Returns 0 if the header is missing or not a valid number.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// The well-known method, if the token is one.
    pub fn known_method(&self) -> Option<Method> {
        Method::parse(&self.method)
    }

    /// Splits the request target into its raw path and optional raw query.
    ///
    /// Absolute-form targets (`http://host/path?q`) are reduced to their path
    /// and query. Any fragment is dropped. An empty path becomes `/`.
    pub fn path_and_query(&self) -> (String, Option<String>) {
        if self.target.contains("://") {
            if let Ok(url) = url::Url::parse(&self.target) {
                return (url.path().to_string(), url.query().map(str::to_string));
            }
        }

        let target = self
            .target
            .split_once('#')
            .map(|(before, _)| before)
            .unwrap_or(&self.target);

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };

        let path = if path.is_empty() { "/" } else { path };
        (path.to_string(), query)
    }

    /// The charset parameter of the Content-Type header, if any.
    pub fn charset(&self) -> Option<String> {
        let content_type = self.header("Content-Type")?;
        content_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"').to_ascii_lowercase())
    }
}
