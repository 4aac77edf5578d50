use std::fmt;

use crate::server::ServerError;

/// A bind prefix of the form `http://host:port/`.
///
/// The host `+` or `*` stands for every interface. Only plain `http` is
/// served and the prefix path must be `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    original: String,
    host: String,
    port: u16,
}

impl Prefix {
    pub fn parse(prefix: &str) -> Result<Self, ServerError> {
        let invalid = |reason: &str| ServerError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = prefix
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        if !scheme.eq_ignore_ascii_case("http") {
            return Err(ServerError::UnsupportedScheme(scheme.to_string()));
        }

        let rest = match rest.chars().next() {
            Some('+') | Some('*') => format!("0.0.0.0{}", &rest[1..]),
            _ => rest.to_string(),
        };

        let url = url::Url::parse(&format!("http://{}", rest))
            .map_err(|e| invalid(&e.to_string()))?;
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;
        if url.path() != "/" {
            return Err(invalid("only the root path '/' is supported"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed"));
        }

        Ok(Self {
            original: prefix.to_string(),
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The address handed to the socket bind call.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}
