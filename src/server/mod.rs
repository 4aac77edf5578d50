//! The listener side of the server.
//!
//! - **`listener`**: [`Server`], its lifecycle and the accept loops
//! - **`connection`**: reads, dispatches and answers one accepted connection
//! - **`prefix`**: parsing of `http://host:port/` bind prefixes

pub mod connection;
pub mod listener;
pub mod prefix;

use std::time::Duration;

use crate::config::ServerConfig;

pub use listener::{Server, ServerState};
pub use prefix::Prefix;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("at least one listen prefix is required")]
    NoPrefixes,
    #[error("invalid prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },
    #[error("unsupported scheme {0:?}; only http is served")]
    UnsupportedScheme(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server is already started")]
    AlreadyStarted,
    #[error("server has been stopped and cannot be restarted")]
    Stopped,
}

/// Tunables for accepted connections.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Time allowed for the full request to arrive.
    pub read_timeout: Duration,
    /// Upper bound on header block plus body.
    pub max_request_bytes: usize,
    /// Include the fault message in 500 response bodies.
    pub expose_error_details: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            max_request_bytes: 1024 * 1024,
            expose_error_details: false,
        }
    }
}

impl From<&ServerConfig> for ServerOptions {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            read_timeout: Duration::from_secs(cfg.read_timeout_secs),
            max_request_bytes: cfg.max_request_bytes,
            expose_error_details: cfg.expose_error_details,
        }
    }
}
