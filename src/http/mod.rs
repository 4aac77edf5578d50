//! HTTP protocol implementation.
//!
//! A minimal HTTP/1.1 layer: one request per connection, bodies framed by
//! Content-Length, every response closing the connection.
//!
//! # Architecture
//!
//! - **`parser`**: Parses incoming HTTP requests from byte buffers
//! - **`request`**: HTTP request representation and parsing utilities
//! - **`query`**: Query-string parsing and encoding
//! - **`context`**: The per-request context handed to route handlers
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes and writes HTTP responses to the client
//!
//! # Request flow
//!
//! ```text
//!   bytes ──► parser ──► Request ──► RequestContext ──► handler
//!                                          │
//!                          Response ◄──────┘
//!                             │
//!                          writer ──► socket (then shut down)
//! ```

pub mod context;
pub mod parser;
pub mod query;
pub mod request;
pub mod response;
pub mod writer;

pub use context::{ContextError, RequestContext, ResponseHandle};
pub use request::{Method, Request};
pub use response::{Response, StatusCode};
