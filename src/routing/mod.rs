//! Request routing.
//!
//! - **`pattern`**: compiles path templates like `/products/{id}` into matchers
//! - **`router`**: the ordered route table and request dispatch

pub mod pattern;
pub mod router;

pub use pattern::{PatternError, RoutePattern};
pub use router::{Handler, HandlerFuture, Route, RouteMatch, Router};
