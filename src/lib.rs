//! Waypoint - a small hand-built HTTP server
//!
//! Core library: HTTP/1.1 protocol handling, template-based routing with path
//! parameters, and a task-per-connection listener.
//!
//! ```ignore
//! use waypoint::http::{RequestContext, StatusCode};
//! use waypoint::routing::Router;
//! use waypoint::server::Server;
//!
//! async fn show(ctx: RequestContext) -> anyhow::Result<()> {
//!     let id = ctx.route_param("id").unwrap_or_default();
//!     ctx.write_html(StatusCode::Ok, format!("product {id}")).await?;
//!     Ok(())
//! }
//!
//! let mut router = Router::new();
//! router.get("/products/{id}", show)?;
//! Server::new(["http://127.0.0.1:8080/"], router)?
//!     .run_until(async { let _ = tokio::signal::ctrl_c().await; })
//!     .await?;
//! ```

pub mod config;
pub mod http;
pub mod routing;
pub mod server;
