mod catalog;

use std::sync::Arc;

use waypoint::config::Config;
use waypoint::routing::Router;
use waypoint::server::{Server, ServerOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(cfg.logging.max_level())
        .init();

    let mut router = Router::new();
    catalog::register(&mut router, Arc::new(catalog::Catalog::default()))?;

    let server = Server::new(&cfg.server.prefixes, router)?
        .with_options(ServerOptions::from(&cfg.server));

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
