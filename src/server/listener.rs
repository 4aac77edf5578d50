use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::routing::Router;
use crate::server::connection::Connection;
use crate::server::prefix::Prefix;
use crate::server::{ServerError, ServerOptions};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Started,
    Stopped,
}

/// An HTTP server bound to one or more prefixes.
///
/// The router is frozen when the server is built. [`start`](Self::start)
/// binds every prefix and spawns one accept loop per listener; each accepted
/// connection is served on its own task so a slow handler never holds up the
/// accept loop.
pub struct Server {
    prefixes: Vec<Prefix>,
    router: Arc<Router>,
    options: Arc<ServerOptions>,
    state: ServerState,
    shutdown: watch::Sender<bool>,
    accept_loops: Vec<JoinHandle<()>>,
    local_addrs: Vec<SocketAddr>,
}

impl Server {
    pub fn new<I, S>(prefixes: I, router: Router) -> Result<Self, ServerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(|p| Prefix::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if prefixes.is_empty() {
            return Err(ServerError::NoPrefixes);
        }

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            prefixes,
            router: Arc::new(router),
            options: Arc::new(ServerOptions::default()),
            state: ServerState::Created,
            shutdown,
            accept_loops: Vec::new(),
            local_addrs: Vec::new(),
        })
    }

    pub fn with_options(mut self, options: ServerOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn prefixes(&self) -> &[Prefix] {
        &self.prefixes
    }

    /// Addresses actually bound, in prefix order. Empty until started.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Binds every prefix, then starts accepting.
    ///
    /// Nothing is accepted unless all binds succeed.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        match self.state {
            ServerState::Created => {}
            ServerState::Started => return Err(ServerError::AlreadyStarted),
            ServerState::Stopped => return Err(ServerError::Stopped),
        }

        let mut listeners = Vec::with_capacity(self.prefixes.len());
        for prefix in &self.prefixes {
            let addr = prefix.bind_addr();
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: addr.clone(),
                    source,
                })?;
            let local = listener
                .local_addr()
                .map_err(|source| ServerError::Bind { addr, source })?;
            info!(prefix = %prefix, addr = %local, "Listening");
            listeners.push((listener, local));
        }

        for (listener, local) in listeners {
            self.local_addrs.push(local);
            self.accept_loops.push(tokio::spawn(accept_loop(
                listener,
                Arc::clone(&self.router),
                Arc::clone(&self.options),
                self.shutdown.subscribe(),
            )));
        }

        self.state = ServerState::Started;
        Ok(())
    }

    /// Stops accepting and releases the listeners.
    ///
    /// Connections already accepted keep running to completion.
    pub async fn stop(&mut self) {
        if self.state == ServerState::Stopped {
            return;
        }

        self.shutdown.send_replace(true);
        for handle in self.accept_loops.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Accept loop ended abnormally");
            }
        }

        self.state = ServerState::Stopped;
        info!("Server stopped");
    }

    /// Starts the server, serves until `signal` completes, then stops.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.stop().await;
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    options: Arc<ServerOptions>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // The listener stays usable (EMFILE, peer reset).
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };
                debug!(peer = %peer, "Accepted connection");

                let router = Arc::clone(&router);
                let options = Arc::clone(&options);
                tokio::spawn(
                    async move {
                        let conn = Connection::new(socket, peer, router, options);
                        if let Err(e) = conn.run().await {
                            tracing::error!(error = %e, "Connection error");
                        }
                    }
                    .instrument(info_span!("connection", peer = %peer)),
                );
            }
        }
    }

    debug!("Accept loop exited");
}
