//! ChatServer acceptor
//!
//! Binds the listening endpoint and spawns one supervised session task
//! per accepted connection. Shutdown is driven by a cancellation token:
//! the accept loop stops, every registered connection is dropped from
//! the registry, and all session tasks are joined before `run` returns.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::{handle_connection, SessionSettings};
use crate::registry::Registry;
use crate::router::Router;

/// Listening chat server
pub struct ChatServer {
    listener: TcpListener,
    router: Router,
    settings: SessionSettings,
    shutdown: CancellationToken,
}

impl ChatServer {
    /// Bind the configured endpoint
    ///
    /// Address reuse and backlog come from `config`.
    pub async fn bind(config: &ServerConfig) -> Result<Self, AppError> {
        let addr = config.resolve_addr().await?;
        let listener = listen(addr, config).map_err(|source| AppError::Bind { addr, source })?;
        info!("Chat server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router: Router::new(Arc::new(Registry::new()))
                .with_send_timeout(config.send_timeout()),
            settings: config.session_settings(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(self.router.registry())
    }

    /// Run the accept loop until shutdown
    pub async fn run(self) -> Result<(), AppError> {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                Some(joined) = sessions.join_next() => {
                    if let Err(e) = joined {
                        error!("Session task panicked: {}", e);
                    }
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("New TCP connection from {}", peer_addr);
                        let router = self.router.clone();
                        let settings = self.settings.clone();
                        let shutdown = self.shutdown.clone();

                        sessions.spawn(async move {
                            if let Err(e) = handle_connection(stream, peer_addr, router, settings, shutdown).await {
                                debug!("Connection {} closed: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        info!("Chat server shutting down");
        drop(self.listener);

        let dropped = self.router.registry().clear();
        debug!("Dropped {} registered client(s)", dropped.len());

        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                error!("Session task panicked: {}", e);
            }
        }

        info!("All sessions closed");
        Ok(())
    }
}

fn listen(addr: SocketAddr, config: &ServerConfig) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(config.reuse_address)?;
    socket.bind(addr)?;
    socket.listen(config.backlog)
}
