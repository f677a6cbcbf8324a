//! TCP transport for xrootd.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use tokio::net::TcpListener;

use super::Transport;
use crate::error::{Result, XrdError};
use crate::server::{Connection, ConnectionConfig, ConnectionInfo, HandlerFactory, DEFAULT_PORT};

/// Plain TCP transport, one task per accepted socket.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// Address to listen on.
    listen_addr: SocketAddr,
}

impl TcpTransport {
    /// Create a new TCP transport.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self { listen_addr }
    }

    /// Create with default localhost address.
    pub fn localhost(port: u16) -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// Serve connections from an already bound listener.
    pub async fn serve_listener(
        listener: TcpListener,
        config: ConnectionConfig,
        factory: Arc<dyn HandlerFactory>,
    ) -> Result<()> {
        let local = listener.local_addr()?;
        tracing::info!(
            "xrootd {} listening on {} ({})",
            config.role(),
            local,
            config.policy
        );

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                },
            };
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
            }

            let info = ConnectionInfo {
                local_addr: socket.local_addr().ok(),
                peer_addr: Some(peer),
                role: config.role(),
            };
            let handler = factory.create(&info);
            let connection = Connection::new(config.clone(), handler, info);

            tracing::debug!("New connection from {}", peer);
            tokio::spawn(async move {
                if let Err(e) = connection.run(socket).await {
                    tracing::debug!("Connection from {} ended: {}", peer, e);
                }
            });
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::localhost(DEFAULT_PORT)
    }
}

impl Transport for TcpTransport {
    fn serve(
        &self,
        config: ConnectionConfig,
        factory: Arc<dyn HandlerFactory>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let addr = self.listen_addr;

        Box::pin(async move {
            let listener = TcpListener::bind(addr).await.map_err(|e| {
                XrdError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to bind TCP to {}: {}", addr, e),
                ))
            })?;
            Self::serve_listener(listener, config, factory).await
        })
    }

    fn name(&self) -> &'static str {
        "TCP"
    }

    fn listen_addr(&self) -> String {
        format!("root://{}", self.listen_addr)
    }
}

impl std::fmt::Display for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name(), self.listen_addr)
    }
}
