//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use super::connection::ConnectionConfig;
use crate::protocol::ServerRole;
use crate::session::SessionPolicy;

/// Default xrootd port
pub const DEFAULT_PORT: u16 = 1094;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub addr: SocketAddr,
    /// Settings handed to every accepted connection
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            connection: ConnectionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create with custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Bind to all interfaces
    pub fn bind_all(mut self) -> Self {
        self.addr = SocketAddr::from(([0, 0, 0, 0], self.addr.port()));
        self
    }

    /// Set address directly
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Set the server role
    pub fn with_role(mut self, role: ServerRole) -> Self {
        self.connection = self.connection.with_role(role);
        self
    }

    /// Set the session policy
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.connection = self.connection.with_policy(policy);
        self
    }

    /// Close connections idle for longer than `timeout`
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.connection = self.connection.with_idle_timeout(timeout);
        self
    }
}
