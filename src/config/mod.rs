//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`XROOTD_*`)
//! - CLI arguments (for `xrootd serve`)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XrdError};
use crate::protocol::{ServerRole, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_STREAMS};
use crate::server::{ConnectionConfig, ServerConfig, DEFAULT_PORT};
use crate::session::SessionPolicy;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerSection,

    /// Logical stream configuration
    #[serde(default)]
    pub sessions: SessionSection,

    /// Wire protocol limits
    #[serde(default)]
    pub protocol: ProtocolSection,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| XrdError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| XrdError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location (`<config dir>/xrootd/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("xrootd").join("config.toml"))
    }

    /// Load the default config file if it exists, defaults otherwise
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Override values present in the environment
    pub fn with_env(mut self) -> Self {
        if let Ok(host) = std::env::var("XROOTD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("XROOTD_PORT") {
            self.server.port = port;
        }
        if let Ok(role) = std::env::var("XROOTD_ROLE") {
            match role.as_str() {
                "load-balancer" => self.server.role = ServerRole::LoadBalancer,
                "data-server" => self.server.role = ServerRole::DataServer,
                other => tracing::warn!("Ignoring unknown XROOTD_ROLE {:?}", other),
            }
        }

        if let Ok(mode) = std::env::var("XROOTD_SESSION_MODE") {
            match mode.parse() {
                Ok(mode) => self.sessions.mode = mode,
                Err(e) => tracing::warn!("Ignoring XROOTD_SESSION_MODE: {}", e),
            }
        }
        if let Some(max_streams) = env_parse("XROOTD_MAX_STREAMS") {
            self.sessions.max_streams = max_streams;
        }
        if let Some(secs) = env_parse("XROOTD_IDLE_TIMEOUT_SECS") {
            self.sessions.idle_timeout_secs = secs;
        }

        if let Some(size) = env_parse("XROOTD_MAX_FRAME_SIZE") {
            self.protocol.max_frame_size = size;
        }

        self
    }

    /// Socket address to bind
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server.listen_addr()
    }

    /// Runtime settings handed to every connection
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::default()
            .with_role(self.server.role)
            .with_policy(self.sessions.policy())
            .with_max_frame_size(self.protocol.max_frame_size);
        if self.sessions.idle_timeout_secs > 0 {
            config = config.with_idle_timeout(Duration::from_secs(self.sessions.idle_timeout_secs));
        }
        config
    }

    /// Full server settings
    pub fn server_config(&self) -> Result<ServerConfig> {
        Ok(ServerConfig {
            addr: self.listen_addr()?,
            connection: self.connection_config(),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={:?}", key, value);
            None
        },
    }
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Role announced in the handshake reply
    pub role: ServerRole,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            role: ServerRole::DataServer,
        }
    }
}

impl ServerSection {
    /// Parse host and port into a socket address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| XrdError::Config(format!("Invalid listen address {}:{}: {e}", self.host, self.port)))
    }
}

/// Session mode names accepted in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Many logical streams per connection
    #[default]
    Multiplexed,
    /// One session per connection
    Dedicated,
    /// File operations handled by the connection handler
    Direct,
}

impl std::str::FromStr for SessionMode {
    type Err = XrdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "multiplexed" => Ok(SessionMode::Multiplexed),
            "dedicated" => Ok(SessionMode::Dedicated),
            "direct" => Ok(SessionMode::Direct),
            other => Err(XrdError::Config(format!("Unknown session mode: {other}"))),
        }
    }
}

/// Logical stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// How requests map onto logical streams
    pub mode: SessionMode,

    /// Stream cap in multiplexed mode
    pub max_streams: usize,

    /// Close connections without open files after this many seconds (0 = never)
    pub idle_timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            mode: SessionMode::Multiplexed,
            max_streams: DEFAULT_MAX_STREAMS,
            idle_timeout_secs: 0,
        }
    }
}

impl SessionSection {
    /// Policy for new connections
    pub fn policy(&self) -> SessionPolicy {
        match self.mode {
            SessionMode::Multiplexed => SessionPolicy::Multiplexed {
                max_streams: self.max_streams,
            },
            SessionMode::Dedicated => SessionPolicy::Dedicated,
            SessionMode::Direct => SessionPolicy::Direct,
        }
    }
}

/// Wire protocol limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSection {
    /// Largest accepted request body in bytes
    pub max_frame_size: usize,
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
