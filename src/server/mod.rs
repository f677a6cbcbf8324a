//! xrootd connection handling and request dispatch.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xrootd::server::{BaseHandlerFactory, ServerConfig};
//! use xrootd::transport::{TcpTransport, Transport};
//!
//! let config = ServerConfig::default().with_port(1094);
//! let transport = TcpTransport::new(config.addr);
//! transport.serve(config.connection, Arc::new(BaseHandlerFactory)).await?;
//! ```

mod base;
mod config;
mod connection;
mod context;
mod dispatch;

pub use base::{BaseHandler, BaseHandlerFactory, UnsupportedListener};
pub use config::{ServerConfig, DEFAULT_PORT};
pub use connection::{Connection, ConnectionConfig};
pub use context::{ConnectionContext, ConnectionInfo};
pub use dispatch::{
    respond_locate, respond_protocol, respond_set, ConnectionHandler, HandlerFactory,
    RequestDispatcher, RequestHandler, MAX_APPID_LEN,
};
