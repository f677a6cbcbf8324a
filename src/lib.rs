//! # xrootd - server-side engine for the xrootd file access protocol
//!
//! Turns raw TCP connections into validated, typed requests, enforces the
//! protocol handshake, multiplexes logical streams (each with its own open-file
//! table) over one physical connection and hands every request to a pluggable
//! handler. Storage semantics live in the handler; this crate owns the wire,
//! the session state and the ordering guarantees.
//!
//! ## Architecture
//!
//! ```text
//!  TcpTransport ──accept──> Connection
//!                              │
//!             ┌────────────────┼───────────────────────────┐
//!             ▼                ▼                           ▼
//!       FrameDecoder ──> HandshakeGate ──┬──> LogicalStreamManager ──> LogicalStream ──> StreamListener
//!                                        └──> RequestDispatcher ──> RequestHandler
//!                                                        │
//!                    writer task <── ConnectionContext <─┘
//! ```
//!
//! ### Logical stream lifecycle
//!
//! ```text
//!   first request on sid ──> [Active] ── add_file ──> [Active, files > 0]
//!                                                          │
//!                            remove_file empties the table │
//!                            (no open in flight, no queue) │
//!                                                          ▼
//!                                                     [Retired]
//!
//!   every stream is also retired on connection close
//! ```
//!
//! ### Session policies
//!
//! | Policy        | File operations go to            | Limit                       |
//! |---------------|----------------------------------|-----------------------------|
//! | `Multiplexed` | one `LogicalStream` per sid      | `max_streams` (default 100) |
//! | `Dedicated`   | pseudo-stream 0                  | one open file at a time     |
//! | `Direct`      | the connection's request handler | none                        |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xrootd::{BaseHandlerFactory, Config, TcpTransport, Transport};
//!
//! let config = Config::from_env().server_config()?;
//! let transport = TcpTransport::new(config.addr);
//! transport.serve(config.connection, Arc::new(BaseHandlerFactory)).await?;
//! ```
//!
//! A storage back end implements [`StreamListener`] for file operations,
//! [`RequestHandler`] for the rest and a [`HandlerFactory`] that builds one
//! handler per connection.
//!
//! ## Modules
//!
//! - [`protocol`]: wire types, handshake gate and error codes
//! - [`codec`]: request framing and response encoding
//! - [`session`]: logical streams and open-file tables
//! - [`server`]: per-connection driver and request dispatch
//! - [`transport`]: TCP accept loop
//! - [`config`]: configuration management
//! - [`error`]: error types and result aliases

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use codec::{FrameDecoder, Outbound, ResponseEncoder};
pub use config::Config;
pub use error::{Result, XrdError};
pub use protocol::{
    ErrorCode, FileHandle, HandshakeGate, OpenFlags, Request, RequestKind, Response, ServerRole,
    StreamId,
};
pub use server::{
    BaseHandlerFactory, Connection, ConnectionConfig, ConnectionContext, ConnectionHandler,
    ConnectionInfo, HandlerFactory, RequestDispatcher, RequestHandler, ServerConfig,
};
pub use session::{LogicalStream, LogicalStreamManager, SessionPolicy, StreamListener};
pub use transport::{TcpTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
