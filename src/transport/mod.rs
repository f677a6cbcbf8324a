//! Transport layer: accepting physical connections.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TcpTransport (accept loop)        │
//! └──────────────────┬──────────────────────┘
//!                    │ one task per socket
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │   Connection    │ │   Connection    │
//! │ (HandlerFactory)│ │ (HandlerFactory)│
//! └─────────────────┘ └─────────────────┘
//! ```

mod tcp;

pub use tcp::TcpTransport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::server::{ConnectionConfig, HandlerFactory};

/// Transport trait for pluggable network backends.
pub trait Transport: Send + Sync {
    /// Accept connections and serve each with a handler from `factory`.
    ///
    /// Runs until the listener fails.
    fn serve(
        &self,
        config: ConnectionConfig,
        factory: Arc<dyn HandlerFactory>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;

    /// Get the listen address as a string.
    fn listen_addr(&self) -> String;
}
