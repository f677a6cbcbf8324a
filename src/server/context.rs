//! Per-connection capability for sending responses and closing.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::codec::Outbound;
use crate::error::{Result, XrdError};
use crate::protocol::{ErrorCode, Response, ServerRole, StreamId};

/// Static facts about a physical connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Local socket address, if known
    pub local_addr: Option<SocketAddr>,
    /// Remote socket address, if known
    pub peer_addr: Option<SocketAddr>,
    /// Role announced to the client
    pub role: ServerRole,
}

/// Cheap-clone handle shared by the dispatcher, logical streams and listeners.
#[derive(Clone)]
pub struct ConnectionContext {
    tx: mpsc::UnboundedSender<Outbound>,
    close: Arc<watch::Sender<bool>>,
    info: Arc<ConnectionInfo>,
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("info", &self.info)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionContext {
    /// Create a context together with the receiving end of its outbound queue.
    pub fn channel(info: ConnectionInfo) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (close, _) = watch::channel(false);
        let cx = Self {
            tx,
            close: Arc::new(close),
            info: Arc::new(info),
        };
        (cx, rx)
    }

    /// Connection facts
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Queue a typed response.
    pub fn respond(&self, response: Response) -> Result<()> {
        self.tx
            .send(Outbound::Response(response))
            .map_err(|_| XrdError::ConnectionClosed)
    }

    /// Queue raw, already framed bytes.
    pub fn send_raw(&self, bytes: Bytes) -> Result<()> {
        self.tx
            .send(Outbound::Raw(bytes))
            .map_err(|_| XrdError::ConnectionClosed)
    }

    /// Queue an error response.
    pub fn respond_with_error(
        &self,
        stream_id: StreamId,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<()> {
        self.respond(Response::error(stream_id, code, message))
    }

    /// Answer a failed request from its error value.
    pub fn respond_with(&self, stream_id: StreamId, err: &XrdError) -> Result<()> {
        self.respond_with_error(stream_id, err.error_code(), err.client_message())
    }

    /// Send an error, then close the connection.
    pub fn close_with_error(
        &self,
        stream_id: StreamId,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<()> {
        let message = message.into();
        debug!(stream_id, ?code, %message, "Closing connection with error");
        let sent = self.respond_with_error(stream_id, code, message);
        self.close();
        sent
    }

    /// Ask the connection to shut down.
    pub fn close(&self) {
        self.close.send_replace(true);
    }

    /// Whether close was requested
    pub fn is_closed(&self) -> bool {
        *self.close.borrow()
    }

    /// Watch for a close request.
    pub fn subscribe_close(&self) -> watch::Receiver<bool> {
        self.close.subscribe()
    }
}
