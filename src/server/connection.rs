//! One physical connection.
//!
//! ```text
//! socket ──read──> FrameDecoder ──> HandshakeGate ──┬──> LogicalStreamManager (file ops)
//!                                                   └──> RequestDispatcher   (everything else)
//!
//! streams / dispatcher ──> ConnectionContext ──> writer task ──> socket
//! ```
//!
//! The connection ends on EOF, on a fatal framing or handshake error, when a
//! handler asks for close, or after `idle_timeout` without any open file. All
//! logical streams are destroyed on the way out.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use super::context::{ConnectionContext, ConnectionInfo};
use super::dispatch::{ConnectionHandler, RequestDispatcher};
use crate::codec::{spawn_writer_task, FrameDecoder};
use crate::error::{Result, XrdError};
use crate::protocol::{
    GateOutcome, HandshakeConfig, HandshakeGate, Request, ServerRole, DEFAULT_MAX_FRAME_SIZE,
};
use crate::session::{LogicalStreamManager, SessionPolicy};

/// Initial capacity of the read buffer.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// How long queued responses may take to drain after the read side ended.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Handshake constants and role
    pub handshake: HandshakeConfig,
    /// Logical stream policy
    pub policy: SessionPolicy,
    /// Largest accepted request body
    pub max_frame_size: usize,
    /// Close after this long with no open file
    pub idle_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            policy: SessionPolicy::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            idle_timeout: None,
        }
    }
}

impl ConnectionConfig {
    /// Set the server role
    pub fn with_role(mut self, role: ServerRole) -> Self {
        self.handshake.role = role;
        self
    }

    /// Set the session policy
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the maximum request body
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Close idle connections
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Replace the handshake constants
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Role announced to clients
    pub fn role(&self) -> ServerRole {
        self.handshake.role
    }
}

/// Why a connection's read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Eof,
    CloseRequested,
    Idle,
}

/// Drives one physical connection to completion.
pub struct Connection {
    config: ConnectionConfig,
    handler: Arc<dyn ConnectionHandler>,
    info: ConnectionInfo,
}

impl Connection {
    /// Create a connection for an accepted socket
    pub fn new(
        config: ConnectionConfig,
        handler: Arc<dyn ConnectionHandler>,
        info: ConnectionInfo,
    ) -> Self {
        Self {
            config,
            handler,
            info,
        }
    }

    /// Serve `io` until the connection ends.
    pub async fn run<S>(self, io: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        let peer = self.info.peer_addr;
        let (cx, rx) = ConnectionContext::channel(self.info.clone());
        let writer_task = spawn_writer_task(writer, rx);

        let manager = LogicalStreamManager::new(self.config.policy, cx.clone(), self.handler.clone())
            .with_max_segment_size(self.config.max_frame_size);
        let dispatcher = RequestDispatcher::new(self.handler.clone(), cx.clone());

        tracing::debug!(?peer, policy = %self.config.policy, "Connection opened");
        let result = self.read_loop(reader, &cx, &manager, &dispatcher).await;

        manager.destroy_all_streams().await;
        drop(dispatcher);
        drop(manager);
        drop(cx);

        match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer_task).await {
            Ok(Ok(Err(e))) => tracing::debug!(?peer, "Writer ended with error: {}", e),
            Ok(Err(e)) => tracing::error!(?peer, "Writer task failed: {}", e),
            Err(_) => tracing::warn!(?peer, "Responses still queued at close, dropping"),
            Ok(Ok(Ok(()))) => {},
        }

        match &result {
            Ok(exit) => tracing::debug!(?peer, ?exit, "Connection closed"),
            Err(e) => tracing::warn!(?peer, "Connection aborted: {}", e),
        }
        result.map(|_| ())
    }

    async fn read_loop<R>(
        &self,
        mut reader: R,
        cx: &ConnectionContext,
        manager: &LogicalStreamManager,
        dispatcher: &RequestDispatcher,
    ) -> Result<Exit>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let mut decoder = FrameDecoder::new()
            .with_handshake_len(self.config.handshake.expected.len())
            .with_max_frame_size(self.config.max_frame_size);
        let mut gate = HandshakeGate::new(self.config.handshake.clone());
        let mut close = cx.subscribe_close();

        loop {
            let idle = self
                .config
                .idle_timeout
                .filter(|_| gate.is_established() && !manager.has_activity());

            let read = tokio::select! {
                _ = close.changed() => return Ok(Exit::CloseRequested),
                read = read_with_timeout(&mut reader, &mut buf, idle) => read?,
            };

            let Some(n) = read else {
                tracing::info!(peer = ?cx.info().peer_addr, "Closing idling connection without opened files");
                return Ok(Exit::Idle);
            };
            if n == 0 {
                if !gate.is_established() {
                    return Err(XrdError::HandshakeRejected(
                        "connection closed during handshake".to_string(),
                    ));
                }
                return Ok(Exit::Eof);
            }

            while let Some(request) = decoder.decode(&mut buf)? {
                match gate.accept(request)? {
                    GateOutcome::Reply(reply) => cx.send_raw(reply)?,
                    GateOutcome::Forward(request) => {
                        self.route(request, cx, manager, dispatcher).await?;
                    },
                }
                if cx.is_closed() {
                    return Ok(Exit::CloseRequested);
                }
            }
        }
    }

    async fn route(
        &self,
        request: Request,
        cx: &ConnectionContext,
        manager: &LogicalStreamManager,
        dispatcher: &RequestDispatcher,
    ) -> Result<()> {
        if self.config.policy.uses_streams() && request.is_file_operation() {
            let stream_id = request.stream_id();
            if let Err(err) = manager.dispatch(request) {
                cx.respond_with(stream_id, &err)?;
            }
            return Ok(());
        }
        dispatcher.dispatch(request).await
    }
}

/// Read more bytes; `Ok(None)` when `timeout` elapsed first.
async fn read_with_timeout<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    timeout: Option<Duration>,
) -> Result<Option<usize>>
where
    R: AsyncRead + Unpin,
{
    match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, reader.read_buf(buf)).await {
            Ok(read) => Ok(Some(read?)),
            Err(_) => Ok(None),
        },
        None => Ok(Some(reader.read_buf(buf).await?)),
    }
}
