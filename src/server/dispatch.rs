//! Request dispatch: one async hook per request kind.
//!
//! Every hook defaults to `Unsupported`, except three baseline behaviours that a
//! server gets for free:
//!
//! | Request       | Default                                             |
//! |---------------|-----------------------------------------------------|
//! | kXR_protocol  | protocol version plus the configured role flags     |
//! | kXR_locate    | this server as the only location                    |
//! | kXR_set       | `appid <text>` is logged (80 chars max) and acked   |

use std::sync::Arc;

use async_trait::async_trait;

use super::context::{ConnectionContext, ConnectionInfo};
use crate::error::{Result, XrdError};
use crate::protocol::{
    AuthenticationRequest, CloseRequest, ErrorCode, Location, LocationAccess, LocateRequest,
    LoginRequest, OpenRequest, PrepareRequest, ProtocolRequest, ReadRequest, ReadVRequest,
    Request, RequestKind, Response, SetRequest, StatRequest, StatxRequest, StreamId,
    SyncRequest, UnknownRequest, WriteRequest, PROTOCOL_VERSION,
};
use crate::session::StreamListener;

/// Longest appid logged from a kXR_set request.
pub const MAX_APPID_LEN: usize = 80;

/// Connection-level request hooks.
///
/// File operation hooks (`on_open` ... `on_close`) are only reached under the
/// direct session policy; otherwise file operations run through logical streams
/// and their [`StreamListener`].
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// kXR_login
    async fn on_login(&self, _cx: &ConnectionContext, _request: LoginRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::LOGIN))
    }

    /// kXR_open; answer with a file handle on success.
    async fn on_open(&self, _cx: &ConnectionContext, _request: OpenRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::OPEN))
    }

    /// kXR_stat
    async fn on_stat(&self, _cx: &ConnectionContext, _request: StatRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::STAT))
    }

    /// kXR_statx
    async fn on_statx(&self, _cx: &ConnectionContext, _request: StatxRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::STATX))
    }

    /// kXR_read
    async fn on_read(&self, _cx: &ConnectionContext, _request: ReadRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::READ))
    }

    /// kXR_readv
    async fn on_readv(&self, _cx: &ConnectionContext, _request: ReadVRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::READV))
    }

    /// kXR_write
    async fn on_write(&self, _cx: &ConnectionContext, _request: WriteRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::WRITE))
    }

    /// kXR_sync
    async fn on_sync(&self, _cx: &ConnectionContext, _request: SyncRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::SYNC))
    }

    /// kXR_close
    async fn on_close(&self, _cx: &ConnectionContext, _request: CloseRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::CLOSE))
    }

    /// kXR_protocol
    async fn on_protocol(&self, cx: &ConnectionContext, request: ProtocolRequest) -> Result<()> {
        respond_protocol(cx, &request)
    }

    /// kXR_prepare
    async fn on_prepare(&self, _cx: &ConnectionContext, _request: PrepareRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::PREPARE))
    }

    /// kXR_auth, called once per credential exchange.
    async fn on_authentication(
        &self,
        _cx: &ConnectionContext,
        _request: AuthenticationRequest,
    ) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::AUTH))
    }

    /// kXR_locate
    async fn on_locate(&self, cx: &ConnectionContext, request: LocateRequest) -> Result<()> {
        respond_locate(cx, &request)
    }

    /// kXR_set
    async fn on_set(&self, cx: &ConnectionContext, request: SetRequest) -> Result<()> {
        respond_set(cx, &request)
    }

    /// Any request code this crate does not decode.
    async fn on_unknown(&self, _cx: &ConnectionContext, request: UnknownRequest) -> Result<()> {
        Err(XrdError::unsupported(request.request_code))
    }
}

/// Request hooks plus a listener for every new logical stream.
pub trait ConnectionHandler: RequestHandler {
    /// Listener for a logical stream that is about to be created.
    fn handle_new_stream(&self, stream_id: StreamId) -> Arc<dyn StreamListener>;
}

/// Creates one handler per accepted connection.
pub trait HandlerFactory: Send + Sync {
    /// Handler for a freshly accepted connection.
    fn create(&self, info: &ConnectionInfo) -> Arc<dyn ConnectionHandler>;
}

/// Answer kXR_protocol with the protocol version and the server's role.
pub fn respond_protocol(cx: &ConnectionContext, request: &ProtocolRequest) -> Result<()> {
    tracing::debug!(
        stream_id = request.stream_id,
        client_version = request.client_version,
        "Protocol request"
    );
    cx.respond(Response::Protocol {
        stream_id: request.stream_id,
        version: PROTOCOL_VERSION,
        flags: cx.info().role.protocol_flags(),
    })
}

/// Answer kXR_locate with this server as the only location.
pub fn respond_locate(cx: &ConnectionContext, request: &LocateRequest) -> Result<()> {
    let address = cx.info().local_addr.ok_or_else(|| {
        XrdError::wire(ErrorCode::ServerError, "Local address of connection unknown")
    })?;
    cx.respond(Response::Locate {
        stream_id: request.stream_id,
        locations: vec![Location {
            role: cx.info().role,
            access: LocationAccess::ReadWrite,
            address,
        }],
    })
}

/// Log an `appid` set request and acknowledge it.
pub fn respond_set(cx: &ConnectionContext, request: &SetRequest) -> Result<()> {
    let Some(appid) = request.appid() else {
        return Err(XrdError::unsupported(RequestKind::SET));
    };
    let appid: String = appid.chars().take(MAX_APPID_LEN).collect();
    tracing::info!(peer = ?cx.info().peer_addr, %appid, "Client application id");
    cx.respond(Response::ok(request.stream_id))
}

/// Routes requests to a handler's hooks and answers failures.
pub struct RequestDispatcher {
    handler: Arc<dyn ConnectionHandler>,
    cx: ConnectionContext,
}

impl RequestDispatcher {
    /// Create a dispatcher for one connection
    pub fn new(handler: Arc<dyn ConnectionHandler>, cx: ConnectionContext) -> Self {
        Self { handler, cx }
    }

    /// Run the hook for `request`.
    ///
    /// Hook errors become error responses; fatal ones also close the connection.
    pub async fn dispatch(&self, request: Request) -> Result<()> {
        let stream_id = request.stream_id();
        let kind = request.kind();
        let handler = self.handler.as_ref();
        let cx = &self.cx;

        let result = match request {
            Request::Handshake(_) => Err(XrdError::Protocol(
                "handshake after connection was established".to_string(),
            )),
            Request::Login(r) => handler.on_login(cx, r).await,
            Request::Prepare(r) => handler.on_prepare(cx, r).await,
            Request::Open(r) => handler.on_open(cx, r).await,
            Request::Stat(r) => handler.on_stat(cx, r).await,
            Request::Statx(r) => handler.on_statx(cx, r).await,
            Request::Read(r) => handler.on_read(cx, r).await,
            Request::ReadV(r) => handler.on_readv(cx, r).await,
            Request::Write(r) => handler.on_write(cx, r).await,
            Request::Sync(r) => handler.on_sync(cx, r).await,
            Request::Close(r) => handler.on_close(cx, r).await,
            Request::Protocol(r) => handler.on_protocol(cx, r).await,
            Request::Authentication(r) => handler.on_authentication(cx, r).await,
            Request::Locate(r) => handler.on_locate(cx, r).await,
            Request::Set(r) => handler.on_set(cx, r).await,
            Request::Unknown(r) => handler.on_unknown(cx, r).await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(XrdError::ConnectionClosed) => Err(XrdError::ConnectionClosed),
            Err(err) if err.is_fatal() => {
                tracing::warn!(stream_id, kind = %kind, error = %err, "Fatal request error");
                cx.close_with_error(stream_id, err.error_code(), err.client_message())
            },
            Err(err) => {
                tracing::debug!(stream_id, kind = %kind, error = %err, "Request failed");
                cx.respond_with(stream_id, &err)
            },
        }
    }
}
