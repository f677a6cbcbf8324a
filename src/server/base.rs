//! Handler used when no storage back end is plugged in.
//!
//! Accepts login and authentication, keeps the dispatcher's protocol, locate
//! and set defaults, and answers every file operation with `Unsupported`.

use std::sync::Arc;

use async_trait::async_trait;

use super::context::{ConnectionContext, ConnectionInfo};
use super::dispatch::{ConnectionHandler, HandlerFactory, RequestHandler};
use crate::error::Result;
use crate::protocol::{AuthenticationRequest, LoginRequest, Response, StreamId};
use crate::session::StreamListener;

/// Listener without file operations
#[derive(Debug, Default)]
pub struct UnsupportedListener;

#[async_trait]
impl StreamListener for UnsupportedListener {}

/// Connection handler with the baseline behaviour only
#[derive(Debug, Default)]
pub struct BaseHandler {
    info: ConnectionInfo,
}

impl BaseHandler {
    /// Handler for the given connection
    pub fn new(info: ConnectionInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl RequestHandler for BaseHandler {
    async fn on_login(&self, cx: &ConnectionContext, request: LoginRequest) -> Result<()> {
        tracing::info!(
            peer = ?self.info.peer_addr,
            username = %request.username,
            pid = request.pid,
            "Login"
        );
        cx.respond(Response::ok(request.stream_id))
    }

    async fn on_authentication(
        &self,
        cx: &ConnectionContext,
        request: AuthenticationRequest,
    ) -> Result<()> {
        tracing::debug!(credential_type = %request.credential_type, "Authentication accepted");
        cx.respond(Response::ok(request.stream_id))
    }
}

impl ConnectionHandler for BaseHandler {
    fn handle_new_stream(&self, _stream_id: StreamId) -> Arc<dyn StreamListener> {
        Arc::new(UnsupportedListener)
    }
}

/// Factory producing [`BaseHandler`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseHandlerFactory;

impl HandlerFactory for BaseHandlerFactory {
    fn create(&self, info: &ConnectionInfo) -> Arc<dyn ConnectionHandler> {
        Arc::new(BaseHandler::new(info.clone()))
    }
}
