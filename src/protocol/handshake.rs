//! Handshake gate.
//!
//! ```text
//!                  Handshake == expected
//! AwaitingHandshake ─────────────────────> Established
//!        │                                     │
//!        │ anything else                       │ every request
//!        v                                     v
//!   abort (no reply)                      passed through
//! ```
//!
//! `Established` is sticky for the life of the connection.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::request::Request;
use super::{CLIENT_HANDSHAKE, PROTOCOL_VERSION};
use crate::error::{Result, XrdError};

/// Role this server plays in an xrootd cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerRole {
    /// Redirector / manager
    LoadBalancer,
    /// Serves file data
    #[default]
    DataServer,
}

impl ServerRole {
    /// `type` field of the handshake reply
    pub fn handshake_type(&self) -> u32 {
        match self {
            ServerRole::LoadBalancer => 0,
            ServerRole::DataServer => 1,
        }
    }

    /// `flags` field of a `kXR_protocol` reply (`kXR_isServer` / `kXR_isManager`).
    pub fn protocol_flags(&self) -> i32 {
        match self {
            ServerRole::LoadBalancer => 2,
            ServerRole::DataServer => 1,
        }
    }

    /// Default handshake reply payload for this role.
    pub fn default_reply(&self) -> Bytes {
        let mut reply = Vec::with_capacity(16);
        // streamid, status
        reply.extend_from_slice(&[0, 0, 0, 0]);
        reply.extend_from_slice(&8u32.to_be_bytes());
        reply.extend_from_slice(&(PROTOCOL_VERSION as u32).to_be_bytes());
        reply.extend_from_slice(&self.handshake_type().to_be_bytes());
        Bytes::from(reply)
    }
}

impl std::fmt::Display for ServerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerRole::LoadBalancer => f.write_str("load-balancer"),
            ServerRole::DataServer => f.write_str("data-server"),
        }
    }
}

/// Handshake constants for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Bytes the client must send first
    pub expected: Bytes,
    /// Configured role
    pub role: ServerRole,
    /// Reply sent when acting as load balancer
    pub load_balancer_reply: Bytes,
    /// Reply sent when acting as data server
    pub data_server_reply: Bytes,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self::for_role(ServerRole::default())
    }
}

impl HandshakeConfig {
    /// Standard constants for the given role
    pub fn for_role(role: ServerRole) -> Self {
        Self {
            expected: Bytes::from_static(&CLIENT_HANDSHAKE),
            role,
            load_balancer_reply: ServerRole::LoadBalancer.default_reply(),
            data_server_reply: ServerRole::DataServer.default_reply(),
        }
    }

    /// Reply for the configured role
    pub fn reply(&self) -> Bytes {
        match self.role {
            ServerRole::LoadBalancer => self.load_balancer_reply.clone(),
            ServerRole::DataServer => self.data_server_reply.clone(),
        }
    }
}

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Nothing but a handshake is accepted
    AwaitingHandshake,
    /// Handshake done
    Established,
}

/// What to do with a request that went through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Send these raw bytes back; the handshake is complete
    Reply(Bytes),
    /// Hand the request to dispatch
    Forward(Request),
}

/// Gates all traffic until a valid handshake has been seen.
#[derive(Debug, Clone)]
pub struct HandshakeGate {
    config: HandshakeConfig,
    state: GateState,
}

impl HandshakeGate {
    /// Create a gate awaiting the handshake
    pub fn new(config: HandshakeConfig) -> Self {
        Self {
            config,
            state: GateState::AwaitingHandshake,
        }
    }

    /// Current state
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Whether the handshake has completed
    pub fn is_established(&self) -> bool {
        self.state == GateState::Established
    }

    /// Run one request through the gate.
    ///
    /// Any error is fatal: the caller closes the connection without replying.
    pub fn accept(&mut self, request: Request) -> Result<GateOutcome> {
        match (self.state, request) {
            (GateState::AwaitingHandshake, Request::Handshake(handshake)) => {
                if handshake.payload != self.config.expected {
                    warn!(
                        received = handshake.payload.len(),
                        "Handshake payload mismatch, closing"
                    );
                    return Err(XrdError::HandshakeRejected(
                        "unexpected handshake payload".to_string(),
                    ));
                }
                self.state = GateState::Established;
                debug!(role = %self.config.role, "Handshake complete");
                Ok(GateOutcome::Reply(self.config.reply()))
            },
            (GateState::AwaitingHandshake, other) => Err(XrdError::HandshakeRejected(format!(
                "{} received before handshake",
                other.kind()
            ))),
            (GateState::Established, Request::Handshake(_)) => Err(XrdError::Protocol(
                "second handshake on established connection".to_string(),
            )),
            (GateState::Established, request) => Ok(GateOutcome::Forward(request)),
        }
    }
}
