//! xrootd engine error types.
//!
//! # Error Classes
//!
//! Errors fall into three groups that the connection treats differently:
//!
//! - **Fatal framing/handshake errors** (`HandshakeRejected`, `FrameTooLarge`,
//!   `Protocol`, `Io`): the physical connection is closed, nothing is sent.
//! - **Recoverable session errors** (`TooManyLogicalStreams`, `Wire`): the client
//!   receives a typed error response and the connection stays open.
//! - **Back-end errors** (`Storage`): carry an internal result code that is
//!   translated through [`ErrorCode::from`] before it reaches the wire.

use thiserror::Error;

use crate::protocol::{ErrorCode, InternalCode};

/// xrootd engine errors.
#[derive(Error, Debug)]
pub enum XrdError {
    /// Protocol-level violation on the physical connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The first bytes on the connection were not a valid handshake.
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// A request frame announced a body outside the accepted range.
    #[error("Frame body of {length} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge {
        /// Announced body length.
        length: i64,
        /// Configured maximum.
        limit: usize,
    },

    /// Admission control refused a new logical stream or dedicated open.
    #[error("Too many logical streams (limit {limit})")]
    TooManyLogicalStreams {
        /// Configured stream limit.
        limit: usize,
    },

    /// A handler wants to answer with a specific wire error code.
    #[error("{message}")]
    Wire {
        /// Wire error code sent to the client.
        code: ErrorCode,
        /// Human-readable message.
        message: String,
    },

    /// Failure reported by the storage back end.
    #[error("Storage error ({code:?}): {message}")]
    Storage {
        /// Internal result code, mapped to the wire on the way out.
        code: InternalCode,
        /// Human-readable message.
        message: String,
    },

    /// The connection's writer has gone away.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for xrootd operations
pub type Result<T> = std::result::Result<T, XrdError>;

impl XrdError {
    /// Build an error that is answered with the given wire code.
    pub fn wire(code: ErrorCode, message: impl Into<String>) -> Self {
        XrdError::Wire {
            code,
            message: message.into(),
        }
    }

    /// Build a back-end error carrying an internal result code.
    pub fn storage(code: InternalCode, message: impl Into<String>) -> Self {
        XrdError::Storage {
            code,
            message: message.into(),
        }
    }

    /// Default answer for a request code nobody handles.
    pub fn unsupported(request_code: u16) -> Self {
        XrdError::wire(
            ErrorCode::Unsupported,
            format!("Request {} not supported", request_code),
        )
    }

    /// Wire error code used when this error is reported to the client.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            XrdError::Wire { code, .. } => *code,
            XrdError::Storage { code, .. } => ErrorCode::from(*code),
            XrdError::FrameTooLarge { .. } => ErrorCode::ArgTooLong,
            XrdError::Protocol(_) | XrdError::HandshakeRejected(_) => ErrorCode::InvalidRequest,
            XrdError::Io(_) => ErrorCode::IoError,
            XrdError::TooManyLogicalStreams { .. }
            | XrdError::ConnectionClosed
            | XrdError::Config(_) => ErrorCode::ServerError,
        }
    }

    /// Message sent to the client alongside [`XrdError::error_code`].
    pub fn client_message(&self) -> String {
        match self {
            XrdError::Wire { message, .. } | XrdError::Storage { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the error must tear down the physical connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            XrdError::Protocol(_)
                | XrdError::HandshakeRejected(_)
                | XrdError::FrameTooLarge { .. }
                | XrdError::ConnectionClosed
                | XrdError::Io(_)
        )
    }
}

impl From<toml::de::Error> for XrdError {
    fn from(err: toml::de::Error) -> Self {
        XrdError::Config(err.to_string())
    }
}
