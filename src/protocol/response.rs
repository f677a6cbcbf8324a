//! Typed xrootd responses.
//!
//! A response is an 8-byte header (`streamid[2] status[2] dlen[4]`) followed by a
//! status-specific body. [`Response::serialize`] writes a zero placeholder into
//! `dlen`; the [`ResponseEncoder`](crate::codec::ResponseEncoder) patches it just
//! before the frame hits the socket.

use std::fmt;
use std::net::SocketAddr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error_code::ErrorCode;
use super::handshake::ServerRole;
use super::request::{FileHandle, StreamId};
use super::RESPONSE_HEADER_SIZE;

/// Status for a successful response
pub const STATUS_OK: u16 = 0;
/// Status for an error response
pub const STATUS_ERROR: u16 = 4003;

/// Stat record sent for `kXR_stat` and open-with-retstat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatInfo {
    /// Opaque file id
    pub id: i64,
    /// Size in bytes
    pub size: i64,
    /// `kXR_*` stat flags
    pub flags: i32,
    /// Modification time, seconds since the epoch
    pub modified: i64,
}

impl fmt::Display for StatInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.id, self.size, self.flags, self.modified)
    }
}

/// Access granted at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationAccess {
    /// Read only
    Read,
    /// Read/write
    ReadWrite,
}

/// One entry of a locate response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Role of the node at `address`
    pub role: ServerRole,
    pub access: LocationAccess,
    pub address: SocketAddr,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = match self.role {
            ServerRole::DataServer => 'S',
            ServerRole::LoadBalancer => 'M',
        };
        let access = match self.access {
            LocationAccess::Read => 'r',
            LocationAccess::ReadWrite => 'w',
        };
        write!(f, "{}{}{}", node, access, self.address)
    }
}

/// Any response the engine sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Plain success without a body
    Ok { stream_id: StreamId },
    /// Error with a wire code and message
    Error {
        stream_id: StreamId,
        code: ErrorCode,
        message: String,
    },
    /// Successful open
    Open {
        stream_id: StreamId,
        handle: FileHandle,
        /// Present when the client asked for stat information
        stat: Option<StatInfo>,
    },
    /// Opaque payload (read, readv, query replies)
    Data { stream_id: StreamId, data: Bytes },
    /// `kXR_stat` reply
    Stat { stream_id: StreamId, info: StatInfo },
    /// `kXR_statx` reply, one flag byte per requested path
    Statx { stream_id: StreamId, flags: Vec<u8> },
    /// `kXR_protocol` reply
    Protocol {
        stream_id: StreamId,
        version: i32,
        flags: i32,
    },
    /// `kXR_locate` reply
    Locate {
        stream_id: StreamId,
        locations: Vec<Location>,
    },
}

impl Response {
    /// Plain success
    pub fn ok(stream_id: StreamId) -> Self {
        Response::Ok { stream_id }
    }

    /// Error response
    pub fn error(stream_id: StreamId, code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            stream_id,
            code,
            message: message.into(),
        }
    }

    /// Stream the response is addressed to.
    pub fn stream_id(&self) -> StreamId {
        match self {
            Response::Ok { stream_id }
            | Response::Error { stream_id, .. }
            | Response::Open { stream_id, .. }
            | Response::Data { stream_id, .. }
            | Response::Stat { stream_id, .. }
            | Response::Statx { stream_id, .. }
            | Response::Protocol { stream_id, .. }
            | Response::Locate { stream_id, .. } => *stream_id,
        }
    }

    /// Wire status field
    pub fn status(&self) -> u16 {
        match self {
            Response::Error { .. } => STATUS_ERROR,
            _ => STATUS_OK,
        }
    }

    /// Serialize with a zero length placeholder.
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(RESPONSE_HEADER_SIZE + 32);
        buf.put_u16(self.stream_id());
        buf.put_u16(self.status());
        buf.put_i32(0);

        match self {
            Response::Ok { .. } => {},
            Response::Error { code, message, .. } => {
                buf.put_i32(code.as_i32());
                buf.put_slice(message.as_bytes());
                buf.put_u8(0);
            },
            Response::Open { handle, stat, .. } => {
                buf.put_slice(&handle.to_bytes());
                if let Some(info) = stat {
                    // cpsize and cptype, unused
                    buf.put_slice(&[0u8; 8]);
                    put_c_string(&mut buf, &info.to_string());
                }
            },
            Response::Data { data, .. } => buf.put_slice(data),
            Response::Stat { info, .. } => put_c_string(&mut buf, &info.to_string()),
            Response::Statx { flags, .. } => buf.put_slice(flags),
            Response::Protocol { version, flags, .. } => {
                buf.put_i32(*version);
                buf.put_i32(*flags);
            },
            Response::Locate { locations, .. } => {
                let text = locations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                put_c_string(&mut buf, &text);
            },
        }
        buf
    }
}

fn put_c_string(buf: &mut BytesMut, text: &str) {
    buf.put_slice(text.as_bytes());
    buf.put_u8(0);
}

/// A response frame as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub stream_id: StreamId,
    pub status: u16,
    pub body: Bytes,
}

impl ResponseFrame {
    /// Split one complete frame off the front of `buf`, if present.
    pub fn split_from(buf: &mut BytesMut) -> Option<Self> {
        if buf.len() < RESPONSE_HEADER_SIZE {
            return None;
        }
        let dlen = i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let total = RESPONSE_HEADER_SIZE + usize::try_from(dlen).ok()?;
        if buf.len() < total {
            return None;
        }
        let mut frame = buf.split_to(total);
        let stream_id = frame.get_u16();
        let status = frame.get_u16();
        frame.advance(4);
        Some(Self {
            stream_id,
            status,
            body: frame.freeze(),
        })
    }

    /// Whether the status is an error
    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }

    /// Wire code and message of an error frame.
    pub fn error(&self) -> Option<(ErrorCode, String)> {
        if !self.is_error() || self.body.len() < 4 {
            return None;
        }
        let code = ErrorCode::from_i32(i32::from_be_bytes([
            self.body[0],
            self.body[1],
            self.body[2],
            self.body[3],
        ]))?;
        let message = String::from_utf8_lossy(&self.body[4..])
            .trim_end_matches('\0')
            .to_string();
        Some((code, message))
    }
}
