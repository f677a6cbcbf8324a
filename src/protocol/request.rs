//! Typed xrootd requests.
//!
//! Every post-handshake request shares a 24-byte header:
//!
//! ```text
//! 0      2          4                          20        24
//! +------+----------+--------------------------+---------+-------------+
//! | sid  | req code | request parameters (16)  | dlen    | body (dlen) |
//! +------+----------+--------------------------+---------+-------------+
//! ```
//!
//! [`Request::parse`] turns one complete frame into a [`Request`];
//! [`Request::encode`] is the inverse, used by clients and tests.

use std::collections::HashMap;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::flags::OpenFlags;
use super::{BODY_LENGTH_OFFSET, REQUEST_HEADER_SIZE};

/// Logical stream identifier carried in every frame.
pub type StreamId = u16;

/// Opaque 4-byte file handle handed to the client on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(u32);

impl FileHandle {
    /// Create from a numeric handle
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Numeric value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Interpret four wire bytes
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    /// Wire representation
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Request kinds with their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Initial handshake (no header)
    Handshake,
    /// kXR_login
    Login,
    /// kXR_prepare
    Prepare,
    /// kXR_open
    Open,
    /// kXR_stat
    Stat,
    /// kXR_statx
    Statx,
    /// kXR_read
    Read,
    /// kXR_readv
    ReadV,
    /// kXR_write
    Write,
    /// kXR_sync
    Sync,
    /// kXR_close
    Close,
    /// kXR_protocol
    Protocol,
    /// kXR_auth
    Authentication,
    /// kXR_locate
    Locate,
    /// kXR_set
    Set,
    /// Anything else
    Unknown,
}

#[allow(missing_docs)]
impl RequestKind {
    pub const AUTH: u16 = 3000;
    pub const CLOSE: u16 = 3003;
    pub const PROTOCOL: u16 = 3006;
    pub const LOGIN: u16 = 3007;
    pub const OPEN: u16 = 3010;
    pub const READ: u16 = 3013;
    pub const SYNC: u16 = 3016;
    pub const STAT: u16 = 3017;
    pub const SET: u16 = 3018;
    pub const WRITE: u16 = 3019;
    pub const PREPARE: u16 = 3021;
    pub const STATX: u16 = 3022;
    pub const READV: u16 = 3025;
    pub const LOCATE: u16 = 3027;

    /// Kind for a wire request code; unrecognized codes are [`RequestKind::Unknown`].
    pub fn from_code(code: u16) -> Self {
        match code {
            Self::AUTH => RequestKind::Authentication,
            Self::CLOSE => RequestKind::Close,
            Self::PROTOCOL => RequestKind::Protocol,
            Self::LOGIN => RequestKind::Login,
            Self::OPEN => RequestKind::Open,
            Self::READ => RequestKind::Read,
            Self::SYNC => RequestKind::Sync,
            Self::STAT => RequestKind::Stat,
            Self::SET => RequestKind::Set,
            Self::WRITE => RequestKind::Write,
            Self::PREPARE => RequestKind::Prepare,
            Self::STATX => RequestKind::Statx,
            Self::READV => RequestKind::ReadV,
            Self::LOCATE => RequestKind::Locate,
            _ => RequestKind::Unknown,
        }
    }

    /// Wire code, if the kind has one
    pub fn code(&self) -> Option<u16> {
        match self {
            RequestKind::Authentication => Some(Self::AUTH),
            RequestKind::Close => Some(Self::CLOSE),
            RequestKind::Protocol => Some(Self::PROTOCOL),
            RequestKind::Login => Some(Self::LOGIN),
            RequestKind::Open => Some(Self::OPEN),
            RequestKind::Read => Some(Self::READ),
            RequestKind::Sync => Some(Self::SYNC),
            RequestKind::Stat => Some(Self::STAT),
            RequestKind::Set => Some(Self::SET),
            RequestKind::Write => Some(Self::WRITE),
            RequestKind::Prepare => Some(Self::PREPARE),
            RequestKind::Statx => Some(Self::STATX),
            RequestKind::ReadV => Some(Self::READV),
            RequestKind::Locate => Some(Self::LOCATE),
            RequestKind::Handshake | RequestKind::Unknown => None,
        }
    }

    /// Protocol name, e.g. `kXR_open`
    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::Handshake => "handshake",
            RequestKind::Login => "kXR_login",
            RequestKind::Prepare => "kXR_prepare",
            RequestKind::Open => "kXR_open",
            RequestKind::Stat => "kXR_stat",
            RequestKind::Statx => "kXR_statx",
            RequestKind::Read => "kXR_read",
            RequestKind::ReadV => "kXR_readv",
            RequestKind::Write => "kXR_write",
            RequestKind::Sync => "kXR_sync",
            RequestKind::Close => "kXR_close",
            RequestKind::Protocol => "kXR_protocol",
            RequestKind::Authentication => "kXR_auth",
            RequestKind::Locate => "kXR_locate",
            RequestKind::Set => "kXR_set",
            RequestKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw client handshake bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Payload exactly as received
    pub payload: Bytes,
}

/// kXR_login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub stream_id: StreamId,
    /// Client process id
    pub pid: i32,
    /// User name (NUL padding stripped)
    pub username: String,
    /// Client capability version
    pub capability_version: u8,
    /// Requested role
    pub role: u8,
    /// Login token
    pub token: Bytes,
}

/// kXR_prepare
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareRequest {
    pub stream_id: StreamId,
    pub options: u8,
    pub priority: u8,
    /// Newline separated paths
    pub paths: Vec<String>,
}

/// kXR_open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub stream_id: StreamId,
    /// Unix-style permission bits for newly created files
    pub mode: u16,
    pub flags: OpenFlags,
    pub path: String,
    /// Everything after the first `?` in the requested path
    pub opaque: Option<String>,
}

impl OpenRequest {
    /// Opaque `key=value&key=value` pairs appended to the path.
    pub fn opaque_map(&self) -> HashMap<String, String> {
        self.opaque.as_deref().map(parse_opaque).unwrap_or_default()
    }
}

/// kXR_stat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRequest {
    pub stream_id: StreamId,
    pub options: u8,
    pub path: String,
}

/// kXR_statx
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatxRequest {
    pub stream_id: StreamId,
    pub paths: Vec<String>,
}

/// kXR_read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub stream_id: StreamId,
    pub handle: FileHandle,
    pub offset: i64,
    pub length: i32,
}

/// One element of a vector read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSegment {
    pub handle: FileHandle,
    pub length: i32,
    pub offset: i64,
}

/// Size of one encoded [`ReadSegment`]
pub const READ_SEGMENT_SIZE: usize = 16;

/// kXR_readv
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadVRequest {
    pub stream_id: StreamId,
    pub segments: Vec<ReadSegment>,
}

/// kXR_write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub stream_id: StreamId,
    pub handle: FileHandle,
    pub offset: i64,
    pub data: Bytes,
}

/// kXR_sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub stream_id: StreamId,
    pub handle: FileHandle,
}

/// kXR_close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub stream_id: StreamId,
    pub handle: FileHandle,
}

/// kXR_protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolRequest {
    pub stream_id: StreamId,
    pub client_version: i32,
}

/// kXR_auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRequest {
    pub stream_id: StreamId,
    /// Credential type, e.g. `gsi` or `unix`
    pub credential_type: String,
    pub credential: Bytes,
}

/// kXR_locate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateRequest {
    pub stream_id: StreamId,
    pub options: u16,
    pub path: String,
}

/// kXR_set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetRequest {
    pub stream_id: StreamId,
    pub data: String,
}

impl SetRequest {
    /// Text following an `appid ` prefix, if this is an application id.
    pub fn appid(&self) -> Option<&str> {
        self.data.strip_prefix("appid ")
    }
}

/// A request whose code is not in the decode switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRequest {
    pub stream_id: StreamId,
    pub request_code: u16,
    pub body: Bytes,
}

/// Any request the engine can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Handshake(HandshakeRequest),
    Login(LoginRequest),
    Prepare(PrepareRequest),
    Open(OpenRequest),
    Stat(StatRequest),
    Statx(StatxRequest),
    Read(ReadRequest),
    ReadV(ReadVRequest),
    Write(WriteRequest),
    Sync(SyncRequest),
    Close(CloseRequest),
    Protocol(ProtocolRequest),
    Authentication(AuthenticationRequest),
    Locate(LocateRequest),
    Set(SetRequest),
    Unknown(UnknownRequest),
}

impl Request {
    /// Stream the request belongs to (0 for the handshake).
    pub fn stream_id(&self) -> StreamId {
        match self {
            Request::Handshake(_) => 0,
            Request::Login(r) => r.stream_id,
            Request::Prepare(r) => r.stream_id,
            Request::Open(r) => r.stream_id,
            Request::Stat(r) => r.stream_id,
            Request::Statx(r) => r.stream_id,
            Request::Read(r) => r.stream_id,
            Request::ReadV(r) => r.stream_id,
            Request::Write(r) => r.stream_id,
            Request::Sync(r) => r.stream_id,
            Request::Close(r) => r.stream_id,
            Request::Protocol(r) => r.stream_id,
            Request::Authentication(r) => r.stream_id,
            Request::Locate(r) => r.stream_id,
            Request::Set(r) => r.stream_id,
            Request::Unknown(r) => r.stream_id,
        }
    }

    /// Kind of the request
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Handshake(_) => RequestKind::Handshake,
            Request::Login(_) => RequestKind::Login,
            Request::Prepare(_) => RequestKind::Prepare,
            Request::Open(_) => RequestKind::Open,
            Request::Stat(_) => RequestKind::Stat,
            Request::Statx(_) => RequestKind::Statx,
            Request::Read(_) => RequestKind::Read,
            Request::ReadV(_) => RequestKind::ReadV,
            Request::Write(_) => RequestKind::Write,
            Request::Sync(_) => RequestKind::Sync,
            Request::Close(_) => RequestKind::Close,
            Request::Protocol(_) => RequestKind::Protocol,
            Request::Authentication(_) => RequestKind::Authentication,
            Request::Locate(_) => RequestKind::Locate,
            Request::Set(_) => RequestKind::Set,
            Request::Unknown(_) => RequestKind::Unknown,
        }
    }

    /// Wire request code (0 for the handshake).
    pub fn request_code(&self) -> u16 {
        match self {
            Request::Unknown(r) => r.request_code,
            other => other.kind().code().unwrap_or(0),
        }
    }

    /// Whether the request operates on the open-file table of a logical stream.
    pub fn is_file_operation(&self) -> bool {
        matches!(
            self,
            Request::Open(_)
                | Request::Stat(_)
                | Request::Read(_)
                | Request::ReadV(_)
                | Request::Write(_)
                | Request::Sync(_)
                | Request::Close(_)
        )
    }

    /// Parse one complete post-handshake frame (header plus body).
    ///
    /// Everything past the 24-byte header is the body, whatever `dlen` says.
    /// Returns `None` for a frame shorter than the header.
    pub fn parse(frame: Bytes) -> Option<Request> {
        let mut header = [0u8; REQUEST_HEADER_SIZE];
        header.copy_from_slice(frame.get(..REQUEST_HEADER_SIZE)?);
        let body = frame.slice(REQUEST_HEADER_SIZE..);

        let stream_id = be_u16(&header, 0);
        let request_code = be_u16(&header, 2);

        let request = match RequestKind::from_code(request_code) {
            RequestKind::Login => Request::Login(LoginRequest {
                stream_id,
                pid: be_i32(&header, 4),
                username: nul_trimmed(&header[8..16]),
                capability_version: header[18],
                role: header[19],
                token: body,
            }),
            RequestKind::Prepare => Request::Prepare(PrepareRequest {
                stream_id,
                options: header[4],
                priority: header[5],
                paths: split_paths(&body),
            }),
            RequestKind::Open => {
                let (path, opaque) = split_opaque(&lossy(&body));
                Request::Open(OpenRequest {
                    stream_id,
                    mode: be_u16(&header, 4),
                    flags: OpenFlags::from_bits(be_u16(&header, 6)),
                    path,
                    opaque,
                })
            },
            RequestKind::Stat => Request::Stat(StatRequest {
                stream_id,
                options: header[4],
                path: split_opaque(&lossy(&body)).0,
            }),
            RequestKind::Statx => Request::Statx(StatxRequest {
                stream_id,
                paths: split_paths(&body),
            }),
            RequestKind::Read => Request::Read(ReadRequest {
                stream_id,
                handle: handle_at(&header, 4),
                offset: be_i64(&header, 8),
                length: be_i32(&header, 16),
            }),
            RequestKind::ReadV => Request::ReadV(ReadVRequest {
                stream_id,
                segments: body
                    .chunks_exact(READ_SEGMENT_SIZE)
                    .map(|chunk| ReadSegment {
                        handle: handle_at(chunk, 0),
                        length: be_i32(chunk, 4),
                        offset: be_i64(chunk, 8),
                    })
                    .collect(),
            }),
            RequestKind::Write => Request::Write(WriteRequest {
                stream_id,
                handle: handle_at(&header, 4),
                offset: be_i64(&header, 8),
                data: body,
            }),
            RequestKind::Sync => Request::Sync(SyncRequest {
                stream_id,
                handle: handle_at(&header, 4),
            }),
            RequestKind::Close => Request::Close(CloseRequest {
                stream_id,
                handle: handle_at(&header, 4),
            }),
            RequestKind::Protocol => Request::Protocol(ProtocolRequest {
                stream_id,
                client_version: be_i32(&header, 4),
            }),
            RequestKind::Authentication => Request::Authentication(AuthenticationRequest {
                stream_id,
                credential_type: nul_trimmed(&header[16..20]),
                credential: body,
            }),
            RequestKind::Locate => Request::Locate(LocateRequest {
                stream_id,
                options: be_u16(&header, 4),
                path: split_opaque(&lossy(&body)).0,
            }),
            RequestKind::Set => Request::Set(SetRequest {
                stream_id,
                data: lossy(&body).trim_end_matches('\0').to_string(),
            }),
            RequestKind::Handshake | RequestKind::Unknown => Request::Unknown(UnknownRequest {
                stream_id,
                request_code,
                body,
            }),
        };
        Some(request)
    }

    /// Encode the request the way a client puts it on the wire.
    pub fn encode(&self) -> BytesMut {
        let mut params = [0u8; 16];
        let (code, body): (u16, Bytes) = match self {
            Request::Handshake(r) => return BytesMut::from(&r.payload[..]),
            Request::Login(r) => {
                params[0..4].copy_from_slice(&r.pid.to_be_bytes());
                let name = r.username.as_bytes();
                let n = name.len().min(8);
                params[4..4 + n].copy_from_slice(&name[..n]);
                params[14] = r.capability_version;
                params[15] = r.role;
                (RequestKind::LOGIN, r.token.clone())
            },
            Request::Prepare(r) => {
                params[0] = r.options;
                params[1] = r.priority;
                (RequestKind::PREPARE, Bytes::from(r.paths.join("\n")))
            },
            Request::Open(r) => {
                params[0..2].copy_from_slice(&r.mode.to_be_bytes());
                params[2..4].copy_from_slice(&r.flags.bits().to_be_bytes());
                let path = match &r.opaque {
                    Some(opaque) => format!("{}?{}", r.path, opaque),
                    None => r.path.clone(),
                };
                (RequestKind::OPEN, Bytes::from(path))
            },
            Request::Stat(r) => {
                params[0] = r.options;
                (RequestKind::STAT, Bytes::from(r.path.clone()))
            },
            Request::Statx(r) => (RequestKind::STATX, Bytes::from(r.paths.join("\n"))),
            Request::Read(r) => {
                params[0..4].copy_from_slice(&r.handle.to_bytes());
                params[4..12].copy_from_slice(&r.offset.to_be_bytes());
                params[12..16].copy_from_slice(&r.length.to_be_bytes());
                (RequestKind::READ, Bytes::new())
            },
            Request::ReadV(r) => {
                let mut body = BytesMut::with_capacity(r.segments.len() * READ_SEGMENT_SIZE);
                for segment in &r.segments {
                    body.put_slice(&segment.handle.to_bytes());
                    body.put_i32(segment.length);
                    body.put_i64(segment.offset);
                }
                (RequestKind::READV, body.freeze())
            },
            Request::Write(r) => {
                params[0..4].copy_from_slice(&r.handle.to_bytes());
                params[4..12].copy_from_slice(&r.offset.to_be_bytes());
                (RequestKind::WRITE, r.data.clone())
            },
            Request::Sync(r) => {
                params[0..4].copy_from_slice(&r.handle.to_bytes());
                (RequestKind::SYNC, Bytes::new())
            },
            Request::Close(r) => {
                params[0..4].copy_from_slice(&r.handle.to_bytes());
                (RequestKind::CLOSE, Bytes::new())
            },
            Request::Protocol(r) => {
                params[0..4].copy_from_slice(&r.client_version.to_be_bytes());
                (RequestKind::PROTOCOL, Bytes::new())
            },
            Request::Authentication(r) => {
                let credtype = r.credential_type.as_bytes();
                let n = credtype.len().min(4);
                params[12..12 + n].copy_from_slice(&credtype[..n]);
                (RequestKind::AUTH, r.credential.clone())
            },
            Request::Locate(r) => {
                params[0..2].copy_from_slice(&r.options.to_be_bytes());
                (RequestKind::LOCATE, Bytes::from(r.path.clone()))
            },
            Request::Set(r) => (RequestKind::SET, Bytes::from(r.data.clone())),
            Request::Unknown(r) => (r.request_code, r.body.clone()),
        };

        let mut frame = BytesMut::with_capacity(REQUEST_HEADER_SIZE + body.len());
        frame.put_u16(self.stream_id());
        frame.put_u16(code);
        frame.put_slice(&params);
        debug_assert_eq!(frame.len(), BODY_LENGTH_OFFSET);
        frame.put_i32(body.len() as i32);
        frame.put_slice(&body);
        frame
    }
}

/// Parse `key=value&key=value` opaque data; tolerates a leading `&` and bare keys.
pub fn parse_opaque(opaque: &str) -> HashMap<String, String> {
    opaque
        .split('&')
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (entry.to_string(), String::new()),
        })
        .collect()
}

fn split_opaque(raw: &str) -> (String, Option<String>) {
    let raw = raw.trim_end_matches('\0');
    match raw.split_once('?') {
        Some((path, opaque)) => (path.to_string(), Some(opaque.to_string())),
        None => (raw.to_string(), None),
    }
}

fn split_paths(body: &[u8]) -> Vec<String> {
    lossy(body)
        .trim_end_matches('\0')
        .split('\n')
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn nul_trimmed(bytes: &[u8]) -> String {
    lossy(bytes).trim_end_matches('\0').to_string()
}

fn handle_at(buf: &[u8], offset: usize) -> FileHandle {
    FileHandle::from_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

pub(crate) fn be_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn be_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn be_i64(buf: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_parse_open_with_opaque() {
        let request = Request::Open(OpenRequest {
            stream_id: 7,
            mode: 0o644,
            flags: OpenFlags::new().with(OpenFlags::NEW),
            path: "/data/a".to_string(),
            opaque: Some("uuid=42&org=x".to_string()),
        });

        let parsed = Request::parse(request.encode().freeze()).unwrap();
        assert_eq!(parsed, request);

        let Request::Open(open) = parsed else {
            panic!("expected open");
        };
        assert_eq!(open.opaque_map().get("uuid"), Some(&"42".to_string()));
    }

    #[test]
    fn test_parse_read_header_fields() {
        // sid=1, kXR_read, fhandle=00000003, offset=4096, rlen=512, dlen=0
        let frame = hex!(
            "0001 0bc5 00000003 0000000000001000 00000200 00000000"
        );
        let parsed = Request::parse(Bytes::copy_from_slice(&frame)).unwrap();
        assert_eq!(
            parsed,
            Request::Read(ReadRequest {
                stream_id: 1,
                handle: FileHandle::new(3),
                offset: 4096,
                length: 512,
            })
        );
    }

    #[test]
    fn test_unknown_code_is_not_an_error() {
        let frame = hex!("0009 0bb9 00000000000000000000000000000000 00000002 abcd");
        let parsed = Request::parse(Bytes::copy_from_slice(&frame)).unwrap();
        assert_eq!(parsed.kind(), RequestKind::Unknown);
        assert_eq!(parsed.stream_id(), 9);
        let Request::Unknown(unknown) = parsed else {
            panic!("expected unknown");
        };
        assert_eq!(unknown.request_code, 3001);
        assert_eq!(&unknown.body[..], &[0xab, 0xcd]);
    }

    #[test]
    fn test_parse_rejects_short_frame() {
        assert!(Request::parse(Bytes::new()).is_none());
        assert!(Request::parse(Bytes::from_static(&[0u8; REQUEST_HEADER_SIZE - 1])).is_none());

        let header_only = Request::parse(Bytes::from_static(&[0u8; REQUEST_HEADER_SIZE]));
        assert_eq!(header_only.map(|r| r.kind()), Some(RequestKind::Unknown));
    }

    #[test]
    fn test_readv_ignores_trailing_partial_segment() {
        let mut body = BytesMut::new();
        body.put_slice(&FileHandle::new(1).to_bytes());
        body.put_i32(100);
        body.put_i64(0);
        body.put_slice(&[1, 2, 3]);

        let mut frame = BytesMut::new();
        frame.put_u16(2);
        frame.put_u16(RequestKind::READV);
        frame.put_slice(&[0u8; 16]);
        frame.put_i32(body.len() as i32);
        frame.put_slice(&body);

        let Some(Request::ReadV(readv)) = Request::parse(frame.freeze()) else {
            panic!("expected readv");
        };
        assert_eq!(readv.segments.len(), 1);
        assert_eq!(readv.segments[0].length, 100);
    }

    #[test]
    fn test_set_appid() {
        let set = SetRequest {
            stream_id: 1,
            data: "appid xrdcp-5.6".to_string(),
        };
        assert_eq!(set.appid(), Some("xrdcp-5.6"));
        let other = SetRequest {
            stream_id: 1,
            data: "monitor on".to_string(),
        };
        assert_eq!(other.appid(), None);
    }

    #[test]
    fn test_file_operation_classification() {
        let close = Request::Close(CloseRequest {
            stream_id: 1,
            handle: FileHandle::new(0),
        });
        let protocol = Request::Protocol(ProtocolRequest {
            stream_id: 1,
            client_version: 0x310,
        });
        assert!(close.is_file_operation());
        assert!(!protocol.is_file_operation());
    }

    #[test]
    fn test_parse_opaque_edge_cases() {
        let map = parse_opaque("&a=1&&flag&b=x=y");
        assert_eq!(map.get("a"), Some(&"1".to_string()));
        assert_eq!(map.get("flag"), Some(&String::new()));
        assert_eq!(map.get("b"), Some(&"x=y".to_string()));
    }
}
