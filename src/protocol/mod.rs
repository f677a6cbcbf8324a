//! xrootd wire protocol: requests, responses, handshake and error codes.
//!
//! All integers on the wire are big-endian.
//!
//! ## Connection Flow
//!
//! ```text
//! Client                                   Server
//!    |                                       |
//!    |---- handshake (20 bytes) ----------->|  HandshakeGate
//!    |<--- handshake reply (role) ----------|
//!    |                                       |
//!    |---- kXR_protocol / kXR_login ------->|  RequestDispatcher
//!    |<--- ok -------------------------------|
//!    |                                       |
//!    |---- kXR_open (sid 7) --------------->|  LogicalStream 7
//!    |<--- fhandle --------------------------|
//!    |---- kXR_write / kXR_read ----------->|
//!    |---- kXR_close ---------------------->|  stream 7 retired
//! ```
//!
//! ## Frame Layout
//!
//! | Frame          | Header                                   | Body        |
//! |----------------|------------------------------------------|-------------|
//! | client hello   | none, 20 fixed bytes                     | -           |
//! | request        | `sid[2] code[2] params[16] dlen[4]`      | `dlen` bytes|
//! | response       | `sid[2] status[2] dlen[4]`               | `dlen` bytes|

pub mod error_code;
pub mod flags;
pub mod handshake;
pub mod request;
pub mod response;

pub use error_code::{map_result_code, ErrorCode, InternalCode};
pub use flags::OpenFlags;
pub use handshake::{GateOutcome, GateState, HandshakeConfig, HandshakeGate, ServerRole};
pub use request::{
    AuthenticationRequest, CloseRequest, FileHandle, HandshakeRequest, LocateRequest,
    LoginRequest, OpenRequest, PrepareRequest, ProtocolRequest, ReadRequest, ReadSegment,
    ReadVRequest, Request, RequestKind, SetRequest, StatRequest, StatxRequest, StreamId,
    SyncRequest, UnknownRequest, WriteRequest,
};
pub use response::{
    Location, LocationAccess, Response, ResponseFrame, StatInfo, STATUS_ERROR, STATUS_OK,
};

/// Bytes a client sends to open the conversation.
pub const CLIENT_HANDSHAKE: [u8; CLIENT_HANDSHAKE_LEN] = [
    0, 0, 0, 0, //
    0, 0, 0, 0, //
    0, 0, 0, 0, //
    0, 0, 0, 4, //
    0, 0, 0x07, 0xdc,
];

/// Length of the client handshake
pub const CLIENT_HANDSHAKE_LEN: usize = 20;

/// Size of every post-handshake request header
pub const REQUEST_HEADER_SIZE: usize = 24;

/// Offset of the body length within a request header
pub const BODY_LENGTH_OFFSET: usize = 20;

/// Size of every response header
pub const RESPONSE_HEADER_SIZE: usize = 8;

/// Offset of the length placeholder within a response header
pub const RESPONSE_LENGTH_OFFSET: usize = 4;

/// Protocol version announced in handshake and `kXR_protocol` replies
pub const PROTOCOL_VERSION: i32 = 0x297;

/// Default cap on concurrent logical streams per connection
pub const DEFAULT_MAX_STREAMS: usize = 100;

/// Default cap on a single request body (16 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
