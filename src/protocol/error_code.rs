//! Wire error codes and the internal result-code taxonomy.
//!
//! The storage back end reports failures with an [`InternalCode`]; the client only
//! ever sees an [`ErrorCode`]. The conversion between the two is total: every
//! internal code, including numbers this crate has never heard of, lands in a
//! defined wire code.
//!
//! | Internal group                                       | Wire code        |
//! |------------------------------------------------------|------------------|
//! | not found                                            | `NotFound`       |
//! | not a directory / not a file                         | `NotFile`        |
//! | already exists / locked / file is new                | `FileLocked`     |
//! | permission denied                                    | `NotAuthorized`  |
//! | corrupted                                            | `ChkSumErr`      |
//! | exists                                               | `ItExists`       |
//! | not online, precious, not stored, size unknown, ...  | `FsError`        |
//! | invalid arguments / attribute format                 | `ArgInvalid`     |
//! | disk I/O                                             | `IoError`        |
//! | everything else                                      | `ServerError`    |

/// Error codes understood by xrootd clients (`kXR_*` error alphabet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// Invalid argument
    ArgInvalid = 3000,
    /// Required argument missing
    ArgMissing = 3001,
    /// Argument too long
    ArgTooLong = 3002,
    /// File locked or already open
    FileLocked = 3003,
    /// Handle does not refer to an open file
    FileNotOpen = 3004,
    /// File system state error
    FsError = 3005,
    /// Invalid request
    InvalidRequest = 3006,
    /// I/O error
    IoError = 3007,
    /// Out of memory
    NoMemory = 3008,
    /// Out of space
    NoSpace = 3009,
    /// Not authorized
    NotAuthorized = 3010,
    /// Not found
    NotFound = 3011,
    /// Internal server error
    ServerError = 3012,
    /// Request not supported
    Unsupported = 3013,
    /// No server available
    NoServer = 3014,
    /// Not a file
    NotFile = 3015,
    /// Is a directory
    IsDirectory = 3016,
    /// Operation cancelled
    Cancelled = 3017,
    /// Target already exists
    ItExists = 3018,
    /// Checksum mismatch
    ChkSumErr = 3019,
    /// Operation in progress
    InProgress = 3020,
}

impl ErrorCode {
    /// Numeric value written into error responses.
    pub fn as_i32(&self) -> i32 {
        *self as u16 as i32
    }

    /// Parse a numeric wire code.
    pub fn from_i32(value: i32) -> Option<Self> {
        let code = match value {
            3000 => ErrorCode::ArgInvalid,
            3001 => ErrorCode::ArgMissing,
            3002 => ErrorCode::ArgTooLong,
            3003 => ErrorCode::FileLocked,
            3004 => ErrorCode::FileNotOpen,
            3005 => ErrorCode::FsError,
            3006 => ErrorCode::InvalidRequest,
            3007 => ErrorCode::IoError,
            3008 => ErrorCode::NoMemory,
            3009 => ErrorCode::NoSpace,
            3010 => ErrorCode::NotAuthorized,
            3011 => ErrorCode::NotFound,
            3012 => ErrorCode::ServerError,
            3013 => ErrorCode::Unsupported,
            3014 => ErrorCode::NoServer,
            3015 => ErrorCode::NotFile,
            3016 => ErrorCode::IsDirectory,
            3017 => ErrorCode::Cancelled,
            3018 => ErrorCode::ItExists,
            3019 => ErrorCode::ChkSumErr,
            3020 => ErrorCode::InProgress,
            _ => return None,
        };
        Some(code)
    }
}

/// Result codes produced by the storage back end.
///
/// Numeric values follow the back end's own numbering; [`InternalCode::Other`]
/// carries anything outside the known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalCode {
    /// Unrecoverable back-end failure
    Panic,
    /// File does not exist
    FileNotFound,
    /// Path component is not a directory
    NotDir,
    /// Path does not name a regular file
    NotFile,
    /// Entry already exists
    AlreadyExists,
    /// File is locked by another transfer
    Locked,
    /// File is still being written
    FileIsNew,
    /// Caller lacks permission
    PermissionDenied,
    /// Stored data failed verification
    FileCorrupted,
    /// Target exists
    FileExists,
    /// File is not on disk
    FileNotOnline,
    /// File is precious and may not be touched
    FilePrecious,
    /// File was never stored
    FileNotStored,
    /// File size not yet known
    FileSizeUnknown,
    /// File already in cache
    FileInCache,
    /// Tertiary storage delay
    HsmDelay,
    /// Replica out of date
    OutOfDate,
    /// Invalid arguments
    InvalidArgs,
    /// Malformed attribute
    AttributeFormat,
    /// Disk I/O error
    DiskIo,
    /// Back-end request timed out
    Timeout,
    /// Pool disabled
    PoolDisabled,
    /// No pool configured for the request
    NoPoolConfigured,
    /// No pool online
    NoPoolOnline,
    /// Mover vanished
    MoverNotFound,
    /// Service unavailable
    ServiceUnavailable,
    /// Resource exhausted
    ResourceUnavailable,
    /// Third-party transfer failed
    TransferFailed,
    /// Unexpected system exception
    Unexpected,
    /// Any code outside the known set
    Other(i32),
}

impl InternalCode {
    /// Interpret a raw numeric result code.
    pub fn from_raw(code: i32) -> Self {
        match code {
            10000 => InternalCode::Panic,
            10001 => InternalCode::FileNotFound,
            10002 => InternalCode::FilePrecious,
            10003 => InternalCode::FileSizeUnknown,
            10004 => InternalCode::FileNotOnline,
            10005 => InternalCode::FileIsNew,
            10006 => InternalCode::Unexpected,
            10007 => InternalCode::AttributeFormat,
            10008 => InternalCode::HsmDelay,
            10009 => InternalCode::FileNotStored,
            10011 => InternalCode::FileExists,
            10012 => InternalCode::FileInCache,
            10013 => InternalCode::OutOfDate,
            10014 => InternalCode::NotDir,
            10015 => InternalCode::InvalidArgs,
            10016 => InternalCode::NotFile,
            10017 => InternalCode::PermissionDenied,
            10018 => InternalCode::AlreadyExists,
            10019 => InternalCode::Locked,
            10020 => InternalCode::FileCorrupted,
            10021 => InternalCode::ServiceUnavailable,
            10022 => InternalCode::ResourceUnavailable,
            10023 => InternalCode::TransferFailed,
            10024 => InternalCode::MoverNotFound,
            10025 => InternalCode::NoPoolConfigured,
            10026 => InternalCode::NoPoolOnline,
            204 => InternalCode::DiskIo,
            104 => InternalCode::PoolDisabled,
            10100 => InternalCode::Timeout,
            other => InternalCode::Other(other),
        }
    }
}

impl From<InternalCode> for ErrorCode {
    fn from(code: InternalCode) -> Self {
        match code {
            InternalCode::FileNotFound => ErrorCode::NotFound,
            InternalCode::NotDir | InternalCode::NotFile => ErrorCode::NotFile,
            InternalCode::AlreadyExists | InternalCode::Locked | InternalCode::FileIsNew => {
                ErrorCode::FileLocked
            },
            InternalCode::PermissionDenied => ErrorCode::NotAuthorized,
            InternalCode::FileCorrupted => ErrorCode::ChkSumErr,
            InternalCode::FileExists => ErrorCode::ItExists,
            InternalCode::FileNotOnline
            | InternalCode::FilePrecious
            | InternalCode::FileNotStored
            | InternalCode::FileSizeUnknown
            | InternalCode::FileInCache
            | InternalCode::HsmDelay
            | InternalCode::OutOfDate => ErrorCode::FsError,
            InternalCode::InvalidArgs | InternalCode::AttributeFormat => ErrorCode::ArgInvalid,
            InternalCode::DiskIo => ErrorCode::IoError,
            InternalCode::Timeout
            | InternalCode::PoolDisabled
            | InternalCode::NoPoolConfigured
            | InternalCode::NoPoolOnline
            | InternalCode::MoverNotFound
            | InternalCode::ServiceUnavailable
            | InternalCode::ResourceUnavailable
            | InternalCode::TransferFailed
            | InternalCode::Unexpected
            | InternalCode::Panic
            | InternalCode::Other(_) => ErrorCode::ServerError,
        }
    }
}

/// Map a raw back-end result code straight to the wire alphabet.
pub fn map_result_code(code: i32) -> ErrorCode {
    ErrorCode::from(InternalCode::from_raw(code))
}
