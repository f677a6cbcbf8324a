//! Open-request option flags.
//!
//! Stored as the 16-bit `options` field of an open request.

use std::fmt;

/// Options carried by an open request (`kXR_*` open flags)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OpenFlags(u16);

#[allow(missing_docs)]
impl OpenFlags {
    pub const COMPRESS: u16 = 1 << 0;
    pub const DELETE: u16 = 1 << 1;
    pub const FORCE: u16 = 1 << 2;
    /// Create a new file
    pub const NEW: u16 = 1 << 3;
    /// Open for reading
    pub const READ: u16 = 1 << 4;
    /// Open for update
    pub const UPDATE: u16 = 1 << 5;
    pub const ASYNC: u16 = 1 << 6;
    pub const REFRESH: u16 = 1 << 7;
    pub const MKPATH: u16 = 1 << 8;
    pub const APPEND: u16 = 1 << 9;
    /// Return stat information with the handle
    pub const RETSTAT: u16 = 1 << 10;
    pub const REPLICA: u16 = 1 << 11;
    /// Persist on successful close
    pub const POSC: u16 = 1 << 12;

    const NAMES: &'static [(u16, &'static str)] = &[
        (Self::COMPRESS, "compress"),
        (Self::DELETE, "delete"),
        (Self::FORCE, "force"),
        (Self::NEW, "new"),
        (Self::READ, "read"),
        (Self::UPDATE, "update"),
        (Self::ASYNC, "async"),
        (Self::REFRESH, "refresh"),
        (Self::MKPATH, "mkpath"),
        (Self::APPEND, "append"),
        (Self::RETSTAT, "retstat"),
        (Self::REPLICA, "replica"),
        (Self::POSC, "posc"),
    ];

    /// Create new empty flags
    pub fn new() -> Self {
        Self(0)
    }

    /// Create from raw bits
    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Get raw bits
    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u16) {
        self.0 |= flag;
    }

    /// Builder form of [`OpenFlags::set`]
    pub fn with(mut self, flag: u16) -> Self {
        self.set(flag);
        self
    }

    /// Check if flag is set
    pub fn has(&self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    /// Whether the handle may be written or synced.
    pub fn allows_write(&self) -> bool {
        self.has(Self::NEW) || self.has(Self::UPDATE)
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (bit, name) in Self::NAMES {
            if self.has(*bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}
