//! Open-file table of a logical stream.
//!
//! Three views over the same set of open files: path → handle, handle → path and
//! handle → flags. Every mutation goes through this type so the views move
//! together; their cardinalities are checked after each insert.

use std::collections::HashMap;

use tracing::error;

use crate::protocol::{FileHandle, OpenFlags};

/// One open file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    pub path: String,
    pub handle: FileHandle,
    pub flags: OpenFlags,
}

/// Open files of one logical stream.
#[derive(Debug, Default)]
pub struct OpenFileTable {
    by_path: HashMap<String, FileHandle>,
    by_handle: HashMap<FileHandle, String>,
    flags: HashMap<FileHandle, OpenFlags>,
}

impl OpenFileTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open files
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Whether no file is open
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty() && self.by_handle.is_empty() && self.flags.is_empty()
    }

    /// Whether `path` is open
    pub fn contains_path(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// Whether `handle` is open
    pub fn contains_handle(&self, handle: FileHandle) -> bool {
        self.by_handle.contains_key(&handle)
    }

    /// Flags `handle` was opened with
    pub fn flags(&self, handle: FileHandle) -> Option<OpenFlags> {
        self.flags.get(&handle).copied()
    }

    /// Path behind `handle`
    pub fn path(&self, handle: FileHandle) -> Option<&str> {
        self.by_handle.get(&handle).map(String::as_str)
    }

    /// Handle of an open `path`
    pub fn handle(&self, path: &str) -> Option<FileHandle> {
        self.by_path.get(path).copied()
    }

    /// Record an open file in all three views.
    ///
    /// Returns `false` (and logs) when the views disagree afterwards, which
    /// happens when a handle or path is reused without being removed first.
    pub fn insert(&mut self, path: impl Into<String>, handle: FileHandle, flags: OpenFlags) -> bool {
        let path = path.into();
        self.by_path.insert(path.clone(), handle);
        self.by_handle.insert(handle, path);
        self.flags.insert(handle, flags);
        self.check_consistency()
    }

    /// Remove the file behind `handle`.
    pub fn remove_handle(&mut self, handle: FileHandle) -> Option<OpenFile> {
        let path = self.by_handle.remove(&handle)?;
        self.by_path.remove(&path);
        let flags = self.flags.remove(&handle).unwrap_or_default();
        Some(OpenFile {
            path,
            handle,
            flags,
        })
    }

    /// Remove the file open under `path`.
    pub fn remove_path(&mut self, path: &str) -> Option<OpenFile> {
        let handle = self.by_path.remove(path)?;
        self.by_handle.remove(&handle);
        let flags = self.flags.remove(&handle).unwrap_or_default();
        Some(OpenFile {
            path: path.to_string(),
            handle,
            flags,
        })
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.by_path.clear();
        self.by_handle.clear();
        self.flags.clear();
    }

    /// Snapshot of all open files, ordered by handle.
    pub fn entries(&self) -> Vec<OpenFile> {
        let mut entries: Vec<OpenFile> = self
            .by_handle
            .iter()
            .map(|(handle, path)| OpenFile {
                path: path.clone(),
                handle: *handle,
                flags: self.flags.get(handle).copied().unwrap_or_default(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.handle);
        entries
    }

    /// Whether the three views have equal cardinality.
    pub fn is_consistent(&self) -> bool {
        self.by_path.len() == self.by_handle.len() && self.by_handle.len() == self.flags.len()
    }

    fn check_consistency(&self) -> bool {
        let consistent = self.is_consistent();
        if !consistent {
            error!(
                paths = self.by_path.len(),
                handles = self.by_handle.len(),
                flags = self.flags.len(),
                "Open-file table views diverged"
            );
        }
        consistent
    }
}
