//! Open file and directory handles.
//!
//! Files are read whole at `open` and served from memory until `release`.
//! Directories are listed whole at `opendir`, so `readdir` offsets index a
//! stable snapshot even when the kernel reads it in several batches.

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::Ref;
use fuser::FileType;
use std::sync::atomic::{AtomicU64, Ordering};

/// One row of a directory snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRow {
    /// Inode of the entry.
    pub ino: u64,
    /// Kind reported to `readdir`.
    pub kind: FileType,
    /// Entry name.
    pub name: String,
}

/// Handle type for FUSE operations.
#[derive(Debug)]
pub enum FuseHandle {
    /// Full file content.
    File(Bytes),
    /// Directory snapshot, `.` and `..` included.
    Dir(Vec<DirRow>),
}

impl FuseHandle {
    /// The bytes in `[offset, offset + size)`, clamped to the content.
    pub fn read_at(&self, offset: u64, size: u32) -> Option<Bytes> {
        let FuseHandle::File(content) = self else {
            return None;
        };
        let len = content.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(size as usize).min(len);
        Some(content.slice(start..end))
    }

    /// The directory snapshot, if this is a directory handle.
    pub fn as_dir(&self) -> Option<&[DirRow]> {
        match self {
            FuseHandle::Dir(rows) => Some(rows),
            FuseHandle::File(_) => None,
        }
    }
}

/// Thread-safe table with auto-incrementing handle IDs.
///
/// IDs start at 1; 0 is reserved for "no handle".
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: DashMap<u64, V>,
    next_id: AtomicU64,
}

impl<V> HandleTable<V> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts a value under a fresh ID.
    pub fn insert_auto(&self, value: V) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(entry) = self.handles.entry(id) {
                entry.insert(value);
                return id;
            }
        }
    }

    /// Gets a handle by ID.
    pub fn get(&self, id: u64) -> Option<Ref<'_, u64, V>> {
        self.handles.get(&id)
    }

    /// Removes and returns a handle.
    pub fn remove(&self, id: u64) -> Option<V> {
        self.handles.remove(&id).map(|(_, v)| v)
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if no handle is open.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe table for FUSE file and directory handles.
pub type FuseHandleTable = HandleTable<FuseHandle>;
