//! Open-file handle table.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::{VfsError, VfsResult};
use super::node::SharedFile;
use super::types::{FileHandle, InodeId, OpenFlags};

/// One open handle. Holding the body keeps the content reachable even after
/// the directory entry is gone.
#[derive(Debug, Clone)]
pub(crate) struct OpenFile {
    pub ino: InodeId,
    pub file: SharedFile,
    pub flags: OpenFlags,
}

/// Handle number to open file. Shard guards are never held across another
/// lock acquisition: lookups hand back a clone.
#[derive(Debug)]
pub(crate) struct HandleTable {
    open: DashMap<u64, OpenFile>,
    next: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            open: DashMap::new(),
            next: AtomicU64::new(1),
        }
    }

    pub fn insert(&self, ino: InodeId, file: SharedFile, flags: OpenFlags) -> FileHandle {
        let fh = self.next.fetch_add(1, Ordering::Relaxed);
        self.open.insert(fh, OpenFile { ino, file, flags });
        FileHandle(fh)
    }

    pub fn get(&self, fh: FileHandle) -> VfsResult<OpenFile> {
        self.open
            .get(&fh.0)
            .map(|entry| entry.value().clone())
            .ok_or(VfsError::BadHandle(fh.0))
    }

    pub fn remove(&self, fh: FileHandle) -> VfsResult<OpenFile> {
        self.open
            .remove(&fh.0)
            .map(|(_, open)| open)
            .ok_or(VfsError::BadHandle(fh.0))
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }
}
