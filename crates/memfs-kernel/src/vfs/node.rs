//! Node model.
//!
//! Directories own their children by inode (the entry map), and every node
//! keeps only a weak back-reference to its parent, resolved through the
//! [`NodeStore`](super::store::NodeStore). Ownership stays tree-shaped.
//!
//! File bodies sit behind their own lock so content operations on distinct
//! files do not contend on the namespace lock.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::SystemTime;

use super::types::{FileAttr, FileType, InodeId};

/// Attributes shared by every node kind.
#[derive(Debug, Clone)]
pub struct Meta {
    pub perm: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: SystemTime,
}

impl Meta {
    /// Fresh metadata; all timestamps equal.
    pub fn new(perm: u32, uid: u32, gid: u32, nlink: u32) -> Self {
        let now = SystemTime::now();
        Self {
            perm: perm & 0o7777,
            uid,
            gid,
            nlink,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
        }
    }

    /// Content changed: mtime and ctime move together.
    pub fn touch_modified(&mut self, now: SystemTime) {
        self.mtime = now;
        self.ctime = now;
    }

    /// Only the inode changed (link count, owner, mode).
    pub fn touch_changed(&mut self, now: SystemTime) {
        self.ctime = now;
    }

    fn to_attr(&self, ino: InodeId, kind: FileType, size: u64) -> FileAttr {
        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            kind,
            perm: self.perm,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            crtime: self.crtime,
        }
    }
}

/// File body: attributes, content, and the open-handle count.
#[derive(Debug)]
pub struct FileNode {
    pub meta: Meta,
    pub data: Vec<u8>,
    /// Live handles referencing this file. Together with `meta.nlink` this
    /// decides when the node may leave the store.
    pub open_count: u32,
}

impl FileNode {
    pub fn new(meta: Meta) -> Self {
        Self {
            meta,
            data: Vec::new(),
            open_count: 0,
        }
    }

    pub fn attr(&self, ino: InodeId) -> FileAttr {
        self.meta.to_attr(ino, FileType::File, self.data.len() as u64)
    }

    /// Copy out up to `size` bytes at `offset`. Past EOF yields nothing.
    pub fn read_at(&self, offset: u64, size: u32) -> Vec<u8> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Vec::new();
        }
        let start = offset as usize;
        let end = (offset + size as u64).min(len) as usize;
        self.data[start..end].to_vec()
    }

    /// Overwrite `[offset, offset + data.len())`, zero-filling any gap past
    /// the current end. The caller has already bounds-checked `end`.
    pub fn write_at(&mut self, offset: usize, data: &[u8], now: SystemTime) {
        let end = offset + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(data);
        self.meta.touch_modified(now);
    }

    /// Resize content, zero-filling when growing.
    pub fn set_len(&mut self, len: usize, now: SystemTime) {
        self.data.resize(len, 0);
        if len == 0 {
            self.data.shrink_to_fit();
        }
        self.meta.touch_modified(now);
    }

    /// No directory entry and no handle left.
    pub fn is_orphaned(&self) -> bool {
        self.meta.nlink == 0 && self.open_count == 0
    }
}

/// Shared, separately locked file body.
pub type SharedFile = Arc<RwLock<FileNode>>;

/// Directory body.
#[derive(Debug)]
pub struct Directory {
    pub meta: Meta,
    /// Child name to inode, kept in insertion order for stable listings.
    pub entries: IndexMap<String, InodeId>,
}

impl Directory {
    pub fn new(meta: Meta) -> Self {
        Self {
            meta,
            entries: IndexMap::new(),
        }
    }

    pub fn attr(&self, ino: InodeId) -> FileAttr {
        self.meta.to_attr(ino, FileType::Directory, 0)
    }
}

/// Symbolic link body.
#[derive(Debug)]
pub struct SymlinkNode {
    pub meta: Meta,
    pub target: String,
}

impl SymlinkNode {
    pub fn attr(&self, ino: InodeId) -> FileAttr {
        self.meta
            .to_attr(ino, FileType::Symlink, self.target.len() as u64)
    }
}

#[derive(Debug)]
pub enum NodeBody {
    File(SharedFile),
    Directory(Directory),
    Symlink(SymlinkNode),
}

/// A registered node.
#[derive(Debug)]
pub struct Node {
    pub ino: InodeId,
    /// Weak back-reference to the containing directory. `None` for the root
    /// and for unlinked files kept alive only by open handles.
    pub parent: Option<InodeId>,
    pub body: NodeBody,
}

impl Node {
    pub fn kind(&self) -> FileType {
        match &self.body {
            NodeBody::File(_) => FileType::File,
            NodeBody::Directory(_) => FileType::Directory,
            NodeBody::Symlink(_) => FileType::Symlink,
        }
    }

    /// Attribute snapshot. Takes the file lock shared for file nodes.
    pub fn attr(&self) -> FileAttr {
        match &self.body {
            NodeBody::File(file) => file.read().attr(self.ino),
            NodeBody::Directory(dir) => dir.attr(self.ino),
            NodeBody::Symlink(link) => link.attr(self.ino),
        }
    }

    /// Record an inode change (rename, link count).
    pub fn touch_changed(&mut self, now: SystemTime) {
        match &mut self.body {
            NodeBody::File(file) => file.write().meta.touch_changed(now),
            NodeBody::Directory(dir) => dir.meta.touch_changed(now),
            NodeBody::Symlink(link) => link.meta.touch_changed(now),
        }
    }

    pub fn as_dir(&self) -> Option<&Directory> {
        match &self.body {
            NodeBody::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn as_dir_mut(&mut self) -> Option<&mut Directory> {
        match &mut self.body {
            NodeBody::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&SharedFile> {
        match &self.body {
            NodeBody::File(file) => Some(file),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> FileNode {
        FileNode::new(Meta::new(0o644, 0, 0, 1))
    }

    #[test]
    fn test_meta_timestamps_equal_on_creation() {
        let meta = Meta::new(0o100644, 1, 2, 1);
        assert_eq!(meta.perm, 0o644);
        assert_eq!(meta.atime, meta.mtime);
        assert_eq!(meta.mtime, meta.ctime);
        assert_eq!(meta.ctime, meta.crtime);
    }

    #[test]
    fn test_sparse_write_zero_fills() {
        let mut f = file();
        f.write_at(4, b"ab", SystemTime::now());
        assert_eq!(f.data, b"\0\0\0\0ab");
        assert_eq!(f.attr(3).size, 6);
    }

    #[test]
    fn test_read_at_bounds() {
        let mut f = file();
        f.write_at(0, b"hello world", SystemTime::now());
        assert_eq!(f.read_at(6, 100), b"world");
        assert!(f.read_at(11, 10).is_empty());
        assert!(f.read_at(u64::MAX, 10).is_empty());
    }

    #[test]
    fn test_set_len() {
        let mut f = file();
        f.write_at(0, b"hello", SystemTime::now());
        f.set_len(2, SystemTime::now());
        assert_eq!(f.data, b"he");
        f.set_len(4, SystemTime::now());
        assert_eq!(f.data, b"he\0\0");
    }

    #[test]
    fn test_orphaned() {
        let mut f = file();
        assert!(!f.is_orphaned());
        f.meta.nlink = 0;
        f.open_count = 1;
        assert!(!f.is_orphaned());
        f.open_count = 0;
        assert!(f.is_orphaned());
    }
}
