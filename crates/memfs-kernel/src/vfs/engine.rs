//! The filesystem engine.
//!
//! # Locking
//!
//! - The namespace (every directory map plus inode registration) sits behind
//!   one `RwLock<NodeStore>`. Lookups take it shared; anything that adds,
//!   removes or relinks an entry takes it exclusively.
//! - Each file body has its own `RwLock`. Content operations hold the
//!   namespace lock shared and the file lock as needed, so writes to
//!   different files run in parallel.
//! - Order is always namespace, then at most one file lock. Handle I/O takes
//!   only the file lock.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::config::EngineConfig;

use super::error::{VfsError, VfsResult};
use super::handles::HandleTable;
use super::node::{Directory, FileNode, Meta, Node, NodeBody, SharedFile, SymlinkNode};
use super::resolve::{Follow, Resolver};
use super::store::NodeStore;
use super::types::{DirEntry, FileAttr, FileHandle, InodeId, OpenFlags, ROOT_INO, SetAttr, StatFs};

/// Mode used when `open` creates a file.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// In-memory filesystem engine.
///
/// One instance owns one tree. Share it across dispatch threads with
/// `Arc<Engine>`; every method takes `&self`.
pub struct Engine {
    config: EngineConfig,
    tree: RwLock<NodeStore>,
    handles: HandleTable,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("tree", &"<locked>")
            .field("handles", &self.handles.len())
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an empty filesystem with default settings.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty filesystem.
    pub fn with_config(config: EngineConfig) -> Self {
        let root = Meta::new(config.root_mode, config.uid, config.gid, 2);
        Self {
            tree: RwLock::new(NodeStore::new(root)),
            handles: HandleTable::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn resolver<'a>(&self, store: &'a NodeStore) -> Resolver<'a> {
        Resolver::new(store, self.config.name_max, self.config.max_symlink_depth)
    }

    fn meta(&self, mode: u32, nlink: u32) -> Meta {
        Meta::new(mode, self.config.uid, self.config.gid, nlink)
    }

    /// Validate that `[offset, offset + len)` fits within the size limit.
    fn check_extent(&self, offset: u64, len: u64, path: &str) -> VfsResult<usize> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.config.max_file_size)
            .ok_or_else(|| {
                VfsError::invalid_argument(format!("{path}: extent {offset}+{len} out of range"))
            })?;
        usize::try_from(end)
            .map_err(|_| VfsError::invalid_argument(format!("{path}: extent out of range")))?;
        Ok(offset as usize)
    }

    // ========================================================================
    // Namespace
    // ========================================================================

    /// Link a new node under the parent of `path`.
    ///
    /// The existence check and the insert happen under the same exclusive
    /// guard, so nobody observes a half-created entry.
    fn insert_node(
        &self,
        store: &mut NodeStore,
        path: &Path,
        body: NodeBody,
    ) -> VfsResult<InodeId> {
        let shown = show(path);
        let (parent, name) = self.resolver(store).resolve_parent(path)?;
        if store.dir(parent, &shown)?.entries.contains_key(&name) {
            return Err(VfsError::already_exists(shown));
        }

        let is_dir = matches!(body, NodeBody::Directory(_));
        let ino = store.allocate();
        store.register(Node {
            ino,
            parent: Some(parent),
            body,
        });

        let dir = store.dir_mut(parent, &shown)?;
        dir.entries.insert(name, ino);
        if is_dir {
            dir.meta.nlink += 1;
        }
        dir.meta.touch_modified(SystemTime::now());
        Ok(ino)
    }

    /// Create an empty regular file.
    pub fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let mut store = self.tree.write();
        let file = Arc::new(RwLock::new(FileNode::new(self.meta(mode, 1))));
        let ino = self.insert_node(&mut store, path, NodeBody::File(file))?;
        let attr = store.lookup(ino)?.attr();
        debug!(ino = attr.ino, path = %path.display(), "create");
        Ok(attr)
    }

    /// Create a directory.
    pub fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let mut store = self.tree.write();
        let dir = Directory::new(self.meta(mode, 2));
        let ino = self.insert_node(&mut store, path, NodeBody::Directory(dir))?;
        let attr = store.lookup(ino)?.attr();
        debug!(ino = attr.ino, path = %path.display(), "mkdir");
        Ok(attr)
    }

    /// Create a symbolic link at `path` pointing to `target`.
    ///
    /// The target is stored verbatim and need not exist.
    pub fn symlink(&self, path: &Path, target: &Path) -> VfsResult<FileAttr> {
        let target = target
            .to_str()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VfsError::invalid_argument(show(target)))?
            .to_string();
        let mut store = self.tree.write();
        let link = SymlinkNode {
            meta: self.meta(0o777, 1),
            target,
        };
        let ino = self.insert_node(&mut store, path, NodeBody::Symlink(link))?;
        let attr = store.lookup(ino)?.attr();
        debug!(ino = attr.ino, path = %path.display(), "symlink");
        Ok(attr)
    }

    /// Attribute snapshot. A final symlink is not followed.
    pub fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let store = self.tree.read();
        let ino = self.resolver(&store).resolve(path, Follow::NoFinal)?;
        Ok(store.lookup(ino)?.attr())
    }

    /// All entries of a directory, in insertion order.
    ///
    /// `.` and `..` are not synthesized.
    pub fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        self.readdir_from(path, 0)
    }

    /// Entries from position `offset` on, for adapters that list in pages.
    pub fn readdir_from(&self, path: &Path, offset: usize) -> VfsResult<Vec<DirEntry>> {
        let store = self.tree.read();
        let shown = show(path);
        let ino = self.resolver(&store).resolve(path, Follow::Final)?;
        let dir = store.dir(ino, &shown)?;
        dir.entries
            .iter()
            .skip(offset)
            .map(|(name, &child)| {
                Ok(DirEntry {
                    name: name.clone(),
                    ino: child,
                    kind: store.lookup(child)?.kind(),
                })
            })
            .collect()
    }

    /// Target of a symbolic link.
    pub fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        let store = self.tree.read();
        let ino = self.resolver(&store).resolve(path, Follow::NoFinal)?;
        match &store.lookup(ino)?.body {
            NodeBody::Symlink(link) => Ok(PathBuf::from(&link.target)),
            _ => Err(VfsError::NotASymlink(show(path))),
        }
    }

    /// Remove a file or symlink entry.
    ///
    /// A file still held open stays registered (and usable through its
    /// handles) until the last handle is released.
    pub fn unlink(&self, path: &Path) -> VfsResult<()> {
        let shown = show(path);
        let mut store = self.tree.write();
        let (parent, name) = self.resolver(&store).resolve_parent(path)?;
        let child = *store
            .dir(parent, &shown)?
            .entries
            .get(&name)
            .ok_or_else(|| VfsError::not_found(&shown))?;
        if store.lookup(child)?.kind().is_dir() {
            return Err(VfsError::is_a_directory(shown));
        }

        let now = SystemTime::now();
        let dir = store.dir_mut(parent, &shown)?;
        dir.entries.shift_remove(&name);
        dir.meta.touch_modified(now);
        drop_link(&mut store, child, now)?;
        debug!(ino = child, path = %shown, "unlink");
        Ok(())
    }

    /// Remove an empty directory.
    pub fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let shown = show(path);
        let mut store = self.tree.write();
        let (parent, name) = self.resolver(&store).resolve_parent(path)?;
        let child = *store
            .dir(parent, &shown)?
            .entries
            .get(&name)
            .ok_or_else(|| VfsError::not_found(&shown))?;
        if !store.dir(child, &shown)?.entries.is_empty() {
            return Err(VfsError::directory_not_empty(shown));
        }

        let now = SystemTime::now();
        let dir = store.dir_mut(parent, &shown)?;
        dir.entries.shift_remove(&name);
        dir.meta.nlink = dir.meta.nlink.saturating_sub(1);
        dir.meta.touch_modified(now);
        store.unregister(child);
        debug!(ino = child, path = %shown, "rmdir");
        Ok(())
    }

    /// Move the entry at `from` to `to`, replacing a file or empty directory
    /// already at `to`.
    pub fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let (from_shown, to_shown) = (show(from), show(to));
        let mut store = self.tree.write();
        let resolver = self.resolver(&store);
        let (src_parent, src_name) = resolver.resolve_parent(from)?;
        let (dst_parent, dst_name) = resolver.resolve_parent(to)?;

        let src = *store
            .dir(src_parent, &from_shown)?
            .entries
            .get(&src_name)
            .ok_or_else(|| VfsError::not_found(&from_shown))?;
        let dst = store.dir(dst_parent, &to_shown)?.entries.get(&dst_name).copied();

        if (src_parent == dst_parent && src_name == dst_name) || dst == Some(src) {
            return Ok(());
        }

        let moving_dir = store.lookup(src)?.kind().is_dir();
        if moving_dir && store.is_ancestor_of(src, dst_parent) {
            return Err(VfsError::invalid_argument(format!(
                "cannot move {from_shown} into its own subtree {to_shown}"
            )));
        }

        let mut replacing_dir = false;
        if let Some(dst) = dst {
            match (moving_dir, store.lookup(dst)?.as_dir()) {
                (true, Some(dir)) if !dir.entries.is_empty() => {
                    return Err(VfsError::directory_not_empty(to_shown));
                }
                (true, Some(_)) => replacing_dir = true,
                (true, None) => return Err(VfsError::not_a_directory(to_shown)),
                (false, Some(_)) => return Err(VfsError::is_a_directory(to_shown)),
                (false, None) => {}
            }
        }

        // Everything is validated; from here on nothing can fail.
        let now = SystemTime::now();
        let src_dir = store.dir_mut(src_parent, &from_shown)?;
        src_dir.entries.shift_remove(&src_name);
        if moving_dir {
            src_dir.meta.nlink = src_dir.meta.nlink.saturating_sub(1);
        }
        src_dir.meta.touch_modified(now);

        let dst_dir = store.dir_mut(dst_parent, &to_shown)?;
        dst_dir.entries.insert(dst_name, src);
        if moving_dir {
            dst_dir.meta.nlink += 1;
        }
        if replacing_dir {
            dst_dir.meta.nlink = dst_dir.meta.nlink.saturating_sub(1);
        }
        dst_dir.meta.touch_modified(now);

        if let Some(dst) = dst {
            drop_link(&mut store, dst, now)?;
        }

        let node = store.lookup_mut(src)?;
        node.parent = Some(dst_parent);
        node.touch_changed(now);

        debug!(ino = src, from = %from_shown, to = %to_shown, replaced = ?dst, "rename");
        Ok(())
    }

    /// Update the requested attributes. ctime always moves.
    pub fn setattr(&self, path: &Path, set: SetAttr) -> VfsResult<FileAttr> {
        let shown = show(path);
        let mut store = self.tree.write();
        let ino = self.resolver(&store).resolve(path, Follow::NoFinal)?;
        let new_len = match set.size {
            Some(size) => Some(self.check_extent(size, 0, &shown)?),
            None => None,
        };

        let now = SystemTime::now();
        let node = store.lookup_mut(ino)?;
        match &mut node.body {
            NodeBody::File(file) => {
                let mut file = file.write();
                if let Some(len) = new_len {
                    file.set_len(len, now);
                }
                apply_setattr(&mut file.meta, &set, now);
            }
            NodeBody::Directory(dir) => {
                if new_len.is_some() {
                    return Err(VfsError::is_a_directory(shown));
                }
                apply_setattr(&mut dir.meta, &set, now);
            }
            NodeBody::Symlink(link) => {
                if new_len.is_some() {
                    return Err(VfsError::invalid_argument(shown));
                }
                apply_setattr(&mut link.meta, &set, now);
            }
        }
        debug!(ino, path = %shown, ?set, "setattr");
        Ok(node.attr())
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Resolve `path` (following a final symlink) to a file body.
    ///
    /// The caller keeps `store` borrowed while using the body, which keeps
    /// the lock order namespace then file.
    fn file_at(&self, store: &NodeStore, path: &Path) -> VfsResult<SharedFile> {
        let ino = self.resolver(store).resolve(path, Follow::Final)?;
        store
            .lookup(ino)?
            .as_file()
            .cloned()
            .ok_or_else(|| VfsError::is_a_directory(show(path)))
    }

    /// Read up to `size` bytes at `offset`. Past EOF returns nothing.
    pub fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let store = self.tree.read();
        let file = self.file_at(&store, path)?;
        let data = file.read().read_at(offset, size);
        Ok(data)
    }

    /// Write `data` at `offset`, zero-filling any gap past the old end.
    ///
    /// Returns the number of bytes written.
    pub fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32> {
        let shown = show(path);
        let store = self.tree.read();
        let file = self.file_at(&store, path)?;

        let written = u32::try_from(data.len())
            .map_err(|_| VfsError::invalid_argument(format!("{shown}: write too large")))?;
        let start = self.check_extent(offset, data.len() as u64, &shown)?;
        file.write().write_at(start, data, SystemTime::now());
        debug!(path = %shown, offset, len = written, "write");
        Ok(written)
    }

    /// Set the file length, zero-filling when growing.
    pub fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        let shown = show(path);
        let store = self.tree.read();
        let file = self.file_at(&store, path)?;

        let len = self.check_extent(size, 0, &shown)?;
        file.write().set_len(len, SystemTime::now());
        debug!(path = %shown, size, "truncate");
        Ok(())
    }

    // ========================================================================
    // Handles
    // ========================================================================

    /// Open a file, optionally creating or truncating it.
    ///
    /// With `create`, a dangling symlink at `path` is followed and its
    /// target created, unless `exclusive` is also set.
    pub fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<FileHandle> {
        let shown = show(path);
        let mut store = self.tree.write();
        let found = self.resolver(&store).resolve(path, Follow::Final);
        let ino = match found {
            Ok(_) if flags.create && flags.exclusive => {
                return Err(VfsError::already_exists(shown));
            }
            Ok(ino) => ino,
            Err(VfsError::NotFound(_)) if flags.create => {
                let target = if flags.exclusive {
                    path.to_path_buf()
                } else {
                    self.creation_target(&store, path)?
                };
                let file = Arc::new(RwLock::new(FileNode::new(self.meta(DEFAULT_FILE_MODE, 1))));
                self.insert_node(&mut store, &target, NodeBody::File(file))?
            }
            Err(e) => return Err(e),
        };

        let file = store
            .lookup(ino)?
            .as_file()
            .cloned()
            .ok_or_else(|| VfsError::is_a_directory(&shown))?;
        {
            let mut body = file.write();
            if flags.truncate && flags.write {
                body.set_len(0, SystemTime::now());
            }
            body.open_count += 1;
        }
        let fh = self.handles.insert(ino, file, flags);
        debug!(ino, path = %shown, fh = fh.0, "open");
        Ok(fh)
    }

    /// Where `open` with `create` should place a new file: `path` itself, or
    /// the end of the chain of dangling symlinks starting at `path`.
    fn creation_target(&self, store: &NodeStore, path: &Path) -> VfsResult<PathBuf> {
        let resolver = self.resolver(store);
        let mut current = path.to_path_buf();
        for _ in 0..=self.config.max_symlink_depth {
            let link = match resolver.resolve(&current, Follow::NoFinal) {
                Ok(ino) => match &store.lookup(ino)?.body {
                    NodeBody::Symlink(link) => link.target.clone(),
                    _ => return Ok(current),
                },
                Err(_) => return Ok(current),
            };
            current = if link.starts_with('/') {
                PathBuf::from(link)
            } else {
                current.parent().unwrap_or(Path::new("/")).join(link)
            };
        }
        Err(VfsError::TooManySymlinks(show(path)))
    }

    /// Read through an open handle.
    pub fn read_handle(&self, fh: FileHandle, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let open = self.handles.get(fh)?;
        if !open.flags.read {
            return Err(VfsError::permission_denied(format!("handle {} not readable", fh.0)));
        }
        let data = open.file.read().read_at(offset, size);
        Ok(data)
    }

    /// Write through an open handle. Append handles always write at the end.
    pub fn write_handle(&self, fh: FileHandle, offset: u64, data: &[u8]) -> VfsResult<u32> {
        let open = self.handles.get(fh)?;
        if !open.flags.write {
            return Err(VfsError::permission_denied(format!("handle {} not writable", fh.0)));
        }
        let shown = format!("inode {}", open.ino);
        let written = u32::try_from(data.len())
            .map_err(|_| VfsError::invalid_argument(format!("{shown}: write too large")))?;

        let mut file = open.file.write();
        let offset = if open.flags.append {
            file.data.len() as u64
        } else {
            offset
        };
        let start = self.check_extent(offset, data.len() as u64, &shown)?;
        file.write_at(start, data, SystemTime::now());
        Ok(written)
    }

    /// Attributes of the file behind a handle, even if it was unlinked.
    pub fn handle_attr(&self, fh: FileHandle) -> VfsResult<FileAttr> {
        let open = self.handles.get(fh)?;
        let attr = open.file.read().attr(open.ino);
        Ok(attr)
    }

    /// Close a handle. An unlinked file goes away with its last handle.
    pub fn release(&self, fh: FileHandle) -> VfsResult<()> {
        let open = self.handles.remove(fh).inspect_err(|_| {
            warn!(fh = fh.0, "release of unknown handle");
        })?;

        let orphaned = {
            let _store = self.tree.read();
            let mut body = open.file.write();
            body.open_count = body.open_count.saturating_sub(1);
            body.is_orphaned()
        };
        if !orphaned {
            return Ok(());
        }

        // An orphan is unreachable by path, so nothing can reopen it between
        // the two guards.
        let mut store = self.tree.write();
        let still_ours = store
            .lookup(open.ino)
            .ok()
            .and_then(|node| node.as_file())
            .is_some_and(|file| Arc::ptr_eq(file, &open.file));
        if still_ours && open.file.read().is_orphaned() {
            store.unregister(open.ino);
            debug!(ino = open.ino, "released last handle of unlinked file");
        }
        Ok(())
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Filesystem statistics.
    pub fn statfs(&self) -> StatFs {
        let store = self.tree.read();
        let bsize = u64::from(self.config.block_size.max(1));
        let used = store.bytes_used().div_ceil(bsize);
        let free = self.config.max_file_size / bsize;
        let files = u64::from(u32::MAX);
        StatFs {
            blocks: used + free,
            bfree: free,
            bavail: free,
            files,
            ffree: files.saturating_sub(store.len() as u64),
            bsize: self.config.block_size,
            namelen: u32::try_from(self.config.name_max).unwrap_or(u32::MAX),
            frsize: self.config.block_size,
        }
    }

    /// Number of registered inodes, including unlinked files still open.
    pub fn inode_count(&self) -> usize {
        self.tree.read().len()
    }

    // ========================================================================
    // Convenience
    // ========================================================================

    /// Check if a path exists.
    pub fn exists(&self, path: &Path) -> bool {
        self.getattr(path).is_ok()
    }

    /// Read entire file contents.
    pub fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let store = self.tree.read();
        let file = self.file_at(&store, path)?;
        let data = file.read().data.clone();
        Ok(data)
    }

    /// Create or truncate, then write the whole file.
    pub fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        let fh = self.open(path, OpenFlags::create_truncate())?;
        let result = self.write_handle(fh, 0, data);
        self.release(fh)?;
        result.map(|_| ())
    }
}

/// Drop one directory entry's reference to `ino`, unregistering the node
/// unless an open handle still holds it.
fn drop_link(store: &mut NodeStore, ino: InodeId, now: SystemTime) -> VfsResult<()> {
    debug_assert_ne!(ino, ROOT_INO);
    let node = store.lookup_mut(ino)?;
    node.parent = None;
    let keep = match &node.body {
        NodeBody::File(file) => {
            let mut body = file.write();
            body.meta.nlink = body.meta.nlink.saturating_sub(1);
            body.meta.touch_changed(now);
            !body.is_orphaned()
        }
        _ => false,
    };
    if !keep {
        store.unregister(ino);
    }
    Ok(())
}

fn apply_setattr(meta: &mut Meta, set: &SetAttr, now: SystemTime) {
    if let Some(perm) = set.perm {
        meta.perm = perm & 0o7777;
    }
    if let Some(uid) = set.uid {
        meta.uid = uid;
    }
    if let Some(gid) = set.gid {
        meta.gid = gid;
    }
    if let Some(atime) = set.atime {
        meta.atime = atime;
    }
    if let Some(mtime) = set.mtime {
        meta.mtime = mtime;
    }
    meta.ctime = now;
}

fn show(path: &Path) -> String {
    path.display().to_string()
}
