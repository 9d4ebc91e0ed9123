//! Path resolution.
//!
//! Paths are slash-separated and always walked from the root. Empty segments
//! and `.` are skipped, `..` follows the parent back-reference, and symlinks
//! in intermediate position are expanded in place.

use std::collections::VecDeque;
use std::path::Path;

use super::error::{VfsError, VfsResult};
use super::node::NodeBody;
use super::store::NodeStore;
use super::types::{InodeId, ROOT_INO};

/// Whether a symlink in the final position is followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Follow {
    /// Act on the link itself (lstat semantics).
    NoFinal,
    /// Act on what the link points at.
    Final,
}

/// Borrowed view of the store that turns paths into inodes.
pub struct Resolver<'a> {
    store: &'a NodeStore,
    name_max: usize,
    max_symlink_depth: u32,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a NodeStore, name_max: usize, max_symlink_depth: u32) -> Self {
        Self {
            store,
            name_max,
            max_symlink_depth,
        }
    }

    /// Resolve `path` to the inode it names.
    pub fn resolve(&self, path: &Path, follow: Follow) -> VfsResult<InodeId> {
        let display = path_str(path)?;
        let segs = segments(display).map(str::to_owned).collect();
        let mut hops = 0;
        self.walk(ROOT_INO, segs, follow, &mut hops, display)
    }

    /// Resolve everything but the last segment.
    ///
    /// Returns the parent directory's inode and the validated leaf name.
    pub fn resolve_parent(&self, path: &Path) -> VfsResult<(InodeId, String)> {
        let display = path_str(path)?;
        let mut segs: Vec<String> = segments(display).map(str::to_owned).collect();
        let leaf = segs.pop().ok_or_else(|| VfsError::invalid_name(display))?;
        validate_name(&leaf, self.name_max)?;

        let mut hops = 0;
        let parent = self.walk(ROOT_INO, segs, Follow::Final, &mut hops, display)?;
        self.store.dir(parent, display)?;
        Ok((parent, leaf))
    }

    fn walk(
        &self,
        start: InodeId,
        segs: Vec<String>,
        follow: Follow,
        hops: &mut u32,
        display: &str,
    ) -> VfsResult<InodeId> {
        let mut pending: VecDeque<String> = segs.into();
        let mut current = start;

        while let Some(seg) = pending.pop_front() {
            let dir = self.store.dir(current, display)?;
            match seg.as_str() {
                "." => {}
                ".." => {
                    current = self.store.lookup(current)?.parent.unwrap_or(ROOT_INO);
                }
                name => {
                    if name.len() > self.name_max {
                        return Err(VfsError::NameTooLong(display.to_string()));
                    }
                    let child = *dir
                        .entries
                        .get(name)
                        .ok_or_else(|| VfsError::not_found(display))?;

                    let node = self.store.lookup(child)?;
                    let expand = !pending.is_empty() || follow == Follow::Final;
                    match &node.body {
                        NodeBody::Symlink(link) if expand => {
                            *hops += 1;
                            if *hops > self.max_symlink_depth {
                                return Err(VfsError::TooManySymlinks(display.to_string()));
                            }
                            if link.target.starts_with('/') {
                                current = ROOT_INO;
                            }
                            for s in segments(&link.target).rev() {
                                pending.push_front(s.to_owned());
                            }
                        }
                        _ => current = child,
                    }
                }
            }
        }

        Ok(current)
    }
}

/// Check a single directory entry name.
pub fn validate_name(name: &str, name_max: usize) -> VfsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(VfsError::invalid_name(name));
    }
    if name.len() > name_max {
        return Err(VfsError::NameTooLong(name.to_string()));
    }
    Ok(())
}

fn path_str(path: &Path) -> VfsResult<&str> {
    path.to_str()
        .ok_or_else(|| VfsError::invalid_name(path.display().to_string()))
}

fn segments(path: &str) -> impl DoubleEndedIterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
