//! Inode allocator and registry.

use std::collections::HashMap;

use super::error::{VfsError, VfsResult};
use super::node::{Directory, Meta, Node, NodeBody};
use super::types::{InodeId, ROOT_INO};

/// Maps inode numbers to nodes and hands out fresh inode numbers.
///
/// The store lives inside the engine's namespace lock, so allocation needs no
/// atomics: every caller already holds the lock exclusively.
#[derive(Debug)]
pub struct NodeStore {
    nodes: HashMap<InodeId, Node>,
    next_ino: InodeId,
}

impl NodeStore {
    /// A store holding only the root directory.
    pub fn new(root_meta: Meta) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INO,
            Node {
                ino: ROOT_INO,
                parent: None,
                body: NodeBody::Directory(Directory::new(root_meta)),
            },
        );
        Self {
            nodes,
            next_ino: ROOT_INO + 1,
        }
    }

    /// A fresh inode, strictly greater than any issued before.
    pub fn allocate(&mut self) -> InodeId {
        let ino = self.next_ino;
        self.next_ino += 1;
        ino
    }

    pub fn register(&mut self, node: Node) {
        debug_assert!(!self.nodes.contains_key(&node.ino));
        self.nodes.insert(node.ino, node);
    }

    pub fn unregister(&mut self, ino: InodeId) -> Option<Node> {
        debug_assert_ne!(ino, ROOT_INO);
        self.nodes.remove(&ino)
    }

    pub fn lookup(&self, ino: InodeId) -> VfsResult<&Node> {
        self.nodes
            .get(&ino)
            .ok_or_else(|| VfsError::not_found(format!("inode {ino}")))
    }

    pub fn lookup_mut(&mut self, ino: InodeId) -> VfsResult<&mut Node> {
        self.nodes
            .get_mut(&ino)
            .ok_or_else(|| VfsError::not_found(format!("inode {ino}")))
    }

    /// Directory body of `ino`, or NotADirectory with `path` as context.
    pub fn dir(&self, ino: InodeId, path: &str) -> VfsResult<&Directory> {
        self.lookup(ino)?
            .as_dir()
            .ok_or_else(|| VfsError::not_a_directory(path))
    }

    pub fn dir_mut(&mut self, ino: InodeId, path: &str) -> VfsResult<&mut Directory> {
        self.lookup_mut(ino)?
            .as_dir_mut()
            .ok_or_else(|| VfsError::not_a_directory(path))
    }

    /// Whether `ancestor` is `ino` or lies on its parent chain.
    pub fn is_ancestor_of(&self, ancestor: InodeId, ino: InodeId) -> bool {
        let mut current = Some(ino);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Number of registered nodes, including orphans held open.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Total bytes held by file bodies.
    pub fn bytes_used(&self) -> u64 {
        self.nodes
            .values()
            .filter_map(|n| n.as_file())
            .map(|f| f.read().data.len() as u64)
            .sum()
    }
}
