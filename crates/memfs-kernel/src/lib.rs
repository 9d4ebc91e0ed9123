//! # memfs-kernel
//!
//! In-memory POSIX-style filesystem engine.
//!
//! The engine keeps a single directory tree of files, directories and
//! symbolic links entirely in memory. It is meant to sit behind a protocol
//! adapter (FUSE, NFS, 9P) that decodes requests into [`Op`]s and maps
//! [`VfsError`]s to errno values; the engine itself knows nothing about any
//! wire format.
//!
//! ```
//! use memfs_kernel::Engine;
//! use std::path::Path;
//!
//! let fs = Engine::new();
//! fs.mkdir(Path::new("docs"), 0o755).unwrap();
//! fs.write_all(Path::new("docs/readme"), b"hi").unwrap();
//! assert_eq!(fs.read_all(Path::new("docs/readme")).unwrap(), b"hi");
//! ```

pub mod config;
pub mod vfs;

pub use config::{ConfigError, EngineConfig};
pub use vfs::{
    DirEntry, Engine, FileAttr, FileHandle, FileType, InodeId, Op, OpenFlags, Reply, SetAttr,
    StatFs, Status, VfsError, VfsResult,
};
