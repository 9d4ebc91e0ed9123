//! In-memory filesystem engine.
//!
//! Key components:
//!
//! - [`Engine`] - The tree, its locks, and every operation
//! - [`Op`] / [`Reply`] - Closed request set for protocol adapters
//! - [`VfsError`] / [`Status`] - Failures and their POSIX errno mapping
//!
//! ## Design Decisions
//!
//! - **Path-based API, inode identities**: Operations take paths; every node
//!   carries a stable inode number that is never reused.
//! - **Arena ownership**: Directories map names to inode numbers and nodes
//!   point back at their parent by number, so there are no reference cycles.
//! - **Two lock levels**: One namespace lock for structure, one lock per file
//!   body for content.
//! - **Deferred destruction**: An unlinked file lives on while handles to it
//!   remain open.

mod engine;
mod error;
mod handles;
mod node;
mod ops;
mod resolve;
mod store;
mod types;

pub use engine::{DEFAULT_FILE_MODE, Engine};
pub use error::{Status, VfsError, VfsResult};
pub use ops::{Op, Reply};
pub use resolve::validate_name;
pub use types::{
    DirEntry, FileAttr, FileHandle, FileType, InodeId, OpenFlags, ROOT_INO, S_IFDIR, S_IFLNK,
    S_IFREG, SetAttr, StatFs,
};
