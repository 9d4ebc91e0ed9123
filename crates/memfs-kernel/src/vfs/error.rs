//! VFS error types.

use std::fmt;
use std::io;
use thiserror::Error;

/// VFS error type.
///
/// Every engine operation either succeeds or fails with exactly one of these
/// kinds, and a failed operation leaves the tree untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Entry name is empty, `.`, `..`, or not valid UTF-8.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Rename into own subtree, or an offset/size out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Handle was not opened with the access the operation needs.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Not a symbolic link.
    #[error("not a symbolic link: {0}")]
    NotASymlink(String),

    /// Too many symbolic links.
    #[error("too many symbolic links: {0}")]
    TooManySymlinks(String),

    /// File name too long.
    #[error("file name too long: {0}")]
    NameTooLong(String),

    /// Unknown or already released file handle.
    #[error("bad file handle: {0}")]
    BadHandle(u64),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create an InvalidName error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// The protocol status an adapter should report for this error.
    pub fn status(&self) -> Status {
        match self {
            VfsError::NotFound(_) => Status::NoEntry,
            VfsError::AlreadyExists(_) => Status::Exists,
            VfsError::NotADirectory(_) => Status::NotDirectory,
            VfsError::IsADirectory(_) => Status::IsDirectory,
            VfsError::DirectoryNotEmpty(_) => Status::NotEmpty,
            VfsError::InvalidName(_) | VfsError::InvalidArgument(_) => Status::Invalid,
            VfsError::PermissionDenied(_) => Status::AccessDenied,
            VfsError::NotASymlink(_) => Status::Invalid,
            VfsError::TooManySymlinks(_) => Status::Loop,
            VfsError::NameTooLong(_) => Status::NameTooLong,
            VfsError::BadHandle(_) => Status::BadHandle,
        }
    }
}

/// Protocol-neutral status reported back through an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    NoEntry,
    Exists,
    NotDirectory,
    IsDirectory,
    NotEmpty,
    Invalid,
    AccessDenied,
    Loop,
    NameTooLong,
    BadHandle,
}

impl Status {
    /// Conventional Linux errno for this status.
    pub fn errno(self) -> i32 {
        match self {
            Status::NoEntry => 2,       // ENOENT
            Status::BadHandle => 9,     // EBADF
            Status::AccessDenied => 13, // EACCES
            Status::Exists => 17,       // EEXIST
            Status::NotDirectory => 20, // ENOTDIR
            Status::IsDirectory => 21,  // EISDIR
            Status::Invalid => 22,      // EINVAL
            Status::NameTooLong => 36,  // ENAMETOOLONG
            Status::NotEmpty => 39,     // ENOTEMPTY
            Status::Loop => 40,         // ELOOP
        }
    }

    /// Human-readable description.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::NoEntry => "no such entry",
            Status::Exists => "entry exists",
            Status::NotDirectory => "not a directory",
            Status::IsDirectory => "is a directory",
            Status::NotEmpty => "directory not empty",
            Status::Invalid => "invalid argument",
            Status::AccessDenied => "permission denied",
            Status::Loop => "too many levels of symbolic links",
            Status::NameTooLong => "file name too long",
            Status::BadHandle => "bad file handle",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        let kind = match &e {
            VfsError::NotFound(_) => io::ErrorKind::NotFound,
            VfsError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            VfsError::NotADirectory(_) => io::ErrorKind::NotADirectory,
            VfsError::IsADirectory(_) => io::ErrorKind::IsADirectory,
            VfsError::DirectoryNotEmpty(_) => io::ErrorKind::DirectoryNotEmpty,
            VfsError::InvalidName(_)
            | VfsError::InvalidArgument(_)
            | VfsError::NotASymlink(_)
            | VfsError::NameTooLong(_) => io::ErrorKind::InvalidInput,
            VfsError::PermissionDenied(_) => io::ErrorKind::PermissionDenied,
            VfsError::TooManySymlinks(_) | VfsError::BadHandle(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
