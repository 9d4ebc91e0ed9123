//! Request dispatch.
//!
//! Protocol adapters decode a request into an [`Op`], hand it to
//! [`Engine::dispatch`], and encode the [`Reply`] (or the error's
//! [`Status`](super::error::Status)) back onto the wire.

use std::path::PathBuf;
use strum::IntoStaticStr;
use tracing::trace;

use super::engine::Engine;
use super::error::VfsResult;
use super::types::{DirEntry, FileAttr, FileHandle, OpenFlags, SetAttr, StatFs};

/// One filesystem request.
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Op {
    Create { path: PathBuf, mode: u32 },
    Mkdir { path: PathBuf, mode: u32 },
    Symlink { path: PathBuf, target: PathBuf },
    Getattr { path: PathBuf },
    Readdir { path: PathBuf, offset: usize },
    Readlink { path: PathBuf },
    Read { path: PathBuf, offset: u64, size: u32 },
    Write { path: PathBuf, offset: u64, data: Vec<u8> },
    Truncate { path: PathBuf, size: u64 },
    Unlink { path: PathBuf },
    Rmdir { path: PathBuf },
    Rename { from: PathBuf, to: PathBuf },
    Setattr { path: PathBuf, set: SetAttr },
    Open { path: PathBuf, flags: OpenFlags },
    ReadHandle { fh: FileHandle, offset: u64, size: u32 },
    WriteHandle { fh: FileHandle, offset: u64, data: Vec<u8> },
    Release { fh: FileHandle },
    Statfs,
}

impl Op {
    /// Operation name for logs, e.g. `"read_handle"`.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Successful result of an [`Op`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Attr(FileAttr),
    Entries(Vec<DirEntry>),
    Data(Vec<u8>),
    Written(u32),
    Target(PathBuf),
    Opened(FileHandle),
    StatFs(StatFs),
    Empty,
}

impl Engine {
    /// Execute one request.
    #[tracing::instrument(skip(self, op), name = "vfs.dispatch", fields(vfs.op = op.name()))]
    pub fn dispatch(&self, op: Op) -> VfsResult<Reply> {
        let reply = match op {
            Op::Create { path, mode } => Reply::Attr(self.create(&path, mode)?),
            Op::Mkdir { path, mode } => Reply::Attr(self.mkdir(&path, mode)?),
            Op::Symlink { path, target } => Reply::Attr(self.symlink(&path, &target)?),
            Op::Getattr { path } => Reply::Attr(self.getattr(&path)?),
            Op::Readdir { path, offset } => Reply::Entries(self.readdir_from(&path, offset)?),
            Op::Readlink { path } => Reply::Target(self.readlink(&path)?),
            Op::Read { path, offset, size } => Reply::Data(self.read(&path, offset, size)?),
            Op::Write { path, offset, data } => Reply::Written(self.write(&path, offset, &data)?),
            Op::Truncate { path, size } => {
                self.truncate(&path, size)?;
                Reply::Empty
            }
            Op::Unlink { path } => {
                self.unlink(&path)?;
                Reply::Empty
            }
            Op::Rmdir { path } => {
                self.rmdir(&path)?;
                Reply::Empty
            }
            Op::Rename { from, to } => {
                self.rename(&from, &to)?;
                Reply::Empty
            }
            Op::Setattr { path, set } => Reply::Attr(self.setattr(&path, set)?),
            Op::Open { path, flags } => Reply::Opened(self.open(&path, flags)?),
            Op::ReadHandle { fh, offset, size } => {
                Reply::Data(self.read_handle(fh, offset, size)?)
            }
            Op::WriteHandle { fh, offset, data } => {
                Reply::Written(self.write_handle(fh, offset, &data)?)
            }
            Op::Release { fh } => {
                self.release(fh)?;
                Reply::Empty
            }
            Op::Statfs => Reply::StatFs(self.statfs()),
        };
        trace!(?reply, "dispatched");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::error::{Status, VfsError};

    #[test]
    fn test_op_names() {
        assert_eq!(Op::Statfs.name(), "statfs");
        assert_eq!(
            Op::ReadHandle {
                fh: FileHandle(1),
                offset: 0,
                size: 1
            }
            .name(),
            "read_handle"
        );
        assert_eq!(Op::Getattr { path: "/".into() }.name(), "getattr");
    }

    #[test]
    fn test_dispatch_roundtrip() {
        let fs = Engine::new();
        let reply = fs
            .dispatch(Op::Mkdir {
                path: "docs".into(),
                mode: 0o755,
            })
            .unwrap();
        assert!(matches!(reply, Reply::Attr(attr) if attr.is_dir()));

        fs.dispatch(Op::Create {
            path: "docs/a".into(),
            mode: 0o644,
        })
        .unwrap();
        let written = fs
            .dispatch(Op::Write {
                path: "docs/a".into(),
                offset: 0,
                data: b"hello".to_vec(),
            })
            .unwrap();
        assert_eq!(written, Reply::Written(5));

        let data = fs
            .dispatch(Op::Read {
                path: "docs/a".into(),
                offset: 1,
                size: 3,
            })
            .unwrap();
        assert_eq!(data, Reply::Data(b"ell".to_vec()));

        let Reply::Entries(entries) = fs
            .dispatch(Op::Readdir {
                path: "docs".into(),
                offset: 0,
            })
            .unwrap()
        else {
            panic!("expected entries");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a");
    }

    #[test]
    fn test_dispatch_handles() {
        let fs = Engine::new();
        let Reply::Opened(fh) = fs
            .dispatch(Op::Open {
                path: "f".into(),
                flags: OpenFlags::create(),
            })
            .unwrap()
        else {
            panic!("expected handle");
        };
        fs.dispatch(Op::WriteHandle {
            fh,
            offset: 0,
            data: b"xyz".to_vec(),
        })
        .unwrap();
        assert_eq!(
            fs.dispatch(Op::ReadHandle {
                fh,
                offset: 0,
                size: 10
            })
            .unwrap(),
            Reply::Data(b"xyz".to_vec())
        );
        assert_eq!(fs.dispatch(Op::Release { fh }).unwrap(), Reply::Empty);
    }

    #[test]
    fn test_dispatch_error_status() {
        let fs = Engine::new();
        let err = fs
            .dispatch(Op::Unlink {
                path: "missing".into(),
            })
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
        assert_eq!(err.status(), Status::NoEntry);
        assert_eq!(err.status().errno(), 2);
    }
}
