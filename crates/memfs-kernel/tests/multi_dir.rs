//! End-to-end tree workload: build a nested tree of directories and files
//! written in 1 KiB chunks, then verify every entry's kind, size and content.

mod common;

use std::path::Path;

use memfs_kernel::{Engine, FileType, OpenFlags, VfsError};
use rand::RngCore;

const CHUNK: usize = 1024;

struct Entry {
    path: &'static str,
    is_dir: bool,
    size: usize,
    content: Vec<u8>,
}

fn dir(path: &'static str) -> Entry {
    Entry {
        path,
        is_dir: true,
        size: 0,
        content: Vec::new(),
    }
}

fn file(path: &'static str, size: usize) -> Entry {
    Entry {
        path,
        is_dir: false,
        size,
        content: Vec::new(),
    }
}

fn layout() -> Vec<Entry> {
    vec![
        dir("dir1"),
        dir("dir2"),
        dir("dir3"),
        file("file1", 1024 * 1024),
        file("dir1/file11", 512 * 1024),
        file("dir1/file12", 1024 * 1024),
        file("dir3/file31", 1024 * 1024),
        file("dir3/file32", 1024 * 1024),
        file("dir3/file33", 1024),
        dir("dir2/dir4"),
        dir("dir2/dir4/dir5"),
        file("dir2/dir4/file241", 5 * 1024 * 1024),
        file("dir2/dir4/dir5/file2451", 10 * 1024 * 1024),
    ]
}

/// Create every entry; files are opened, filled chunk by chunk through the
/// handle, then released.
fn build(fs: &Engine, entries: &mut [Entry]) {
    let mut rng = rand::thread_rng();
    let mut buf = [0u8; CHUNK];

    for entry in entries.iter_mut() {
        let path = Path::new(entry.path);
        if entry.is_dir {
            fs.mkdir(path, 0o755).unwrap();
            continue;
        }

        fs.create(path, 0o644).unwrap();
        let fh = fs.open(path, OpenFlags::write()).unwrap();
        let mut off = 0;
        while off < entry.size {
            rng.fill_bytes(&mut buf);
            let n = fs.write_handle(fh, off as u64, &buf).unwrap();
            assert_eq!(n as usize, CHUNK, "short write to {}", entry.path);
            entry.content.extend_from_slice(&buf);
            off += n as usize;
        }
        fs.release(fh).unwrap();
    }
}

fn verify(fs: &Engine, entries: &[Entry]) {
    for entry in entries {
        let path = Path::new(entry.path);
        let attr = fs.getattr(path).unwrap();
        assert_eq!(attr.is_dir(), entry.is_dir, "kind of {}", entry.path);
        if entry.is_dir {
            continue;
        }
        assert_eq!(attr.size, entry.size as u64, "size of {}", entry.path);
        let got = fs.read(path, 0, entry.size as u32).unwrap();
        assert!(got == entry.content, "content of {} differs", entry.path);
    }
}

#[test]
fn test_multi_dir_with_files() {
    common::init_tracing();
    let fs = Engine::new();
    let mut entries = layout();

    build(&fs, &mut entries);
    verify(&fs, &entries);
}

#[test]
fn test_listings_match_layout() {
    common::init_tracing();
    let fs = Engine::new();
    let mut entries = layout();
    build(&fs, &mut entries);

    let root: Vec<_> = fs
        .readdir(Path::new("/"))
        .unwrap()
        .into_iter()
        .map(|e| (e.name, e.kind))
        .collect();
    assert_eq!(
        root,
        [
            ("dir1".to_string(), FileType::Directory),
            ("dir2".to_string(), FileType::Directory),
            ("dir3".to_string(), FileType::Directory),
            ("file1".to_string(), FileType::File),
        ]
    );

    let dir4: Vec<_> = fs
        .readdir(Path::new("dir2/dir4"))
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(dir4, ["dir5", "file241"]);

    // root + 5 directories + 8 files
    assert_eq!(fs.inode_count(), 14);
}

#[test]
fn test_restructure_and_tear_down() {
    common::init_tracing();
    let fs = Engine::new();
    let mut entries = layout();
    build(&fs, &mut entries);

    let content = fs.read_all(Path::new("dir2/dir4/file241")).unwrap();
    fs.rename(Path::new("dir2/dir4"), Path::new("dir1/moved")).unwrap();
    assert!(!fs.exists(Path::new("dir2/dir4")));
    assert_eq!(fs.read_all(Path::new("dir1/moved/file241")).unwrap(), content);
    assert!(fs.getattr(Path::new("dir1/moved/dir5/file2451")).unwrap().is_file());

    assert!(matches!(
        fs.rmdir(Path::new("dir1")),
        Err(VfsError::DirectoryNotEmpty(_))
    ));

    fs.unlink(Path::new("dir1/moved/dir5/file2451")).unwrap();
    fs.rmdir(Path::new("dir1/moved/dir5")).unwrap();
    fs.unlink(Path::new("dir1/moved/file241")).unwrap();
    fs.rmdir(Path::new("dir1/moved")).unwrap();
    fs.unlink(Path::new("dir1/file11")).unwrap();
    fs.unlink(Path::new("dir1/file12")).unwrap();
    fs.rmdir(Path::new("dir1")).unwrap();

    let stats = fs.statfs();
    assert_eq!(stats.files - stats.ffree, fs.inode_count() as u64);
    assert_eq!(fs.inode_count(), 7);
}
