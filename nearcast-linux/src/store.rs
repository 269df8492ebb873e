//! Filesystem-backed storage for incoming file transfers.
//!
//! Paths declared on the wire are absolute device paths from the sender's
//! point of view; they are re-rooted under the configured download
//! directory so a remote sender can never write outside it.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use nearcast_core::FileStore;

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: PathBuf) -> Self {
        FsStore { root }
    }

    /// Join a wire path onto the download root, discarding any leading
    /// separators and `..` components.
    fn resolve(&self, path: &str) -> PathBuf {
        let mut out = self.root.clone();
        for comp in Path::new(path).components() {
            if let Component::Normal(part) = comp {
                out.push(part);
            }
        }
        out
    }
}

impl FileStore for FsStore {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn make_dir(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path))
    }

    fn append(&self, path: &str, data: &[u8]) -> io::Result<()> {
        // Open-write-close per chunk, so a crash mid-transfer leaves all
        // completed chunks on disk.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(path))?;
        file.write_all(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearcast_core::FileStore;

    #[test]
    fn reroots_absolute_wire_paths() {
        let store = FsStore::new(PathBuf::from("/tmp/dl"));
        assert_eq!(store.resolve("/photos/cat.jpg"), PathBuf::from("/tmp/dl/photos/cat.jpg"));
    }

    #[test]
    fn strips_parent_components() {
        let store = FsStore::new(PathBuf::from("/tmp/dl"));
        assert_eq!(store.resolve("../../etc/passwd"), PathBuf::from("/tmp/dl/etc/passwd"));
    }

    #[test]
    fn appends_accumulate() {
        let dir = std::env::temp_dir().join(format!("nearcast-store-{}", std::process::id()));
        let store = FsStore::new(dir.clone());
        store.make_dir("x").unwrap();
        store.append("x/a.bin", b"hello ").unwrap();
        store.append("x/a.bin", b"world").unwrap();
        assert!(store.exists("x/a.bin"));
        assert_eq!(fs::read(dir.join("x/a.bin")).unwrap(), b"hello world");
        let _ = fs::remove_dir_all(dir);
    }
}
