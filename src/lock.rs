//! Advisory locks shared by every process using one data directory
//!
//! A `watch` loop and one-off commands can run side by side against the same
//! files. Writers take a [`DirLock`] so their read-modify-write cycles do not
//! interleave. The lock is released when the guard is dropped, or when the
//! process dies.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// A lock file on disk
#[derive(Debug, Clone)]
pub struct DirLock {
    path: PathBuf,
}

/// Holds the lock until dropped
#[derive(Debug)]
pub struct DirLockGuard {
    _file: File,
}

impl DirLock {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)
    }

    /// Blocks until the lock is free
    pub fn acquire(&self) -> io::Result<DirLockGuard> {
        let file = self.open()?;
        file.lock_exclusive()?;
        Ok(DirLockGuard { _file: file })
    }

    /// Takes the lock if nobody holds it; `Ok(None)` if someone does
    pub fn try_acquire(&self) -> io::Result<Option<DirLockGuard>> {
        let file = self.open()?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(DirLockGuard { _file: file })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_holder_is_turned_away() {
        let temp_dir = TempDir::new().unwrap();
        let first = DirLock::new(temp_dir.path().join("refresh.lock"));
        let second = DirLock::new(temp_dir.path().join("refresh.lock"));

        let guard = first.try_acquire().unwrap().expect("lock should be free");
        assert!(second.try_acquire().unwrap().is_none());

        drop(guard);
        assert!(second.try_acquire().unwrap().is_some());
    }

    #[test]
    fn test_acquire_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let lock = DirLock::new(temp_dir.path().join("nested").join("config.lock"));

        let _guard = lock.acquire().unwrap();
        assert!(lock.path().exists());
    }
}
