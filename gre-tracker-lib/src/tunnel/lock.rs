//! Per-endpoint file locks.
//!
//! One lock file per address, `<dir>/<addr>.lock`, created on first use and
//! never removed. An exclusive `flock` on it serializes every tunnel action
//! for that address, across threads and across processes that honour the
//! same directory.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::net::Ipv4Addr;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LockDirError {
    #[error("lock_dir path exists but not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("mkdir {path} failed: {source}")]
    Create { path: PathBuf, source: io::Error },
    #[error("stat {path} failed: {source}")]
    Stat { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct LockDir {
    path: PathBuf,
}

impl LockDir {
    /// Use `path` as lock directory, creating it (mode 0755) when missing.
    pub fn prepare(path: impl Into<PathBuf>) -> Result<Self, LockDirError> {
        let path = path.into();
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => return Ok(LockDir { path }),
            Ok(_) => return Err(LockDirError::NotADirectory(path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(LockDirError::Stat { path, source }),
        }

        match DirBuilder::new().mode(0o755).create(&path) {
            Ok(()) => Ok(LockDir { path }),
            // lost a race with another worker
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {
                Ok(LockDir { path })
            }
            Err(source) => Err(LockDirError::Create { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self, addr: Ipv4Addr) -> PathBuf {
        self.path.join(format!("{addr}.lock"))
    }

    /// Block until the exclusive lock for `addr` is held.
    pub fn lock(&self, addr: Ipv4Addr) -> io::Result<AddressLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .mode(0o644)
            .open(self.lock_path(addr))?;
        FileExt::lock_exclusive(&file)?;
        Ok(AddressLock { file, addr })
    }
}

/// Held lock on one address; released on drop.
#[derive(Debug)]
pub struct AddressLock {
    file: File,
    addr: Ipv4Addr,
}

impl Drop for AddressLock {
    fn drop(&mut self) {
        // closing the descriptor releases the lock anyway
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("unlock {} failed: {}", self.addr, e);
        }
    }
}
