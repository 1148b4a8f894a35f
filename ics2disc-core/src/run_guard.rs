//! Host-wide lock so only one sync run is active at a time.
//!
//! A run that finds the lock held exits without doing anything: the lock is
//! advisory (`flock`), so a crashed run never leaves a stale lock behind.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Releases the lock when dropped.
#[derive(Debug)]
pub struct RunGuard {
    _file: File,
    path: PathBuf,
}

#[derive(Debug)]
pub enum Acquire {
    Acquired(RunGuard),
    /// Another run holds the lock.
    Busy,
}

impl RunGuard {
    /// Try to take the lock at `path` without blocking.
    pub fn acquire(path: &Path) -> io::Result<Acquire> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Acquire::Acquired(RunGuard {
                _file: file,
                path: path.to_path_buf(),
            })),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(Acquire::Busy),
            Err(err) => Err(err),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `$XDG_RUNTIME_DIR/ics2disc/sync.lock`, falling back to the cache dir.
pub fn default_lock_path() -> io::Result<PathBuf> {
    let base = dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Could not determine runtime directory"))?;
    Ok(base.join("ics2disc").join("sync.lock"))
}
