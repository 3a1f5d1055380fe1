//! Single-instance guard
//!
//! An exclusive advisory `flock` on a lock file keeps a second proxy from
//! starting with the same lock path. The lock goes away with the process,
//! so a crashed instance never blocks a restart. The file itself stays on
//! disk: every starter must lock the same inode.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::InstanceError;

/// Held for the lifetime of the running proxy
#[derive(Debug)]
pub struct InstanceGuard {
    file: File,
    path: PathBuf,
}

impl InstanceGuard {
    /// Take the lock at `path`
    ///
    /// # Errors
    ///
    /// Returns `InstanceError::AlreadyRunning` if another process holds the
    /// lock and `InstanceError::LockFile` if the file cannot be opened.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, InstanceError> {
        let path = path.into();
        let lock_error = |reason: String| InstanceError::LockFile {
            path: path.display().to_string(),
            reason,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(&path)
            .map_err(|e| lock_error(e.to_string()))?;

        // SAFETY: the descriptor belongs to `file`, which outlives the call.
        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if ret != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(InstanceError::AlreadyRunning {
                    path: path.display().to_string(),
                });
            }
            return Err(lock_error(err.to_string()));
        }

        // The pid is informational only
        if let Err(e) = file
            .set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()))
        {
            debug!("Could not record pid in {:?}: {}", path, e);
        }

        info!("Instance lock held on {:?}", path);
        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        // Closing the file releases the lock
        debug!("Released instance lock {:?} (fd={})", self.path, self.file.as_raw_fd());
    }
}
