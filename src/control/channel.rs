//! Named FIFO control channel
//!
//! The proxy owns the FIFO and reads it nonblocking; a writer opens it,
//! writes one command and closes it. The reader sees end-of-input once the
//! writer is gone and has to reopen the FIFO for the next command.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ControlError;
use crate::reactor::RELAY_BUFFER_SIZE;

/// Longest command accepted in one writer cycle
pub const MAX_COMMAND_LEN: usize = RELAY_BUFFER_SIZE;

/// Owner read/write, group write
const FIFO_MODE: libc::mode_t = 0o620;

/// The proxy's end of the control FIFO; removed from disk on drop
#[derive(Debug)]
pub struct ControlChannel {
    path: PathBuf,
}

impl ControlChannel {
    /// Create the FIFO at `path`, replacing a stale one
    ///
    /// # Errors
    ///
    /// Returns `ControlError::ChannelCreate` if the path cannot be cleared
    /// or `mkfifo` fails.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, ControlError> {
        let path = path.into();
        let create_error = |reason: String| ControlError::ChannelCreate {
            path: path.display().to_string(),
            reason,
        };

        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale control channel {:?}", path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(create_error(format!("Failed to remove existing file: {e}"))),
        }

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| create_error("path contains a NUL byte".into()))?;

        // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
        let ret = unsafe { libc::mkfifo(c_path.as_ptr(), FIFO_MODE) };
        if ret != 0 {
            return Err(create_error(io::Error::last_os_error().to_string()));
        }

        info!("Control channel ready at {:?}", path);
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the read side without waiting for a writer
    ///
    /// # Errors
    ///
    /// Returns `ControlError::ChannelOpen` if the FIFO cannot be opened.
    pub fn open(&self) -> Result<File, ControlError> {
        OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
            .map_err(|e| ControlError::ChannelOpen {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove control channel {:?}: {}", self.path, e);
            }
        }
    }
}

/// Writer side, used by `tcproxy --send`
#[derive(Debug, Clone)]
pub struct ControlClient {
    path: PathBuf,
    attempts: u32,
    retry_delay: Duration,
}

impl ControlClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            attempts: 20,
            retry_delay: Duration::from_millis(50),
        }
    }

    /// Deliver one command and close the channel
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NotListening` if no instance reads the FIFO,
    /// `ControlError::CommandTooLong` for oversized commands and
    /// `ControlError::IoError` if the write fails.
    pub fn send(&self, command: &str) -> Result<(), ControlError> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(ControlError::CommandTooLong {
                max: MAX_COMMAND_LEN,
            });
        }

        let mut fifo = self.open_writer()?;
        fifo.write_all(command.as_bytes())?;
        debug!("Sent {:?} to {:?}", command, self.path);
        Ok(())
    }

    fn open_writer(&self) -> Result<File, ControlError> {
        let not_listening = || ControlError::NotListening {
            path: self.path.display().to_string(),
        };

        for _ in 0..self.attempts {
            match OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&self.path)
            {
                Ok(file) => return Ok(file),
                // The reader is between two opens
                Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                    thread::sleep(self.retry_delay);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_listening()),
                Err(e) => {
                    return Err(ControlError::ChannelOpen {
                        path: self.path.display().to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        Err(not_listening())
    }
}
