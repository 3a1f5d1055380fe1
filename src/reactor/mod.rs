//! Single-threaded readiness reactor
//!
//! Each turn builds a `poll(2)` set from the [`Registry`], blocks until at
//! least one descriptor is ready, then hands every ready descriptor to a
//! [`Dispatch`] implementation in ascending descriptor order: the read
//! handler first, then the write handler.
//!
//! Handlers may close arbitrary descriptors, including ones later in the
//! same batch. The reactor therefore re-checks arming through the registry
//! immediately before every call, and tokens are generational so a slot
//! reused mid-batch is never mistaken for the closed entry.

mod buffer;
mod registry;

use std::fmt;
use std::io;
use std::time::Duration;

use tracing::trace;

use crate::error::ReactorError;

pub use buffer::{RelayBuffer, RELAY_BUFFER_SIZE};
pub use registry::{Direction, Endpoint, Entry, Handler, Interest, Registry, Token};

/// Receives ready descriptors from the reactor
pub trait Dispatch {
    /// Run `handler` for the descriptor behind `token`
    fn dispatch(&mut self, registry: &mut Registry, handler: Handler, token: Token);
}

#[derive(Clone, Copy, Debug)]
struct Ready {
    token: Token,
    readable: bool,
    writable: bool,
}

/// Owns the registry and drives one readiness wait per turn
pub struct Reactor {
    registry: Registry,
    poll_fds: Vec<libc::pollfd>,
    poll_tokens: Vec<Token>,
    ready: Vec<Ready>,
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Reactor {
    /// Create a reactor with room for `capacity` descriptors
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Registry::with_capacity(capacity),
            poll_fds: Vec::with_capacity(capacity),
            poll_tokens: Vec::with_capacity(capacity),
            ready: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Block until something is ready and dispatch it
    ///
    /// Returns the number of handler calls made. An interrupted wait makes
    /// zero calls and is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ReactorError::Poll` if the readiness wait fails.
    pub fn run_once<D: Dispatch>(&mut self, dispatcher: &mut D) -> Result<usize, ReactorError> {
        self.turn(dispatcher, None)
    }

    /// Like [`run_once`](Self::run_once) with an optional upper bound on the wait
    ///
    /// # Errors
    ///
    /// Returns `ReactorError::Poll` if the readiness wait fails.
    pub fn turn<D: Dispatch>(
        &mut self,
        dispatcher: &mut D,
        timeout: Option<Duration>,
    ) -> Result<usize, ReactorError> {
        self.poll_fds.clear();
        self.poll_tokens.clear();
        self.ready.clear();

        for interest in self.registry.interests() {
            let mut events: libc::c_short = 0;
            if interest.readable {
                events |= libc::POLLIN;
            }
            if interest.writable {
                events |= libc::POLLOUT;
            }
            self.poll_fds.push(libc::pollfd {
                fd: interest.fd,
                events,
                revents: 0,
            });
            self.poll_tokens.push(interest.token);
        }

        if self.poll_fds.is_empty() {
            return Ok(0);
        }

        let timeout_ms = timeout.map_or(-1, |t| {
            libc::c_int::try_from(t.as_millis()).unwrap_or(libc::c_int::MAX)
        });

        // SAFETY: poll_fds is a live, initialised buffer of exactly
        // poll_fds.len() pollfd structs for the duration of the call.
        let ret = unsafe {
            libc::poll(
                self.poll_fds.as_mut_ptr(),
                self.poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                trace!("poll interrupted");
                return Ok(0);
            }
            return Err(ReactorError::Poll(err));
        }
        if ret == 0 {
            return Ok(0);
        }

        // Snapshot first; handlers mutate the registry while we walk the batch
        for (pfd, &token) in self.poll_fds.iter().zip(&self.poll_tokens) {
            let revents = pfd.revents;
            if revents == 0 {
                continue;
            }
            self.ready.push(Ready {
                token,
                readable: revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL)
                    != 0,
                writable: revents & (libc::POLLOUT | libc::POLLERR) != 0,
            });
        }

        let mut dispatched = 0;
        for ready in &self.ready {
            if ready.readable {
                if let Some(handler) = self.registry.is_armed(ready.token, Direction::Read) {
                    trace!("{:?} on {}", handler, ready.token);
                    dispatcher.dispatch(&mut self.registry, handler, ready.token);
                    dispatched += 1;
                }
            }
            if ready.writable {
                if let Some(handler) = self.registry.is_armed(ready.token, Direction::Write) {
                    trace!("{:?} on {}", handler, ready.token);
                    dispatcher.dispatch(&mut self.registry, handler, ready.token);
                    dispatched += 1;
                }
            }
        }

        Ok(dispatched)
    }
}
