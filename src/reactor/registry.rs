//! Descriptor registry
//!
//! A bounded arena of slots, one per open monitored descriptor, addressed by
//! generational [`Token`]s. A side table maps native descriptors to tokens so
//! the reactor can visit ready descriptors in ascending order.
//!
//! Removing an entry bumps the slot generation, so a token held by a stale
//! peer link or a dispatch snapshot can never reach the slot's next tenant.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};

use tracing::debug;

use super::buffer::RelayBuffer;
use crate::error::ReactorError;

/// Opaque handle to a registry slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    index: u32,
    generation: u32,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Handler tag attached to a readiness direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    /// Accept on the listening socket
    Accept,
    /// Read from a relayed socket into its peer's buffer
    Read,
    /// Flush a relayed socket's own buffer
    Write,
    /// Accumulate control channel text
    Command,
}

/// Readiness direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// The owned I/O object behind a slot; dropping it closes the descriptor
#[derive(Debug)]
pub enum Endpoint {
    Listener(TcpListener),
    Stream(TcpStream),
    Control(File),
}

impl Endpoint {
    /// The listening socket, if this is one
    #[must_use]
    pub const fn as_listener(&self) -> Option<&TcpListener> {
        match self {
            Self::Listener(listener) => Some(listener),
            _ => None,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Stream(stream) => stream.read(buf),
            Self::Control(file) => file.read(buf),
            Self::Listener(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "listening socket is not readable",
            )),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stream(stream) => stream.write(buf),
            Self::Listener(_) | Self::Control(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "descriptor is not writable",
            )),
        }
    }
}

impl AsRawFd for Endpoint {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Listener(listener) => listener.as_raw_fd(),
            Self::Stream(stream) => stream.as_raw_fd(),
            Self::Control(file) => file.as_raw_fd(),
        }
    }
}

/// State of one monitored descriptor
#[derive(Debug)]
pub struct Entry {
    endpoint: Endpoint,
    on_readable: Option<Handler>,
    on_writable: Option<Handler>,
    peer: Option<Token>,
    buffer: RelayBuffer,
}

impl Entry {
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.endpoint.as_raw_fd()
    }

    #[must_use]
    pub const fn peer(&self) -> Option<Token> {
        self.peer
    }

    /// Handler armed for `direction`, if any
    #[must_use]
    pub const fn handler(&self, direction: Direction) -> Option<Handler> {
        match direction {
            Direction::Read => self.on_readable,
            Direction::Write => self.on_writable,
        }
    }

    #[must_use]
    pub const fn buffer(&self) -> &RelayBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut RelayBuffer {
        &mut self.buffer
    }

    /// Read from this descriptor into the spare room of `dst`
    ///
    /// `dst` must not be full, otherwise the zero-length read is
    /// indistinguishable from end of stream.
    pub fn read_into(&mut self, dst: &mut RelayBuffer) -> io::Result<usize> {
        let n = self.endpoint.read(dst.spare_mut())?;
        dst.commit(n);
        Ok(n)
    }

    /// Read from this descriptor into its own buffer
    pub fn read_into_own(&mut self) -> io::Result<usize> {
        let n = self.endpoint.read(self.buffer.spare_mut())?;
        self.buffer.commit(n);
        Ok(n)
    }

    /// Write as much of the own buffer as the descriptor accepts and drop it
    /// from the front
    pub fn flush_buffer(&mut self) -> io::Result<usize> {
        let n = self.endpoint.write(self.buffer.filled())?;
        self.buffer.consume(n);
        Ok(n)
    }

    /// Whether the descriptor is at end of input, checked with a one-byte read
    ///
    /// Used when the own buffer has no room left. A byte that does arrive is
    /// discarded.
    pub fn at_eof(&mut self) -> io::Result<bool> {
        let mut byte = [0u8; 1];
        Ok(self.endpoint.read(&mut byte)? == 0)
    }

    /// Whether the kernel reports hang-up or a pending error on the descriptor
    #[must_use]
    pub fn hung_up(&self) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.fd(),
            events: 0,
            revents: 0,
        };
        // SAFETY: pfd is one initialised pollfd living across the call.
        let ret = unsafe { libc::poll(&mut pfd, 1, 0) };
        ret > 0 && pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0
    }
}

/// What the reactor should wait for on one descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interest {
    pub fd: RawFd,
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Bounded arena of descriptor entries
#[derive(Debug)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_fd: BTreeMap<RawFd, Token>,
    capacity: usize,
}

impl Registry {
    /// Create a registry holding at most `capacity` descriptors
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            by_fd: BTreeMap::new(),
            capacity,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of registered descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_fd.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_fd.is_empty()
    }

    /// Number of free slots
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    fn allocate(&mut self) -> Option<u32> {
        if let Some(index) = self.free.pop() {
            return Some(index);
        }
        if self.slots.len() < self.capacity {
            let index = u32::try_from(self.slots.len()).ok()?;
            self.slots.push(Slot::default());
            return Some(index);
        }
        None
    }

    /// Take ownership of `endpoint` and arm it
    ///
    /// # Errors
    ///
    /// Returns `ReactorError::Exhausted` when every slot is taken; the
    /// endpoint is closed in that case.
    pub fn register(
        &mut self,
        endpoint: Endpoint,
        peer: Option<Token>,
        on_readable: Option<Handler>,
        on_writable: Option<Handler>,
    ) -> Result<Token, ReactorError> {
        let fd = endpoint.as_raw_fd();
        let Some(index) = self.allocate() else {
            debug!("No free slot for fd={}, closing it", fd);
            return Err(ReactorError::Exhausted {
                capacity: self.capacity,
            });
        };

        let slot = &mut self.slots[index as usize];
        let token = Token {
            index,
            generation: slot.generation,
        };
        slot.entry = Some(Entry {
            endpoint,
            on_readable,
            on_writable,
            peer,
            buffer: RelayBuffer::new(),
        });
        self.by_fd.insert(fd, token);

        debug!(
            "Armed fd={} as {} (read={:?}, write={:?})",
            fd, token, on_readable, on_writable
        );
        Ok(token)
    }

    /// Register two endpoints as peers of each other with the same handlers
    ///
    /// Either both are registered or neither is.
    ///
    /// # Errors
    ///
    /// Returns `ReactorError::Exhausted` when fewer than two slots are free.
    pub fn register_pair(
        &mut self,
        first: Endpoint,
        second: Endpoint,
        on_readable: Handler,
        on_writable: Handler,
    ) -> Result<(Token, Token), ReactorError> {
        if self.available() < 2 {
            return Err(ReactorError::Exhausted {
                capacity: self.capacity,
            });
        }

        let a = self.register(first, None, Some(on_readable), Some(on_writable))?;
        let b = match self.register(second, Some(a), Some(on_readable), Some(on_writable)) {
            Ok(token) => token,
            Err(e) => {
                self.deregister(a);
                return Err(e);
            }
        };
        if let Some(entry) = self.get_mut(a) {
            entry.peer = Some(b);
        }

        Ok((a, b))
    }

    /// Disarm and remove an entry, handing it back to the caller
    ///
    /// Dropping the returned entry closes its descriptor. Removing an
    /// already removed token is a no-op.
    pub fn deregister(&mut self, token: Token) -> Option<Entry> {
        let slot = self.slots.get_mut(token.index as usize)?;
        if slot.generation != token.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(token.index);

        let fd = entry.fd();
        self.by_fd.remove(&fd);
        debug!("Disarmed fd={} ({})", fd, token);

        Some(entry)
    }

    /// Remove every entry, closing all descriptors
    pub fn clear(&mut self) {
        let tokens: Vec<Token> = self.by_fd.values().copied().collect();
        for token in tokens {
            self.deregister(token);
        }
    }

    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        self.get(token).is_some()
    }

    #[must_use]
    pub fn get(&self, token: Token) -> Option<&Entry> {
        let slot = self.slots.get(token.index as usize)?;
        if slot.generation != token.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(token.index as usize)?;
        if slot.generation != token.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Borrow two distinct live entries at once
    pub fn pair_mut(&mut self, a: Token, b: Token) -> Option<(&mut Entry, &mut Entry)> {
        if a.index == b.index || !self.contains(a) || !self.contains(b) {
            return None;
        }

        let (ia, ib) = (a.index as usize, b.index as usize);
        let (first, second) = if ia < ib {
            let (lo, hi) = self.slots.split_at_mut(ib);
            (&mut lo[ia], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(ia);
            (&mut hi[0], &mut lo[ib])
        };

        Some((first.entry.as_mut()?, second.entry.as_mut()?))
    }

    /// Handler currently armed on `token` for `direction`
    #[must_use]
    pub fn is_armed(&self, token: Token, direction: Direction) -> Option<Handler> {
        self.get(token).and_then(|entry| entry.handler(direction))
    }

    /// Readiness interest for every descriptor, in ascending descriptor order
    ///
    /// Reading is requested only while the peer's buffer is drained, so a
    /// slow writer throttles its peer's reader. Writing is requested only
    /// while the own buffer holds data.
    pub fn interests(&self) -> impl Iterator<Item = Interest> + '_ {
        self.by_fd.iter().filter_map(move |(&fd, &token)| {
            let entry = self.get(token)?;
            let peer_drained = entry
                .peer
                .and_then(|peer| self.get(peer))
                .map_or(true, |peer| peer.buffer.is_empty());

            Some(Interest {
                fd,
                token,
                readable: entry.on_readable.is_some() && peer_drained,
                writable: entry.on_writable.is_some() && !entry.buffer.is_empty(),
            })
        })
    }
}
