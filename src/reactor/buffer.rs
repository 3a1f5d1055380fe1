//! Fixed-capacity transfer buffer
//!
//! Every registry slot owns one `RelayBuffer`. For relay descriptors it holds
//! bytes read from the peer that still have to be written into this
//! descriptor; for the control channel it accumulates command text.

use std::fmt;

/// Capacity of each per-descriptor buffer
pub const RELAY_BUFFER_SIZE: usize = 512;

/// Fixed 512-byte buffer with a fill length
#[derive(Clone)]
pub struct RelayBuffer {
    data: [u8; RELAY_BUFFER_SIZE],
    len: usize,
}

impl RelayBuffer {
    /// Create an empty buffer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: [0u8; RELAY_BUFFER_SIZE],
            len: 0,
        }
    }

    /// Buffer capacity in bytes
    #[must_use]
    pub const fn capacity(&self) -> usize {
        RELAY_BUFFER_SIZE
    }

    /// Number of valid bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer holds no data
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if there is no room left
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == RELAY_BUFFER_SIZE
    }

    /// The valid bytes
    #[must_use]
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The unused tail, to be read into
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Mark `n` bytes of the spare tail as filled
    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.len + n <= RELAY_BUFFER_SIZE);
        self.len = (self.len + n).min(RELAY_BUFFER_SIZE);
    }

    /// Drop `n` bytes from the front, shifting the remainder to the start
    pub fn consume(&mut self, n: usize) {
        if n >= self.len {
            self.len = 0;
        } else {
            self.data.copy_within(n..self.len, 0);
            self.len -= n;
        }
    }

    /// Copy as much of `src` as fits, returning the number of bytes copied
    pub fn extend_from_slice(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(RELAY_BUFFER_SIZE - self.len);
        self.data[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }

    /// Reset to empty
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for RelayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RelayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayBuffer")
            .field("len", &self.len)
            .field("capacity", &RELAY_BUFFER_SIZE)
            .finish()
    }
}
