//! Size-limited sink for worker diagnostic output.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

/// Default capacity of the worker stderr buffer (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Buffer shared between the stderr drain task and the exit watcher.
pub type SharedBuffer = Arc<Mutex<LimitedBuffer>>;

/// Buffer that keeps only the most recent `capacity` bytes written to it.
///
/// When a write would exceed the capacity the oldest bytes are discarded, so
/// the buffer always holds the tail of everything written so far.
#[derive(Debug, Clone)]
pub struct LimitedBuffer {
    capacity: usize,
    data: VecDeque<u8>,
}

impl LimitedBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    /// Create a buffer with [`DEFAULT_BUFFER_SIZE`] capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }

    /// Create a buffer wrapped for sharing across tasks.
    pub fn shared(capacity: usize) -> SharedBuffer {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Append `bytes`, truncating old data. Returns how many of the given
    /// bytes were retained.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let bytes = if bytes.len() > self.capacity {
            &bytes[bytes.len() - self.capacity..]
        } else {
            bytes
        };

        let overflow = (self.data.len() + bytes.len()).saturating_sub(self.capacity);
        self.data.drain(..overflow);
        self.data.extend(bytes);
        bytes.len()
    }

    /// Maximum number of bytes kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy of the buffered bytes, oldest first.
    pub fn contents(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }

    /// Buffered bytes as text; invalid UTF-8 is replaced.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Default for LimitedBuffer {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

// Every byte handed to `write` counts as consumed, even the truncated ones;
// reporting a short write would make `write_all` re-send the dropped prefix.
impl io::Write for LimitedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
