//! Owned read buffer for the frame extractor.
//!
//! Uses `bytes::BytesMut` so that emitting a frame is a zero-copy split.
//!
//! # Invariant
//!
//! Outside of an extraction pass the buffer only holds bytes that have not
//! been consumed into an emitted frame. Bytes leave the front of the buffer
//! in exactly two ways, both explicit:
//!
//! - [`ReadBuffer::take_frame`] hands them out as a frame;
//! - [`ReadBuffer::discard`] drops them as unreachable noise.

use bytes::{Bytes, BytesMut};

/// Default initial capacity. Frames on the monitor link are tens of bytes.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Growable byte buffer holding the unconsumed suffix of the input stream.
#[derive(Debug)]
pub struct ReadBuffer {
    inner: BytesMut,
    discarded: u64,
}

impl ReadBuffer {
    /// Create an empty buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty buffer with a custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
            discarded: 0,
        }
    }

    /// Append freshly read bytes at the back.
    #[inline]
    pub fn append(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    /// View the buffered bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Get the number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop `count` bytes from the front that can never be part of a frame.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the buffered length.
    pub fn discard(&mut self, count: usize) {
        assert!(count <= self.inner.len(), "discard past end of buffer");
        if count == 0 {
            return;
        }
        let _ = self.inner.split_to(count);
        self.discarded += count as u64;
    }

    /// Remove `count` bytes from the front and return them as a frame.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the buffered length.
    pub fn take_frame(&mut self, count: usize) -> Bytes {
        assert!(count <= self.inner.len(), "frame extends past end of buffer");
        self.inner.split_to(count).freeze()
    }

    /// Total number of bytes dropped by [`ReadBuffer::discard`] so far.
    #[inline]
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Drop everything, counting it as discarded.
    pub fn clear(&mut self) {
        let len = self.inner.len();
        self.discard(len);
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_view() {
        let mut buffer = ReadBuffer::new();
        buffer.append(b"abc");
        buffer.append(b"de");

        assert_eq!(buffer.as_slice(), b"abcde");
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_discard_drops_prefix_and_counts() {
        let mut buffer = ReadBuffer::new();
        buffer.append(b"noise!frame");
        buffer.discard(6);

        assert_eq!(buffer.as_slice(), b"frame");
        assert_eq!(buffer.discarded(), 6);
    }

    #[test]
    fn test_take_frame_keeps_tail() {
        let mut buffer = ReadBuffer::new();
        buffer.append(b"frametail");
        let frame = buffer.take_frame(5);

        assert_eq!(&frame[..], b"frame");
        assert_eq!(buffer.as_slice(), b"tail");
        assert_eq!(buffer.discarded(), 0);
    }

    #[test]
    fn test_clear_counts_everything() {
        let mut buffer = ReadBuffer::new();
        buffer.append(b"1234");
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.discarded(), 4);
    }

    #[test]
    #[should_panic(expected = "discard past end")]
    fn test_discard_past_end_panics() {
        let mut buffer = ReadBuffer::new();
        buffer.append(b"ab");
        buffer.discard(3);
    }
}
