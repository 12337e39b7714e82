//! Append-only byte buffer.

use std::borrow::Cow;
use std::fmt;

use bytes::{Buf, BytesMut};

/// Growable byte container for accumulating inbound data.
///
/// Appending never reorders or aliases earlier content; the parser
/// consumes from the front as it makes progress. `len` is O(1), the
/// textual view is O(n) and lossy for non-UTF-8 content.
#[derive(Default)]
pub struct DataBuffer {
    bytes: BytesMut,
}

impl DataBuffer {
    pub fn new() -> Self {
        DataBuffer {
            bytes: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        DataBuffer {
            bytes: BytesMut::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Drop `n` bytes from the front of the buffer.
    pub fn consume(&mut self, n: usize) {
        self.bytes.advance(n);
    }

    /// Textual view of the contents; invalid UTF-8 is replaced.
    pub fn to_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl From<&[u8]> for DataBuffer {
    fn from(data: &[u8]) -> Self {
        let mut buf = DataBuffer::new();
        buf.append(data);
        buf
    }
}

impl From<&str> for DataBuffer {
    fn from(data: &str) -> Self {
        DataBuffer::from(data.as_bytes())
    }
}

impl fmt::Debug for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataBuffer({} bytes)", self.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_len() {
        let mut buf = DataBuffer::new();
        assert!(buf.is_empty());
        buf.append(b"hello");
        buf.append(b" world");
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.as_slice(), b"hello world");
    }

    #[test]
    fn test_consume_from_front() {
        let mut buf = DataBuffer::from("abcdef");
        buf.consume(2);
        assert_eq!(buf.as_slice(), b"cdef");
        buf.consume(4);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_text_view() {
        let buf = DataBuffer::from("GET / HTTP/1.1");
        assert_eq!(buf.to_text(), "GET / HTTP/1.1");

        let mut binary = DataBuffer::new();
        binary.append(&[0xff, 0xfe]);
        assert_eq!(binary.to_text(), "\u{fffd}\u{fffd}");
    }

    #[test]
    fn test_clear() {
        let mut buf = DataBuffer::from("data");
        buf.clear();
        assert!(buf.is_empty());
        buf.append(b"more");
        assert_eq!(buf.as_slice(), b"more");
    }
}
