//! Delimiter-based buffered reader.
//!
//! The device sends records terminated either by `\r\n` or by the prompt
//! marker, and the transport hands them over in whatever fragments the
//! link happens to deliver. `LineBuffer` accumulates those fragments and
//! cuts records out on demand. Bytes read past a delimiter stay buffered
//! for the next call; nothing read from the transport is ever dropped.

use std::io;

use bytes::{Bytes, BytesMut};
use log::trace;

use crate::transport::Transport;

/// Initial capacity of the accumulation buffer.
const INITIAL_CAPACITY: usize = 1024;

/// Accumulates transport output and extracts delimited records.
#[derive(Debug)]
pub struct LineBuffer {
    /// Bytes received but not yet consumed.
    buffer: BytesMut,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    /// Create an empty line buffer.
    pub fn new() -> Self {
        LineBuffer {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Read until `delimiter` appears and return everything before it.
    ///
    /// The delimiter is included in the returned record unless
    /// `cut_delimiter` is set. Blocks for as long as the transport keeps
    /// returning without a delimiter; the only bound is the transport's own
    /// poll timeout, so a silent peer keeps this looping.
    pub fn until<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        delimiter: &[u8],
        cut_delimiter: bool,
    ) -> io::Result<Bytes> {
        let mut search_from = 0;
        loop {
            if let Some(pos) = find(&self.buffer[search_from..], delimiter) {
                let pos = search_from + pos;
                let mut record = self.buffer.split_to(pos + delimiter.len());
                if cut_delimiter {
                    record.truncate(pos);
                }
                trace!("record: {:?}", String::from_utf8_lossy(&record));
                return Ok(record.freeze());
            }

            // The delimiter can straddle the old end of the buffer, so the
            // next search restarts just short of it.
            search_from = self.buffer.len().saturating_sub(delimiter.len().saturating_sub(1));
            self.fill(transport)?;
        }
    }

    /// Read exactly `count` raw bytes, consuming buffered bytes first.
    pub fn take<T: Transport + ?Sized>(&mut self, transport: &mut T, count: usize) -> io::Result<Bytes> {
        while self.buffer.len() < count {
            self.fill(transport)?;
        }
        Ok(self.buffer.split_to(count).freeze())
    }

    /// Pull whatever the transport has (at least one byte's worth of request).
    fn fill<T: Transport + ?Sized>(&mut self, transport: &mut T) -> io::Result<usize> {
        let wanted = transport.bytes_available()?.max(1);
        let start = self.buffer.len();
        self.buffer.resize(start + wanted, 0);
        let read = match transport.read(&mut self.buffer[start..]) {
            Ok(n) => n,
            Err(e) => {
                self.buffer.truncate(start);
                return Err(e);
            }
        };
        self.buffer.truncate(start + read);
        Ok(read)
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Transport that replays fixed fragments, one per read.
    struct Fragments {
        pending: VecDeque<Vec<u8>>,
        report_available: bool,
        empty_polls: usize,
    }

    impl Fragments {
        fn new(fragments: &[&[u8]], report_available: bool) -> Self {
            Fragments {
                pending: fragments.iter().map(|f| f.to_vec()).collect(),
                report_available,
                empty_polls: 0,
            }
        }
    }

    impl Transport for Fragments {
        fn open(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn write_all(&mut self, _data: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(front) = self.pending.front_mut() else {
                self.empty_polls += 1;
                if self.empty_polls > 3 {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "drained"));
                }
                return Ok(0);
            };
            let n = buf.len().min(front.len());
            buf[..n].copy_from_slice(&front[..n]);
            front.drain(..n);
            if front.is_empty() {
                self.pending.pop_front();
            }
            Ok(n)
        }

        fn bytes_available(&mut self) -> io::Result<usize> {
            if self.report_available {
                Ok(self.pending.front().map_or(0, Vec::len))
            } else {
                Ok(0)
            }
        }
    }

    #[test]
    fn test_until_keeps_remainder() {
        let mut transport = Fragments::new(&[b"ab", b"c\r", b"\nd", b"ef"], true);
        let mut lines = LineBuffer::new();

        let record = lines.until(&mut transport, b"\r\n", true).unwrap();
        assert_eq!(&record[..], b"abc");
        assert_eq!(lines.buffered_len(), 1);

        let rest = lines.take(&mut transport, 3).unwrap();
        assert_eq!(&rest[..], b"def");
    }

    #[test]
    fn test_until_byte_at_a_time() {
        // No availability hint: the buffer falls back to single-byte reads.
        let mut transport = Fragments::new(&[b"abc\r\ndef"], false);
        let mut lines = LineBuffer::new();

        let record = lines.until(&mut transport, b"\r\n", true).unwrap();
        assert_eq!(&record[..], b"abc");
        assert_eq!(lines.buffered_len(), 0);
    }

    #[test]
    fn test_until_keeps_delimiter() {
        let mut transport = Fragments::new(&[b"Ready\r\n>: "], true);
        let mut lines = LineBuffer::new();

        let record = lines.until(&mut transport, b"\r\n", false).unwrap();
        assert_eq!(&record[..], b"Ready\r\n");
        let prompt = lines.until(&mut transport, b">: ", false).unwrap();
        assert_eq!(&prompt[..], b">: ");
    }

    #[test]
    fn test_until_delimiter_split_across_reads() {
        let mut transport = Fragments::new(&[b"x", b">", b":", b" tail"], true);
        let mut lines = LineBuffer::new();

        let record = lines.until(&mut transport, b">: ", true).unwrap();
        assert_eq!(&record[..], b"x");
    }

    #[test]
    fn test_until_ignores_empty_polls() {
        let mut transport = Fragments::new(&[b"", b"", b"ok\r\n"], true);
        let mut lines = LineBuffer::new();

        let record = lines.until(&mut transport, b"\r\n", true).unwrap();
        assert_eq!(&record[..], b"ok");
    }

    #[test]
    fn test_until_propagates_transport_error() {
        let mut transport = Fragments::new(&[b"partial"], true);
        let mut lines = LineBuffer::new();

        let err = lines.until(&mut transport, b"\r\n", true).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        // Bytes read before the failure are still there.
        assert_eq!(lines.buffered_len(), 7);
    }

    #[test]
    fn test_take_uses_buffer_first() {
        let mut transport = Fragments::new(&[b"Ready?\r\n0123", b"4567"], true);
        let mut lines = LineBuffer::new();

        lines.until(&mut transport, b"\r\n", true).unwrap();
        let chunk = lines.take(&mut transport, 8).unwrap();
        assert_eq!(&chunk[..], b"01234567");
    }
}
