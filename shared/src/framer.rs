//! CRLF line reassembly over a non-blocking byte stream
//!
//! Each connection owns one [`LineFramer`]. Bytes are appended at `end`,
//! complete lines are taken from `start`, and the live region is moved back
//! to the front of the buffer only when more room is needed. The buffer never
//! grows: a peer that sends more than `capacity` bytes without a `\r\n`
//! is cut off with [`FramerError::Overflow`].

use std::io;
use thiserror::Error;

const TERMINATOR: &[u8] = b"\r\n";

#[derive(Debug, Error)]
pub enum FramerError {
    #[error("no line terminator within {capacity} bytes")]
    Overflow { capacity: usize },
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result of one read attempt into the framer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// `n > 0` bytes were appended
    Filled(usize),
    /// The peer shut down its side of the connection
    Closed,
    /// Nothing to read right now
    WouldBlock,
}

#[derive(Debug)]
pub struct LineFramer {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    /// Bytes from `start` already known not to contain a terminator
    scanned: usize,
}

impl LineFramer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
            scanned: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes received but not yet returned as lines
    pub fn buffered(&self) -> usize {
        self.end - self.start
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }

    /// Writable tail of the buffer, compacting first if needed.
    ///
    /// Callers must take every complete line before asking for more room,
    /// otherwise a full buffer of valid lines would be reported as overflow.
    pub fn spare_mut(&mut self) -> Result<&mut [u8], FramerError> {
        if self.end == self.buf.len() {
            self.compact();
        }
        if self.end == self.buf.len() {
            return Err(FramerError::Overflow {
                capacity: self.buf.len(),
            });
        }
        Ok(&mut self.buf[self.end..])
    }

    /// Marks `n` bytes written through [`spare_mut`](Self::spare_mut) as received.
    pub fn commit(&mut self, n: usize) {
        self.end = (self.end + n).min(self.buf.len());
    }

    /// Appends `bytes`, failing if they do not fit in the remaining capacity.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), FramerError> {
        if bytes.len() > self.buf.len() - self.end {
            self.compact();
        }
        if bytes.len() > self.buf.len() - self.end {
            return Err(FramerError::Overflow {
                capacity: self.buf.len(),
            });
        }
        self.buf[self.end..self.end + bytes.len()].copy_from_slice(bytes);
        self.end += bytes.len();
        Ok(())
    }

    /// Performs one read through `read`, which receives the free tail of the buffer.
    ///
    /// `read` returning `Ok(0)` means orderly shutdown by the peer.
    pub fn fill_with<F>(&mut self, read: F) -> Result<FillStatus, FramerError>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        let spare = self.spare_mut()?;
        match read(spare) {
            Ok(0) => Ok(FillStatus::Closed),
            Ok(n) => {
                self.commit(n);
                Ok(FillStatus::Filled(n))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(FillStatus::WouldBlock),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(FillStatus::WouldBlock),
            Err(e) => Err(FramerError::Io(e)),
        }
    }

    /// Takes the next complete line without its `\r\n`, if one is buffered.
    pub fn try_take_line(&mut self) -> Result<Option<String>, FramerError> {
        let window = &self.buf[self.start..self.end];
        // Back up one byte so a `\r` at the end of the previous scan still pairs with `\n`.
        let from = self.scanned.saturating_sub(1);

        let found = window[from..]
            .windows(TERMINATOR.len())
            .position(|w| w == TERMINATOR)
            .map(|pos| pos + from);

        match found {
            Some(pos) => {
                let line = std::str::from_utf8(&window[..pos])
                    .map(str::to_owned)
                    .map_err(|_| FramerError::InvalidUtf8);

                self.start += pos + TERMINATOR.len();
                self.scanned = 0;
                if self.start == self.end {
                    self.start = 0;
                    self.end = 0;
                }
                line.map(Some)
            }
            None => {
                self.scanned = window.len();
                if window.len() == self.buf.len() {
                    return Err(FramerError::Overflow {
                        capacity: self.buf.len(),
                    });
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let mut framer = LineFramer::with_capacity(64);
        framer.feed(b"HELLO p1\r\n").unwrap();
        assert_eq!(framer.try_take_line().unwrap(), Some("HELLO p1".to_string()));
        assert_eq!(framer.try_take_line().unwrap(), None);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_line_split_across_feeds() {
        let mut framer = LineFramer::with_capacity(64);
        framer.feed(b"PUT 1 ").unwrap();
        assert_eq!(framer.try_take_line().unwrap(), None);
        framer.feed(b"2.5\r").unwrap();
        assert_eq!(framer.try_take_line().unwrap(), None);
        framer.feed(b"\nPUT").unwrap();
        assert_eq!(framer.try_take_line().unwrap(), Some("PUT 1 2.5".to_string()));
        assert_eq!(framer.try_take_line().unwrap(), None);
        assert_eq!(framer.buffered(), 3);
    }

    #[test]
    fn test_multiple_lines_in_one_feed_preserve_order() {
        let mut framer = LineFramer::with_capacity(64);
        framer.feed(b"A\r\nB\r\n\r\nC\r\n").unwrap();
        let mut lines = Vec::new();
        while let Some(line) = framer.try_take_line().unwrap() {
            lines.push(line);
        }
        assert_eq!(lines, vec!["A", "B", "", "C"]);
    }

    #[test]
    fn test_bare_newline_is_not_a_terminator() {
        let mut framer = LineFramer::with_capacity(64);
        framer.feed(b"HELLO a\nb\r\n").unwrap();
        assert_eq!(framer.try_take_line().unwrap(), Some("HELLO a\nb".to_string()));
    }

    #[test]
    fn test_overflow_without_terminator() {
        let mut framer = LineFramer::with_capacity(8);
        framer.feed(b"12345678").unwrap();
        assert!(matches!(
            framer.try_take_line(),
            Err(FramerError::Overflow { capacity: 8 })
        ));
        assert!(matches!(
            framer.spare_mut(),
            Err(FramerError::Overflow { capacity: 8 })
        ));
    }

    #[test]
    fn test_line_filling_whole_capacity_is_accepted() {
        let mut framer = LineFramer::with_capacity(8);
        framer.feed(b"123456\r\n").unwrap();
        assert_eq!(framer.try_take_line().unwrap(), Some("123456".to_string()));
    }

    #[test]
    fn test_compaction_reuses_space() {
        let mut framer = LineFramer::with_capacity(8);
        framer.feed(b"ab\r\ncd").unwrap();
        assert_eq!(framer.try_take_line().unwrap(), Some("ab".to_string()));
        // Only 2 bytes free at the tail, 6 after compaction.
        framer.feed(b"ef\r\n").unwrap();
        assert_eq!(framer.try_take_line().unwrap(), Some("cdef".to_string()));
    }

    #[test]
    fn test_fill_with_reports_statuses() {
        let mut framer = LineFramer::with_capacity(16);

        let status = framer
            .fill_with(|buf| {
                buf[..4].copy_from_slice(b"X\r\nY");
                Ok(4)
            })
            .unwrap();
        assert_eq!(status, FillStatus::Filled(4));
        assert_eq!(framer.try_take_line().unwrap(), Some("X".to_string()));

        let status = framer
            .fill_with(|_| Err(io::Error::from(io::ErrorKind::WouldBlock)))
            .unwrap();
        assert_eq!(status, FillStatus::WouldBlock);

        assert_eq!(framer.fill_with(|_| Ok(0)).unwrap(), FillStatus::Closed);

        let err = framer
            .fill_with(|_| Err(io::Error::from(io::ErrorKind::ConnectionReset)))
            .unwrap_err();
        assert!(matches!(err, FramerError::Io(_)));
    }

    #[test]
    fn test_invalid_utf8_line_is_consumed() {
        let mut framer = LineFramer::with_capacity(16);
        framer.feed(b"\xff\xfe\r\nOK\r\n").unwrap();
        assert!(matches!(
            framer.try_take_line(),
            Err(FramerError::InvalidUtf8)
        ));
        assert_eq!(framer.try_take_line().unwrap(), Some("OK".to_string()));
    }
}
