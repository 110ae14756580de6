//! Newline framing for the byte stream from the server.

use alloc::string::String;
use alloc::vec::Vec;

use log::warn;

use crate::protocol::ProtocolError;

/// Splits a byte stream into newline-terminated lines.
///
/// Lines longer than the limit are reported once and then discarded up to
/// the next newline, so a runaway sender cannot grow the buffer without
/// bound. Blank lines are skipped.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl LineFramer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Forget any partial line (used when the connection is replaced).
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Bytes buffered towards the next line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Take the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<Result<String, ProtocolError>> {
        loop {
            let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
                return self.check_overflow();
            };

            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_len {
                return Some(Err(ProtocolError::LineTooLong { len: line.len() }));
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(String::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8));
        }
    }

    fn check_overflow(&mut self) -> Option<Result<String, ProtocolError>> {
        if self.buffer.len() <= self.max_len {
            return None;
        }

        let len = self.buffer.len();
        self.buffer.clear();
        if self.discarding {
            return None;
        }
        warn!("Discarding oversized line ({} bytes buffered)", len);
        self.discarding = true;
        Some(Err(ProtocolError::LineTooLong { len }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_splits_lines_across_reads() {
        let mut framer = LineFramer::new(64);
        framer.extend(b"{\"CAM_LIVE\":");
        assert_eq!(framer.next_line(), None);
        framer.extend(b"1}\n{\"PING\":true}\r\n{\"CAM");
        assert_eq!(framer.next_line(), Some(Ok(String::from("{\"CAM_LIVE\":1}"))));
        assert_eq!(framer.next_line(), Some(Ok(String::from("{\"PING\":true}"))));
        assert_eq!(framer.next_line(), None);
        assert_eq!(framer.pending(), 5);
    }

    #[test]
    fn test_skips_blank_lines() {
        let mut framer = LineFramer::new(64);
        framer.extend(b"\n \r\n{}\n");
        assert_eq!(framer.next_line(), Some(Ok(String::from("{}"))));
        assert_eq!(framer.next_line(), None);
    }

    #[test]
    fn test_oversized_line_reported_once_then_skipped() {
        let mut framer = LineFramer::new(8);
        framer.extend(&vec![b'x'; 20]);
        assert!(matches!(
            framer.next_line(),
            Some(Err(ProtocolError::LineTooLong { len: 20 }))
        ));
        framer.extend(&vec![b'y'; 20]);
        assert_eq!(framer.next_line(), None);

        framer.extend(b"tail\n{}\n");
        assert_eq!(framer.next_line(), Some(Ok(String::from("{}"))));
    }

    #[test]
    fn test_complete_oversized_line_is_rejected() {
        let mut framer = LineFramer::new(4);
        framer.extend(b"123456\nok\n");
        assert!(matches!(
            framer.next_line(),
            Some(Err(ProtocolError::LineTooLong { len: 6 }))
        ));
        assert_eq!(framer.next_line(), Some(Ok(String::from("ok"))));
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let mut framer = LineFramer::new(16);
        framer.extend(&[0xFF, 0xFE, b'\n']);
        assert_eq!(framer.next_line(), Some(Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn test_clear_drops_partial_line() {
        let mut framer = LineFramer::new(16);
        framer.extend(b"{\"CAM_");
        framer.clear();
        framer.extend(b"{}\n");
        assert_eq!(framer.next_line(), Some(Ok(String::from("{}"))));
    }
}
