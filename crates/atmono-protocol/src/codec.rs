//! Line-based codec for controller communication.
//!
//! Both directions use newline-delimited ASCII. Outgoing lines are terminated
//! with `\r\n`; incoming lines are accepted with `\r`, `\n` or `\r\n`
//! terminators and empty lines are ignored.

use bytes::{Buf, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Maximum command/reply line length, excluding the terminator.
pub const MAX_LINE_LENGTH: usize = 256;

/// Line terminator appended to every outgoing message.
pub const LINE_TERMINATOR: &str = "\r\n";

/// A codec for reading and writing protocol lines.
///
/// Received bytes are accumulated until a complete line is available. Partial
/// lines stay buffered across reads, so a reply split over several TCP
/// segments decodes as one line.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH * 2),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode a complete line from the buffer.
    ///
    /// Returns `Ok(Some(line))` with the terminator stripped, `Ok(None)` if
    /// more data is needed, or [`ProtocolError::BufferOverflow`] if the
    /// pending partial line exceeds [`MAX_LINE_LENGTH`]. On overflow the
    /// buffer is cleared.
    pub fn decode_line(&mut self) -> ProtocolResult<Option<String>> {
        loop {
            // Skip leftover terminators (and therefore empty lines)
            while !self.buffer.is_empty() && (self.buffer[0] == b'\r' || self.buffer[0] == b'\n')
            {
                self.buffer.advance(1);
            }

            let line_end = self
                .buffer
                .iter()
                .position(|&byte| byte == b'\r' || byte == b'\n');

            let Some(end) = line_end else {
                if self.buffer.len() > MAX_LINE_LENGTH {
                    let actual = self.buffer.len();
                    self.buffer.clear();
                    return Err(ProtocolError::BufferOverflow {
                        max: MAX_LINE_LENGTH,
                        actual,
                    });
                }
                return Ok(None);
            };

            let line_data = self.buffer.split_to(end);
            let line = String::from_utf8_lossy(&line_data).to_string();

            if line.trim().is_empty() {
                continue;
            }

            return Ok(Some(line));
        }
    }

    /// Encode a line for transmission.
    ///
    /// Appends the `\r\n` terminator.
    pub fn encode_line(line: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(line.len() + LINE_TERMINATOR.len());
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(LINE_TERMINATOR.as_bytes());
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_line() {
        assert_eq!(LineCodec::encode_line("?WL"), b"?WL\r\n");
    }

    #[test]
    fn test_decode_crlf_lines() {
        let mut codec = LineCodec::new();
        codec.push(b"#OK\r\n#WL 320\r\n");

        assert_eq!(codec.decode_line(), Ok(Some("#OK".to_string())));
        assert_eq!(codec.decode_line(), Ok(Some("#WL 320".to_string())));
        assert_eq!(codec.decode_line(), Ok(None));
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_partial_line() {
        let mut codec = LineCodec::new();
        codec.push(b"#SW");
        assert_eq!(codec.decode_line(), Ok(None));

        codec.push(b"ST 1\r");
        assert_eq!(codec.decode_line(), Ok(Some("#SWST 1".to_string())));
    }

    #[test]
    fn test_bare_newline_and_blank_lines() {
        let mut codec = LineCodec::new();
        codec.push(b"\r\n\n   \n!RST 1\n");
        assert_eq!(codec.decode_line(), Ok(Some("!RST 1".to_string())));
        assert_eq!(codec.decode_line(), Ok(None));
    }

    #[test]
    fn test_overflow_clears_buffer() {
        let mut codec = LineCodec::new();
        codec.push(&[b'x'; MAX_LINE_LENGTH + 1]);

        assert!(matches!(
            codec.decode_line(),
            Err(ProtocolError::BufferOverflow { actual, .. }) if actual == MAX_LINE_LENGTH + 1
        ));
        assert_eq!(codec.buffered_len(), 0);

        codec.push(b"?GR\r\n");
        assert_eq!(codec.decode_line(), Ok(Some("?GR".to_string())));
    }
}
