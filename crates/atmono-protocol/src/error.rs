//! Error types for the monochromator protocol.

use thiserror::Error;

/// Errors that can occur when decoding controller traffic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// The reply does not start with any known command outcome tag.
    #[error("unknown reply: {0:?}")]
    UnknownReply(String),

    /// The reply tag does not match the request that was sent.
    #[error("expected {expected} reply, got {got:?}")]
    UnexpectedReply {
        /// Tag the request should have been answered with.
        expected: &'static str,
        /// The raw reply line.
        got: String,
    },

    /// The reply carried the right tag but its value could not be parsed.
    #[error("invalid value for {tag}: {value:?}")]
    InvalidValue {
        /// Reply tag.
        tag: &'static str,
        /// The raw value token (empty if missing).
        value: String,
    },

    /// Status ordinal outside the known set.
    #[error("unknown controller status code: {0}")]
    UnknownStatus(i64),

    /// A line grew past the maximum length without a terminator.
    #[error("buffer overflow: max {max} bytes, got {actual}")]
    BufferOverflow {
        /// Maximum line length.
        max: usize,
        /// Number of bytes buffered when the overflow was detected.
        actual: usize,
    },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
