//! Error types for the Hubbub wire format.

use thiserror::Error;

/// Errors that can occur while encoding, decoding, or framing messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Encode(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Decode(#[source] rmp_serde::decode::Error),

    /// A frame declared a length above the protocol maximum
    #[error("frame too large: {len} > {limit}")]
    FrameTooLarge {
        /// Declared frame length.
        len: usize,
        /// Maximum allowed frame length.
        limit: usize,
    },

    /// The peer closed the stream
    #[error("connection closed")]
    Closed,

    /// Transport I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether this error means the peer is gone (clean close or broken
    /// transport) as opposed to a recoverable bad frame.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, WireError::Closed | WireError::Io(_))
    }
}
