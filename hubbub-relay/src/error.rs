//! Error types for hubbub-relay.

use hubbub_types::{IdentityError, WireError};

/// Main error type for relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Wire protocol error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a connection failed authentication.
///
/// Variants with a wire reply report once and close; the rest close the
/// connection silently.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No Join frame arrived within the configured window.
    #[error("timed out waiting for join")]
    Timeout,

    /// The connection dropped before authenticating.
    #[error("connection lost during join: {0}")]
    ConnectionLost(#[source] WireError),

    /// The first frame was not a Join.
    #[error("expected join, got another message")]
    NotJoin,

    /// The client speaks a different protocol version.
    #[error("protocol version mismatch: client={client}, server={server}")]
    VersionMismatch {
        /// Client protocol version.
        client: u8,
        /// Server protocol version.
        server: u8,
    },

    /// The claimed identity failed validation.
    #[error("invalid identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    /// The claimed identity is already active.
    #[error("identity '{identity}' is already taken")]
    Taken {
        /// The contested identity.
        identity: String,
    },
}

impl AuthError {
    /// The error reply to send before closing, if this failure warrants one.
    pub fn reply_text(&self) -> Option<String> {
        match self {
            AuthError::Timeout | AuthError::ConnectionLost(_) => None,
            AuthError::NotJoin => Some("ERROR: Join required before chatting".to_string()),
            AuthError::VersionMismatch { client, server } => Some(format!(
                "ERROR: Unsupported protocol version {client} (server speaks {server})"
            )),
            AuthError::InvalidIdentity(_) => {
                Some("ERROR: Invalid username. Use only alphanumeric, _, and -".to_string())
            }
            AuthError::Taken { identity } => {
                Some(format!("ERROR: Username '{identity}' is already taken"))
            }
        }
    }
}

/// Why a file transfer failed mid-flight.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The recipient's connection vanished.
    #[error("recipient disconnected")]
    RecipientGone,

    /// The sender's stream broke before the declared size arrived.
    #[error("sender disconnected before sending all declared bytes")]
    SenderGone,

    /// No chunk arrived within the configured window.
    #[error("timed out waiting for file data")]
    ChunkTimeout,

    /// The sender sent something other than a chunk mid-stream.
    #[error("unexpected message during file stream")]
    UnexpectedFrame,

    /// A chunk carried no bytes.
    #[error("empty file chunk")]
    EmptyChunk,

    /// A chunk exceeded the protocol chunk size.
    #[error("oversized file chunk: {len} bytes")]
    OversizedChunk {
        /// Actual chunk length.
        len: usize,
    },

    /// The sender supplied more bytes than declared.
    #[error("stream exceeded declared size of {declared} bytes")]
    Overrun {
        /// Declared transfer size.
        declared: u64,
    },
}
