//! Protocol messages for the Hubbub relay.
//!
//! One [`Message`] per frame, in both directions. The relay reads `Join`,
//! `Line`, `FileAccept`, `FileReject` and `FileChunk` from clients; everything
//! else flows server to client. `FileChunk` is the only message carrying file
//! bytes and is forwarded by the relay verbatim.

use serde::{Deserialize, Serialize};

use crate::{Identity, WireError};

/// Protocol version carried in `Join` and `Welcome`.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum payload of a single [`FileChunk`] in bytes.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Maximum declared file size accepted for a transfer (10 MiB).
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// All possible protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Claim an identity (first frame on a connection)
    Join(Join),
    /// Server response to a successful Join
    Welcome(Welcome),
    /// One chat or command line
    Line(Line),
    /// Broadcast delivery
    Chat(Chat),
    /// Direct message (recipient copy and sender echo)
    Private(Private),
    /// Reply to `/list`
    UserList(UserList),
    /// Join/leave/goodbye notices
    Notice(Notice),
    /// Error reply
    Error(ErrorReply),
    /// File offer, relay to recipient
    FileOffer(FileOffer),
    /// Recipient accepts the pending offer
    FileAccept,
    /// Recipient declines the pending offer
    FileReject,
    /// Stream of the declared size follows
    FilePrepare(FilePrepare),
    /// One relayed chunk of file bytes
    FileChunk(FileChunk),
    /// Terminal transfer status, relay to both parties
    FileDone(FileDone),
}

impl Message {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Encode)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Decode)
    }
}

/// Identity claim sent by a client as its first frame.
///
/// The identity travels as a raw string so that a malformed name reaches the
/// server's validation and produces a readable error reply instead of a
/// deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    /// Protocol version (currently 1)
    pub version: u8,
    /// Claimed identity, validated server-side
    pub identity: String,
}

/// Server response to a successful [`Join`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    /// Protocol version supported by the server
    pub version: u8,
    /// The identity as registered
    pub identity: Identity,
    /// Number of connections online, including this one
    pub online: u32,
}

/// One newline's worth of input: a command or a chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    /// The raw line, without a trailing newline
    pub text: String,
}

/// A broadcast message delivered to every other active connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Who said it
    pub from: Identity,
    /// What they said
    pub text: String,
}

/// A direct message. The recipient receives it as delivery, the sender as
/// confirmation echo; the `from`/`to` pair tells each side which is which.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Private {
    /// Sender
    pub from: Identity,
    /// Recipient
    pub to: Identity,
    /// Message body
    pub text: String,
}

/// Reply to `/list`: a sorted snapshot of active identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    /// Active identities, sorted for deterministic display
    pub users: Vec<Identity>,
}

/// A human-readable server notice (joins, leaves, goodbyes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Notice text
    pub text: String,
}

/// An error reply to the offending connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Error text
    pub text: String,
}

/// Offer notice sent to the prospective recipient of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOffer {
    /// Sending identity
    pub from: Identity,
    /// Display name of the file; never a server path
    pub filename: String,
    /// Declared size in bytes
    pub size: u64,
}

/// Tells the recipient to expect `size` bytes of chunked file data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePrepare {
    /// Sending identity
    pub from: Identity,
    /// Display name of the file
    pub filename: String,
    /// Declared size in bytes
    pub size: u64,
}

/// One chunk of file bytes, at most [`CHUNK_SIZE`] long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    /// Raw bytes, forwarded by the relay unmodified
    pub data: Vec<u8>,
}

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
    /// Every declared byte was relayed
    Complete,
    /// The recipient declined, or the offer timed out
    Rejected,
    /// The stream broke before completion
    Failed,
}

/// Terminal transfer status, sent to both parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDone {
    /// How the transfer ended
    pub outcome: TransferOutcome,
    /// Display name of the file
    pub filename: String,
    /// Bytes relayed before the terminal state
    pub bytes_moved: u64,
    /// Failure or rejection reason, if any
    pub reason: Option<String>,
}
