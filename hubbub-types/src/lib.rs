//! # hubbub-types
//!
//! Wire format types for the Hubbub chat relay protocol.
//!
//! This crate provides the types shared between the relay server and any
//! front end:
//! - [`Identity`] - the validated display name a connection claims
//! - [`Message`] - protocol messages (Join, Line, FileOffer, etc.)
//! - [`FrameReader`] / [`FrameWriter`] - length-prefixed framing over any
//!   async byte stream
//! - [`WireError`] - error types
//!
//! ## Framing
//!
//! Every message in both directions travels as one frame:
//!
//! ```text
//! [u32 length, big-endian][MessagePack-encoded Message]
//! ```
//!
//! Control text and file bytes use the same framing, so a file chunk can
//! never be misparsed as a command regardless of how the transport splits
//! reads.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod framing;
mod identity;
mod messages;

pub use error::WireError;
pub use framing::{FrameReader, FrameWriter, MAX_FRAME_SIZE};
pub use identity::{Identity, IdentityError, MAX_IDENTITY_LEN};
pub use messages::{
    Chat, ErrorReply, FileChunk, FileDone, FileOffer, FilePrepare, Join, Line, Message, Notice,
    Private, TransferOutcome, UserList, Welcome, CHUNK_SIZE, MAX_FILE_SIZE, PROTOCOL_VERSION,
};
