//! The file relay: streams one file from sender to recipient through the
//! server.
//!
//! A transfer is driven synchronously from the sender's router loop. The
//! recipient's answer to the offer arrives through the oneshot slot on its
//! connection (its own router resolves it), so the handshake is a real
//! message exchange with a bounded wait, not a timed sleep. While streaming,
//! the server holds at most one chunk in memory per transfer and never
//! reconstructs the file.

use crate::connection::Connection;
use crate::error::TransferError;
use crate::server::ChatRelay;
use hubbub_types::{
    FileDone, FileOffer, FilePrepare, FrameReader, Identity, Message, TransferOutcome, WireError,
    CHUNK_SIZE, MAX_FILE_SIZE,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Progress is logged whenever the transfer advances this many percent.
const PROGRESS_STEP_PERCENT: u64 = 5;

/// Where a transfer is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Offer on its way to the recipient.
    Offered,
    /// Recipient said yes; stream not started.
    Accepted,
    /// Recipient said no, or the offer timed out.
    Rejected,
    /// Chunks moving.
    Streaming,
    /// Every declared byte relayed.
    Complete,
    /// Stream broke before completion.
    Failed,
}

/// One file-relay operation between two connections.
///
/// Transient and single-use: created when the router parses a file-send
/// command, destroyed at a terminal state. `bytes_moved` only ever grows.
#[derive(Debug)]
pub struct Transfer {
    sender: Identity,
    recipient: Identity,
    filename: String,
    size: u64,
    state: TransferState,
    bytes_moved: u64,
}

impl Transfer {
    fn new(sender: Identity, recipient: Identity, filename: &str, size: u64) -> Self {
        Self {
            sender,
            recipient,
            filename: filename.to_string(),
            size,
            state: TransferState::Offered,
            bytes_moved: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Bytes relayed so far.
    pub fn bytes_moved(&self) -> u64 {
        self.bytes_moved
    }

    fn transition(&mut self, next: TransferState) {
        tracing::debug!(
            "transfer {} -> {} ({}): {:?} => {:?}",
            self.sender,
            self.recipient,
            self.filename,
            self.state,
            next
        );
        self.state = next;
    }
}

/// Whether a declared size is acceptable for a transfer.
///
/// Checked by the router before any offer is sent; an out-of-range size
/// creates no transfer at all.
pub fn size_within_limit(size: u64) -> bool {
    (1..=MAX_FILE_SIZE).contains(&size)
}

/// Run one transfer to a terminal state.
///
/// Holds the sender's router loop (and its frame reader) for the duration.
/// Both parties get a `FileDone` with the outcome, whichever way it ends;
/// sends to parties that are already gone are best-effort.
pub async fn run<R>(
    relay: &ChatRelay,
    sender_conn: &Connection,
    reader: &mut FrameReader<R>,
    sender: &Identity,
    recipient_name: &str,
    filename: &str,
    size: u64,
) -> TransferState
where
    R: AsyncRead + Unpin,
{
    debug_assert!(size_within_limit(size));

    if recipient_name == sender.as_str() {
        let _ = sender_conn
            .send(&error("ERROR: Cannot send a file to yourself"))
            .await;
        return TransferState::Failed;
    }

    let Some(recipient_conn) = relay.registry().lookup(recipient_name) else {
        let _ = sender_conn
            .send(&error(format!("ERROR: User '{recipient_name}' is not online")))
            .await;
        return TransferState::Failed;
    };
    let Some(recipient) = recipient_conn.identity().cloned() else {
        let _ = sender_conn
            .send(&error(format!("ERROR: User '{recipient_name}' is not online")))
            .await;
        return TransferState::Failed;
    };

    let mut transfer = Transfer::new(sender.clone(), recipient, filename, size);
    tracing::info!(
        "file offer: {} -> {} ({}, {} bytes)",
        transfer.sender,
        transfer.recipient,
        transfer.filename,
        transfer.size
    );

    // At most one offer may pend per recipient; a second sender gets told
    // the recipient is busy instead of having two streams interleaved onto
    // one connection.
    let Some(answer) = recipient_conn.begin_offer() else {
        let _ = sender_conn
            .send(&error(format!(
                "ERROR: User '{recipient_name}' is busy with another transfer"
            )))
            .await;
        transfer.transition(TransferState::Failed);
        relay
            .metrics()
            .transfers_failed
            .fetch_add(1, Ordering::Relaxed);
        return TransferState::Failed;
    };

    let offer = Message::FileOffer(FileOffer {
        from: transfer.sender.clone(),
        filename: transfer.filename.clone(),
        size,
    });
    if recipient_conn.send(&offer).await.is_err() {
        recipient_conn.cancel_offer();
        return fail(relay, &mut transfer, sender_conn, None, TransferError::RecipientGone).await;
    }

    let accept_timeout = Duration::from_secs(relay.config().transfer.accept_timeout_secs);
    let accepted = match tokio::time::timeout(accept_timeout, answer).await {
        Ok(Ok(accepted)) => accepted,
        Ok(Err(_)) => {
            // Slot dropped: the recipient disconnected mid-offer.
            return fail(
                relay,
                &mut transfer,
                sender_conn,
                None,
                TransferError::RecipientGone,
            )
            .await;
        }
        Err(_) => {
            recipient_conn.cancel_offer();
            return reject(
                relay,
                &mut transfer,
                sender_conn,
                Some(&recipient_conn),
                "offer timed out",
            )
            .await;
        }
    };

    if !accepted {
        let reason = format!("declined by {}", transfer.recipient);
        return reject(relay, &mut transfer, sender_conn, Some(&recipient_conn), &reason).await;
    }
    transfer.transition(TransferState::Accepted);

    let prepare = Message::FilePrepare(FilePrepare {
        from: transfer.sender.clone(),
        filename: transfer.filename.clone(),
        size,
    });
    if recipient_conn.send(&prepare).await.is_err() {
        return fail(relay, &mut transfer, sender_conn, None, TransferError::RecipientGone).await;
    }

    transfer.transition(TransferState::Streaming);
    let chunk_timeout = Duration::from_secs(relay.config().transfer.chunk_timeout_secs);
    let mut last_logged_percent = 0u64;

    while transfer.bytes_moved < transfer.size {
        let frame = match tokio::time::timeout(chunk_timeout, reader.read_frame()).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(WireError::Closed)) | Ok(Err(WireError::Io(_))) => {
                return fail(
                    relay,
                    &mut transfer,
                    sender_conn,
                    Some(&recipient_conn),
                    TransferError::SenderGone,
                )
                .await;
            }
            Ok(Err(_)) => {
                return fail(
                    relay,
                    &mut transfer,
                    sender_conn,
                    Some(&recipient_conn),
                    TransferError::UnexpectedFrame,
                )
                .await;
            }
            Err(_) => {
                return fail(
                    relay,
                    &mut transfer,
                    sender_conn,
                    Some(&recipient_conn),
                    TransferError::ChunkTimeout,
                )
                .await;
            }
        };

        let chunk = match frame {
            Message::FileChunk(chunk) => chunk,
            _ => {
                return fail(
                    relay,
                    &mut transfer,
                    sender_conn,
                    Some(&recipient_conn),
                    TransferError::UnexpectedFrame,
                )
                .await;
            }
        };

        let len = chunk.data.len() as u64;
        if chunk.data.is_empty() {
            return fail(
                relay,
                &mut transfer,
                sender_conn,
                Some(&recipient_conn),
                TransferError::EmptyChunk,
            )
            .await;
        }
        if chunk.data.len() > CHUNK_SIZE {
            return fail(
                relay,
                &mut transfer,
                sender_conn,
                Some(&recipient_conn),
                TransferError::OversizedChunk {
                    len: chunk.data.len(),
                },
            )
            .await;
        }
        if transfer.bytes_moved + len > transfer.size {
            let declared = transfer.size;
            return fail(
                relay,
                &mut transfer,
                sender_conn,
                Some(&recipient_conn),
                TransferError::Overrun { declared },
            )
            .await;
        }

        // Forward the exact bytes received; this chunk is the only file
        // data in server memory for this transfer.
        if recipient_conn
            .send(&Message::FileChunk(chunk))
            .await
            .is_err()
        {
            return fail(
                relay,
                &mut transfer,
                sender_conn,
                None,
                TransferError::RecipientGone,
            )
            .await;
        }

        transfer.bytes_moved += len;
        relay
            .metrics()
            .file_bytes_relayed
            .fetch_add(len, Ordering::Relaxed);

        let percent = transfer.bytes_moved * 100 / transfer.size;
        if percent >= last_logged_percent + PROGRESS_STEP_PERCENT {
            tracing::info!(
                "transfer {} -> {}: {}% ({}/{} bytes)",
                transfer.sender,
                transfer.recipient,
                percent,
                transfer.bytes_moved,
                transfer.size
            );
            last_logged_percent = percent;
        }
    }

    transfer.transition(TransferState::Complete);
    relay
        .metrics()
        .transfers_total
        .fetch_add(1, Ordering::Relaxed);
    tracing::info!(
        "file transfer completed: {} -> {} ({}, {} bytes)",
        transfer.sender,
        transfer.recipient,
        transfer.filename,
        transfer.bytes_moved
    );

    let done = done_message(&transfer, TransferOutcome::Complete, None);
    let _ = sender_conn.send(&done).await;
    let _ = recipient_conn.send(&done).await;

    TransferState::Complete
}

/// Move to Rejected and tell both parties.
async fn reject(
    relay: &ChatRelay,
    transfer: &mut Transfer,
    sender_conn: &Connection,
    recipient_conn: Option<&Connection>,
    reason: &str,
) -> TransferState {
    transfer.transition(TransferState::Rejected);
    relay
        .metrics()
        .transfers_rejected
        .fetch_add(1, Ordering::Relaxed);
    tracing::info!(
        "file transfer rejected: {} -> {} ({}): {}",
        transfer.sender,
        transfer.recipient,
        transfer.filename,
        reason
    );

    let done = done_message(transfer, TransferOutcome::Rejected, Some(reason.to_string()));
    let _ = sender_conn.send(&done).await;
    if let Some(conn) = recipient_conn {
        let _ = conn.send(&done).await;
    }
    TransferState::Rejected
}

/// Move to Failed and tell whichever parties are still reachable.
async fn fail(
    relay: &ChatRelay,
    transfer: &mut Transfer,
    sender_conn: &Connection,
    recipient_conn: Option<&Connection>,
    error: TransferError,
) -> TransferState {
    transfer.transition(TransferState::Failed);
    relay
        .metrics()
        .transfers_failed
        .fetch_add(1, Ordering::Relaxed);
    tracing::warn!(
        "file transfer failed: {} -> {} ({}): {}",
        transfer.sender,
        transfer.recipient,
        transfer.filename,
        error
    );

    let done = done_message(transfer, TransferOutcome::Failed, Some(error.to_string()));
    let _ = sender_conn.send(&done).await;
    if let Some(conn) = recipient_conn {
        let _ = conn.send(&done).await;
    }
    TransferState::Failed
}

fn done_message(transfer: &Transfer, outcome: TransferOutcome, reason: Option<String>) -> Message {
    Message::FileDone(FileDone {
        outcome,
        filename: transfer.filename.clone(),
        bytes_moved: transfer.bytes_moved,
        reason,
    })
}

fn error(text: impl Into<String>) -> Message {
    Message::Error(hubbub_types::ErrorReply { text: text.into() })
}
