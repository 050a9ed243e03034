//! A single client connection and its lifecycle state.

use hubbub_types::{FrameWriter, Identity, Message, WireError};
use std::net::SocketAddr;
use std::sync::{Mutex, OnceLock};
use tokio::io::AsyncWrite;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

/// Where a connection is in its life.
///
/// Connecting → Authenticating → Active → Closing → Closed. A connection that
/// fails authentication skips Active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport accepted, nothing read yet.
    Connecting,
    /// Waiting for the Join frame.
    Authenticating,
    /// Registered and routable.
    Active,
    /// Leaving: notices sent, registry entry being removed.
    Closing,
    /// Deregistered, transport released.
    Closed,
}

type OutboundSink = FrameWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// One authenticated endpoint: transport handle, identity, peer address,
/// lifecycle state.
///
/// The reading half of the transport stays with the connection's router task;
/// this struct holds only the writing half, behind a mutex so that the many
/// tasks that may write to one connection (its router, broadcasters, a file
/// relay) never interleave bytes within a frame.
pub struct Connection {
    peer_addr: SocketAddr,
    identity: OnceLock<Identity>,
    state: Mutex<ConnectionState>,
    outbound: AsyncMutex<OutboundSink>,
    /// Rendezvous for a file offer awaiting this connection's accept/reject.
    pending_offer: Mutex<Option<oneshot::Sender<bool>>>,
}

impl Connection {
    /// Wrap the writing half of an accepted transport.
    pub fn new<W>(peer_addr: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            peer_addr,
            identity: OnceLock::new(),
            state: Mutex::new(ConnectionState::Connecting),
            outbound: AsyncMutex::new(FrameWriter::new(Box::new(writer))),
            pending_offer: Mutex::new(None),
        }
    }

    /// The peer's address, recorded at accept time.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The identity this connection authenticated as, if it has.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    /// Record the authenticated identity. Write-once; later calls are
    /// ignored.
    pub fn set_identity(&self, identity: Identity) {
        let _ = self.identity.set(identity);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Advance the lifecycle state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Send one frame to this connection.
    ///
    /// Serializes against every other writer to the same connection. The
    /// outbound lock is held only for the write, never while waiting on this
    /// connection's inbound traffic.
    pub async fn send(&self, message: &Message) -> Result<(), WireError> {
        let mut outbound = self.outbound.lock().await;
        outbound.write_frame(message).await
    }

    /// Install a pending file offer and return the receiving end of its
    /// accept/reject answer.
    ///
    /// Returns `None` if an offer is already pending on this connection; a
    /// recipient handles at most one offer at a time.
    pub fn begin_offer(&self) -> Option<oneshot::Receiver<bool>> {
        let mut slot = self.pending_offer.lock().unwrap();
        if slot.is_some() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        Some(rx)
    }

    /// Resolve the pending offer with the recipient's answer.
    ///
    /// Returns false if no offer was pending (or the offering side already
    /// gave up).
    pub fn resolve_offer(&self, accepted: bool) -> bool {
        let waiting = self.pending_offer.lock().unwrap().take();
        match waiting {
            Some(tx) => tx.send(accepted).is_ok(),
            None => false,
        }
    }

    /// Drop any pending offer without an answer.
    ///
    /// The offering side observes the closed channel and treats the
    /// recipient as gone. Called on offer timeout and during connection
    /// teardown.
    pub fn cancel_offer(&self) {
        self.pending_offer.lock().unwrap().take();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .field("identity", &self.identity.get())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
