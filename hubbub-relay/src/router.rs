//! Per-connection message routing.
//!
//! One router task per connection: authenticate the Join, then read one
//! frame per iteration and classify it. Chat lines fan out through the
//! registry; `/sendfile` hands the loop to the file relay until the transfer
//! reaches a terminal state.

use crate::connection::{Connection, ConnectionState};
use crate::error::AuthError;
use crate::server::ChatRelay;
use crate::transfer;
use hubbub_types::{
    Chat, ErrorReply, FrameReader, Identity, Message, Notice, Private, UserList, Welcome,
    WireError, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

/// Drive one accepted connection from handshake to teardown.
pub async fn handle_connection(relay: Arc<ChatRelay>, stream: TcpStream, peer_addr: SocketAddr) {
    tracing::info!("new connection from {}", peer_addr);

    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let connection = Arc::new(Connection::new(peer_addr, write_half));
    connection.set_state(ConnectionState::Authenticating);

    let identity = match authenticate(&relay, &connection, &mut reader).await {
        Ok(identity) => identity,
        Err(err) => {
            relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
            tracing::info!("auth failed for {}: {}", peer_addr, err);
            if let Some(text) = err.reply_text() {
                let _ = connection.send(&error_reply(text)).await;
            }
            connection.set_state(ConnectionState::Closed);
            return;
        }
    };

    let welcome = Message::Welcome(Welcome {
        version: PROTOCOL_VERSION,
        identity: identity.clone(),
        online: relay.online_count() as u32,
    });
    if connection.send(&welcome).await.is_err() {
        // Gone before the welcome made it out; undo the registration.
        relay.registry().deregister(identity.as_str());
        connection.set_state(ConnectionState::Closed);
        return;
    }

    relay
        .registry()
        .broadcast(&notice(format!("{identity} joined the chat!")), Some(identity.as_str()))
        .await;
    tracing::info!("user authenticated: {} from {}", identity, peer_addr);

    Router {
        relay: relay.clone(),
        connection: connection.clone(),
        identity: identity.clone(),
    }
    .run(&mut reader)
    .await;

    // Teardown: leave notice first, then drop the name from the registry,
    // then release the transport. A transfer parked on this connection's
    // offer slot observes the closed channel.
    connection.set_state(ConnectionState::Closing);
    connection.cancel_offer();
    relay
        .registry()
        .broadcast(&notice(format!("{identity} left the chat")), Some(identity.as_str()))
        .await;
    relay.registry().deregister(identity.as_str());
    connection.set_state(ConnectionState::Closed);
    tracing::info!("connection closed for {}", identity);
}

/// Read and validate the Join frame.
///
/// Registration happens in here so the uniqueness check and the insert are
/// one atomic step; the caller only ever sees an identity that is already
/// registered.
async fn authenticate(
    relay: &ChatRelay,
    connection: &Arc<Connection>,
    reader: &mut FrameReader<OwnedReadHalf>,
) -> Result<Identity, AuthError> {
    let timeout = Duration::from_secs(relay.config().limits.auth_timeout_secs);
    let first = tokio::time::timeout(timeout, reader.read_frame())
        .await
        .map_err(|_| AuthError::Timeout)?
        .map_err(AuthError::ConnectionLost)?;

    let join = match first {
        Message::Join(join) => join,
        _ => return Err(AuthError::NotJoin),
    };

    if join.version != PROTOCOL_VERSION {
        return Err(AuthError::VersionMismatch {
            client: join.version,
            server: PROTOCOL_VERSION,
        });
    }

    let identity = Identity::parse(&join.identity)?;

    if !relay
        .registry()
        .try_register(identity.clone(), connection.clone())
    {
        return Err(AuthError::Taken {
            identity: join.identity,
        });
    }

    connection.set_identity(identity.clone());
    connection.set_state(ConnectionState::Active);
    Ok(identity)
}

/// The per-connection command interpreter.
struct Router {
    relay: Arc<ChatRelay>,
    connection: Arc<Connection>,
    identity: Identity,
}

impl Router {
    /// Process frames until quit, EOF, or transport failure.
    async fn run(&self, reader: &mut FrameReader<OwnedReadHalf>) {
        loop {
            let message = match reader.read_frame().await {
                Ok(message) => message,
                Err(WireError::Decode(e)) => {
                    // The frame was well-delimited, so the stream is still
                    // in sync; report and keep going.
                    self.relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("undecodable frame from {}: {}", self.identity, e);
                    let _ = self
                        .connection
                        .send(&error_reply("ERROR: Malformed message"))
                        .await;
                    continue;
                }
                Err(e) => {
                    if !e.is_disconnect() {
                        tracing::warn!("read error for {}: {}", self.identity, e);
                    }
                    return;
                }
            };

            match message {
                Message::Line(line) => {
                    let text = line.text.trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    if self.rate_limited().await {
                        continue;
                    }
                    tracing::debug!("[{}] {}", self.identity, text);
                    if self.dispatch(&text, reader).await == Flow::Quit {
                        return;
                    }
                }
                Message::FileAccept => self.answer_offer(true).await,
                Message::FileReject => self.answer_offer(false).await,
                Message::FileChunk(_) => {
                    // File bytes are only legal while a transfer holds the
                    // sender's loop, and then they never reach this match.
                    self.relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
                    let _ = self
                        .connection
                        .send(&error_reply("ERROR: Unexpected file data"))
                        .await;
                }
                other => {
                    self.relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        "unexpected message from {}: {:?}",
                        self.identity,
                        std::mem::discriminant(&other)
                    );
                    let _ = self
                        .connection
                        .send(&error_reply("ERROR: Unexpected message"))
                        .await;
                }
            }
        }
    }

    /// Classify one trimmed line and carry out its action.
    async fn dispatch(&self, text: &str, reader: &mut FrameReader<OwnedReadHalf>) -> Flow {
        match parse_command(text) {
            Err(reply) => {
                let _ = self.connection.send(&error_reply(reply)).await;
            }
            Ok(Command::List) => {
                let users = self.relay.registry().list_identities();
                let _ = self
                    .connection
                    .send(&Message::UserList(UserList { users }))
                    .await;
            }
            Ok(Command::Private { to, text }) => {
                self.private_message(to, text).await;
            }
            Ok(Command::SendFile { to, filename, size }) => {
                if !transfer::size_within_limit(size) {
                    let _ = self
                        .connection
                        .send(&error_reply("ERROR: Invalid file size (max 10MB)"))
                        .await;
                    return Flow::Continue;
                }
                // The transfer holds this loop until it reaches a terminal
                // state; no other command from this sender interleaves with
                // its own file bytes.
                let outcome = transfer::run(
                    &self.relay,
                    &self.connection,
                    reader,
                    &self.identity,
                    to,
                    filename,
                    size,
                )
                .await;
                tracing::debug!(
                    "transfer {} -> {} finished: {:?}",
                    self.identity,
                    to,
                    outcome
                );
            }
            Ok(Command::Quit) => {
                let _ = self
                    .connection
                    .send(&notice(format!("Goodbye {}!", self.identity)))
                    .await;
                return Flow::Quit;
            }
            Ok(Command::Broadcast(text)) => {
                let chat = Message::Chat(Chat {
                    from: self.identity.clone(),
                    text: text.to_string(),
                });
                let delivered = self
                    .relay
                    .registry()
                    .broadcast(&chat, Some(self.identity.as_str()))
                    .await;
                self.relay
                    .metrics()
                    .broadcasts_total
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!("broadcast from {} reached {} peers", self.identity, delivered);
            }
        }
        Flow::Continue
    }

    /// Forward a direct message, echoing a confirmation copy to the sender.
    async fn private_message(&self, to: &str, text: &str) {
        let not_found = || error_reply(format!("ERROR: User '{to}' not found or offline"));

        let Some(peer) = self.relay.registry().lookup(to) else {
            let _ = self.connection.send(&not_found()).await;
            return;
        };
        let Some(to_identity) = peer.identity().cloned() else {
            let _ = self.connection.send(&not_found()).await;
            return;
        };

        let private = Message::Private(Private {
            from: self.identity.clone(),
            to: to_identity,
            text: text.to_string(),
        });

        // A send failure here means the recipient vanished between lookup
        // and delivery; that is "recipient gone", not a registry bug.
        if peer.send(&private).await.is_err() {
            let _ = self.connection.send(&not_found()).await;
            return;
        }
        let _ = self.connection.send(&private).await;

        self.relay
            .metrics()
            .privates_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!("private message: {} -> {}", self.identity, to);
    }

    /// Resolve this connection's pending file offer, if any.
    async fn answer_offer(&self, accepted: bool) {
        if !self.connection.resolve_offer(accepted) {
            let _ = self
                .connection
                .send(&error_reply("ERROR: No pending file offer"))
                .await;
        }
    }

    /// Apply the per-identity and global line limits.
    async fn rate_limited(&self) -> bool {
        let limits = self.relay.rate_limits();
        let over = limits.check_global().is_err() || limits.check_message(&self.identity).is_err();
        if over {
            self.relay
                .metrics()
                .rate_limit_hits
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!("rate limited: {}", self.identity);
            let _ = self
                .connection
                .send(&error_reply("ERROR: Too many messages, slow down"))
                .await;
        }
        over
    }
}

/// Whether the router loop keeps going after a dispatched line.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// One classified input line.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    /// `/list`
    List,
    /// `/quit`
    Quit,
    /// `@identity text`
    Private { to: &'a str, text: &'a str },
    /// `/sendfile identity filename size`
    SendFile {
        to: &'a str,
        filename: &'a str,
        size: u64,
    },
    /// Anything else, non-empty
    Broadcast(&'a str),
}

const SENDFILE_USAGE: &str = "Usage: /sendfile <username> <filename> <file_size>";

/// Classify a trimmed, non-empty line.
///
/// Errors carry the exact reply text for the sender.
fn parse_command(line: &str) -> Result<Command<'_>, String> {
    if line == "/list" {
        return Ok(Command::List);
    }
    if line == "/quit" {
        return Ok(Command::Quit);
    }
    if let Some(rest) = line.strip_prefix('@') {
        return match rest.split_once(' ') {
            Some((to, text)) if !to.is_empty() && !text.trim().is_empty() => Ok(Command::Private {
                to,
                text: text.trim(),
            }),
            _ => Err("ERROR: Invalid format. Use: @username message".to_string()),
        };
    }
    if line.split_whitespace().next() == Some("/sendfile") {
        let mut args = line.split_whitespace().skip(1);
        return match (args.next(), args.next(), args.next(), args.next()) {
            (Some(to), Some(filename), Some(size_raw), None) => {
                let size = size_raw
                    .parse::<u64>()
                    .map_err(|_| "ERROR: Invalid file size (max 10MB)".to_string())?;
                Ok(Command::SendFile { to, filename, size })
            }
            _ => Err(SENDFILE_USAGE.to_string()),
        };
    }
    Ok(Command::Broadcast(line))
}

fn error_reply(text: impl Into<String>) -> Message {
    Message::Error(ErrorReply { text: text.into() })
}

fn notice(text: impl Into<String>) -> Message {
    Message::Notice(Notice { text: text.into() })
}
