//! Length-prefixed framing over any async byte stream.
//!
//! Each frame is a 4-byte big-endian length followed by a MessagePack-encoded
//! [`Message`]. The prefix is what separates control text from file bytes on
//! the shared stream; neither side ever scans for delimiters.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Message, WireError};

/// Maximum encoded size of a single frame.
///
/// Control messages are small and file chunks are capped at
/// [`CHUNK_SIZE`](crate::CHUNK_SIZE); 64 KiB leaves ample envelope headroom
/// while bounding what a misbehaving peer can make the other side allocate.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Reads framed [`Message`]s from an async byte stream.
///
/// Owned by exactly one task; the relay gives each connection's router task
/// the reading half and shares only the writing half.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a byte stream.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read one frame.
    ///
    /// Returns [`WireError::Closed`] when the peer shuts the stream down,
    /// whether at a frame boundary or mid-frame.
    pub async fn read_frame(&mut self) -> Result<Message, WireError> {
        let mut len_buf = [0u8; 4];
        self.inner
            .read_exact(&mut len_buf)
            .await
            .map_err(eof_as_closed)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge {
                len,
                limit: MAX_FRAME_SIZE,
            });
        }

        let mut buf = vec![0u8; len];
        self.inner
            .read_exact(&mut buf)
            .await
            .map_err(eof_as_closed)?;

        Message::from_bytes(&buf)
    }
}

/// Writes framed [`Message`]s to an async byte stream.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a byte stream.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encode and write one frame, flushing the transport.
    pub async fn write_frame(&mut self, message: &Message) -> Result<(), WireError> {
        let bytes = message.to_bytes()?;
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge {
                len: bytes.len(),
                limit: MAX_FRAME_SIZE,
            });
        }

        self.inner
            .write_all(&(bytes.len() as u32).to_be_bytes())
            .await?;
        self.inner.write_all(&bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

fn eof_as_closed(err: std::io::Error) -> WireError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::Closed
    } else {
        WireError::Io(err)
    }
}
