//! Connection handshake.
//!
//! Every connection opens with three bytes, sent once per direction:
//!
//! ```text
//! [Marker(1) = 0x00] [Port(2), big-endian]
//! ```
//!
//! The port is the sender's own listen port. The receiver combines it with the
//! connection's remote address to name the peer, since the source port of an
//! accepted socket is ephemeral.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::error::{ProtocolError, Result};

/// The only protocol marker this node speaks.
pub const PROTOCOL_MARKER: u8 = 0;

/// Handshake length on the wire.
pub const HANDSHAKE_SIZE: usize = 3;

/// Parsed connection preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// Listen port advertised by the sender.
    pub port: u16,
}

impl Handshake {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub fn to_bytes(self) -> [u8; HANDSHAKE_SIZE] {
        let port = self.port.to_be_bytes();
        [PROTOCOL_MARKER, port[0], port[1]]
    }

    /// Validate a raw preamble.
    pub fn from_bytes(bytes: [u8; HANDSHAKE_SIZE]) -> Result<Self> {
        if bytes[0] != PROTOCOL_MARKER {
            return Err(ProtocolError::InvalidHandshake(bytes[0]));
        }
        Ok(Self {
            port: u16::from_be_bytes([bytes[1], bytes[2]]),
        })
    }

    /// Read and validate the peer's preamble from a fresh stream.
    #[instrument(skip(stream))]
    pub async fn read_from<S>(stream: &mut S) -> Result<Self>
    where
        S: AsyncRead + Unpin,
    {
        let mut bytes = [0u8; HANDSHAKE_SIZE];
        stream.read_exact(&mut bytes).await?;
        let handshake = Self::from_bytes(bytes)?;
        debug!(port = handshake.port, "Handshake received");
        Ok(handshake)
    }

    /// Write this preamble to a fresh stream.
    pub async fn write_to<S>(self, stream: &mut S) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        stream.write_all(&self.to_bytes()).await?;
        Ok(())
    }
}
