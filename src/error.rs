//! # Error Types
//!
//! Error handling for the wire codec, the reactor and peer discovery.
//!
//! ## Error Categories
//! - **Codec errors**: truncated input (`Underrun`), invalid text or
//!   non-canonical integers (`Encoding`), tag mismatches (`UnknownVariant`,
//!   `NoMatchingVariant`)
//! - **Protocol errors**: bad handshake marker, undersized envelopes,
//!   oversized frames
//! - **Connection errors**: connect/read/write failures, closed peers
//! - **Configuration errors**: invalid or unreadable settings
//!
//! Codec errors are always terminal for the message being decoded: there is no
//! partial recovery and no default variant is ever guessed.
//!
//! ## Example Usage
//! ```rust
//! use zeno_net::core::codec::decode_exact;
//! use zeno_net::error::ProtocolError;
//!
//! // A one-byte BigInt header that promises two magnitude bytes but carries one.
//! let result = decode_exact::<zeno_net::core::codec::BigInt>(&[0x02, 0xff]);
//! assert!(matches!(result, Err(ProtocolError::Underrun { needed: 2, remaining: 1 })));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants for log lines emitted on error paths.
pub mod constants {
    pub const ERR_FORWARDER_DIED: &str = "Forwarder terminated";
    pub const ERR_CONNECTION_DROPPED: &str = "Inbound connection dropped";
    pub const ERR_UNDECODABLE_EVENT: &str = "Failed to decode message envelope";
}

// ProtocolError is the primary error type for all codec and network operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Underrun: needed {needed} bytes but only {remaining} remain")]
    Underrun { needed: usize, remaining: usize },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Unknown variant {discriminant} for union {union}")]
    UnknownVariant { union: &'static str, discriminant: u8 },

    #[error("No variant named '{name}' in union {union}")]
    NoMatchingVariant { union: &'static str, name: String },

    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),

    #[error("{what} too large to encode: {len}")]
    ValueTooLarge { what: &'static str, len: usize },

    #[error("Invalid handshake protocol marker: {0}")]
    InvalidHandshake(u8),

    #[error("Envelope too short: {0} bytes (procedure id needs 16)")]
    UndersizedEnvelope(usize),

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Refusing to send an empty payload")]
    EmptyPayload,

    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Reactor has been shut down")]
    Shutdown,

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Synchronization primitive poisoned")]
    LockPoisoned,
}

impl ProtocolError {
    /// True for malformed or mismatched message bytes, as opposed to transport failures.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::Underrun { .. }
                | ProtocolError::Encoding(_)
                | ProtocolError::UnknownVariant { .. }
                | ProtocolError::NoMatchingVariant { .. }
                | ProtocolError::TrailingBytes(_)
                | ProtocolError::UndersizedEnvelope(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_are_classified() {
        assert!(ProtocolError::Underrun {
            needed: 2,
            remaining: 1
        }
        .is_decode_error());
        assert!(ProtocolError::UndersizedEnvelope(3).is_decode_error());
        assert!(!ProtocolError::ConnectionClosed.is_decode_error());
        assert!(!ProtocolError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_decode_error());
    }
}
