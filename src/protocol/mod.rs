//! # Protocol Layer
//!
//! Message shapes carried inside frames, built on the wire codec.
//!
//! ## Components
//! - **Handshake**: 3-byte connection preamble announcing the listen port
//! - **Peer**: `NodeId` and the `PeerControl` union (GetPeers / Peers)
//! - **Round**: signed multi-step round messages for the three flows
//! - **Envelope**: procedure-id demultiplexing of raw payloads
//! - **Dispatcher**: handler registry keyed by procedure id
//!
//! Decoding is strict: unknown tags, truncated bodies and trailing bytes are
//! errors, never defaults.

pub mod dispatcher;
pub mod envelope;
pub mod handshake;
pub mod peer;
pub mod round;

#[cfg(test)]
mod tests;

pub use envelope::{Envelope, ProcedureId, PEER_CONTROLLER};
pub use peer::{NodeId, PeerControl};
pub use round::{RoundMessage, SignedRoundMessage};
