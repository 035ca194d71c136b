//! Peer identities and the peer-management sub-protocol.

use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::core::codec::{BytesMut, Wire};
use crate::core::parser::Parser;
use crate::error::{ProtocolError, Result};
use crate::wire_union;

/// Network destination and logical peer name, written `"address:port"`.
///
/// On the wire a node id is a record of a `Str` address and a big-endian
/// `u16` port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub address: String,
    pub port: u16,
}

impl NodeId {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Name a peer from the remote address of a connection plus the port it
    /// announced in its handshake.
    pub fn from_remote(remote: SocketAddr, announced_port: u16) -> Self {
        Self::new(remote.ip().to_canonical().to_string(), announced_port)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl FromStr for NodeId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let (address, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ProtocolError::InvalidNodeId(s.to_string()))?;
        let address = address.trim_start_matches('[').trim_end_matches(']');
        if address.is_empty() {
            return Err(ProtocolError::InvalidNodeId(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ProtocolError::InvalidNodeId(s.to_string()))?;
        Ok(Self::new(address, port))
    }
}

impl Wire for NodeId {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        self.address.encode(out)?;
        self.port.encode(out)
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        Ok(Self {
            address: String::decode(parser)?,
            port: u16::decode(parser)?,
        })
    }
}

wire_union! {
    /// Body of every envelope tagged with the peer-controller procedure id.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum PeerControl {
        /// Ask the receiver to dial back with its peer list.
        GetPeers(()) = 0,
        /// Known peers of the sender.
        Peers(BTreeSet<NodeId>) = 1,
    }
}
