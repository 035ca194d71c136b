//! Envelope demultiplexing.
//!
//! Every message payload starts with a 16-byte [`ProcedureId`]. The
//! peer-controller id selects the [`PeerControl`] codec; any other id carries
//! a [`SignedRoundMessage`].

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes};

use crate::core::codec::{decode_exact, BytesMut, Wire};
use crate::error::{ProtocolError, Result};
use crate::protocol::peer::PeerControl;
use crate::protocol::round::SignedRoundMessage;

/// Procedure id length.
pub const PROCEDURE_ID_SIZE: usize = 16;

/// Opaque tag selecting which sub-protocol decodes an envelope body.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcedureId(pub [u8; PROCEDURE_ID_SIZE]);

/// Well-known id of the peer-management sub-protocol.
pub const PEER_CONTROLLER: ProcedureId = ProcedureId([
    0xe4, 0xdf, 0xbb, 0xb9, 0xae, 0xaf, 0xf2, 0xc8, 0x44, 0x18, 0x1d, 0x5f, 0x03, 0x1f, 0x2c, 0xac,
]);

impl ProcedureId {
    pub fn as_bytes(&self) -> &[u8; PROCEDURE_ID_SIZE] {
        &self.0
    }

    pub fn is_peer_controller(&self) -> bool {
        *self == PEER_CONTROLLER
    }
}

impl fmt::Display for ProcedureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ProcedureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcedureId({self})")
    }
}

impl FromStr for ProcedureId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let mut out = [0u8; PROCEDURE_ID_SIZE];
        hex::decode_to_slice(s, &mut out)
            .map_err(|e| ProtocolError::Encoding(format!("invalid procedure id '{s}': {e}")))?;
        Ok(ProcedureId(out))
    }
}

/// A fully decoded message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    PeerControl(PeerControl),
    Round {
        procedure: ProcedureId,
        message: SignedRoundMessage,
    },
}

impl Envelope {
    pub fn procedure_id(&self) -> ProcedureId {
        match self {
            Envelope::PeerControl(_) => PEER_CONTROLLER,
            Envelope::Round { procedure, .. } => *procedure,
        }
    }

    /// Split a payload into its procedure id and body.
    pub fn split(payload: &[u8]) -> Result<(ProcedureId, &[u8])> {
        if payload.len() < PROCEDURE_ID_SIZE {
            return Err(ProtocolError::UndersizedEnvelope(payload.len()));
        }
        let (pid, body) = payload.split_at(PROCEDURE_ID_SIZE);
        let mut id = [0u8; PROCEDURE_ID_SIZE];
        id.copy_from_slice(pid);
        Ok((ProcedureId(id), body))
    }

    /// Decode a raw message payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (procedure, body) = Self::split(payload)?;
        if procedure.is_peer_controller() {
            Ok(Envelope::PeerControl(decode_exact(body)?))
        } else {
            Ok(Envelope::Round {
                procedure,
                message: decode_exact(body)?,
            })
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(64);
        out.put_slice(self.procedure_id().as_bytes());
        match self {
            Envelope::PeerControl(body) => body.encode(&mut out)?,
            Envelope::Round { procedure, .. } if procedure.is_peer_controller() => {
                return Err(ProtocolError::UnexpectedMessage(
                    "round message tagged with the peer-controller id".into(),
                ));
            }
            Envelope::Round { message, .. } => message.encode(&mut out)?,
        }
        Ok(out.freeze())
    }

    /// Prefix an already encoded body with a procedure id.
    pub fn wrap(procedure: ProcedureId, body: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(PROCEDURE_ID_SIZE + body.len());
        out.put_slice(procedure.as_bytes());
        out.put_slice(body);
        out.freeze()
    }
}
