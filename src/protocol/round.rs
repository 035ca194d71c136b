//! # Round Protocol
//!
//! Signed, multi-step messages exchanged by notary nodes while they run a
//! round of cross-chain coordination.
//!
//! ## Wire Layout
//! ```text
//! SignedRoundMessage = [Signature(65)] [Maybe RoundMessage]
//! RoundMessage       = [Flow(1)] [Major(1)] [Minor(1)] [StepMessage]
//! StepMessage        = [BigInt round] [BigInt request] [List InventoryEntry]
//! InventoryEntry     = [Address(20)] [Signature(65)] [step-specific payload]
//! ```
//!
//! The major tag is the 1-based position of the step inside its flow. The
//! minor tag is carried verbatim. There is no forward-compatible mode: an
//! unknown flow or major tag fails the whole message.

use bytes::{BufMut, Bytes};

use crate::core::codec::{BigInt, BytesMut, CompactBuf, Le, Wire, WireUnion};
use crate::core::parser::Parser;
use crate::error::{ProtocolError, Result};
use crate::{wire_record, wire_union};

pub type Address = [u8; 20];
pub type Signature = [u8; 65];
pub type SigHash = [u8; 32];
pub type TxId = [u8; 32];
pub type PubKey = [u8; 33];

/// One participant's signed contribution to a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry<T> {
    pub address: Address,
    pub signature: Signature,
    pub payload: T,
}

impl<T: Wire> Wire for InventoryEntry<T> {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        self.address.encode(out)?;
        self.signature.encode(out)?;
        self.payload.encode(out)
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        Ok(Self {
            address: Address::decode(parser)?,
            signature: Signature::decode(parser)?,
            payload: T::decode(parser)?,
        })
    }
}

/// Common body of every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMessage<T> {
    pub round_index: BigInt,
    pub request: BigInt,
    pub inventory: Vec<InventoryEntry<T>>,
}

impl<T> StepMessage<T> {
    pub fn new(round_index: impl Into<BigInt>, request: impl Into<BigInt>) -> Self {
        Self {
            round_index: round_index.into(),
            request: request.into(),
            inventory: Vec::new(),
        }
    }

    pub fn with_entry(mut self, address: Address, signature: Signature, payload: T) -> Self {
        self.inventory.push(InventoryEntry {
            address,
            signature,
            payload,
        });
        self
    }
}

impl<T: Wire> Wire for StepMessage<T> {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        self.round_index.encode(out)?;
        self.request.encode(out)?;
        self.inventory.encode(out)
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        Ok(Self {
            round_index: BigInt::decode(parser)?,
            request: BigInt::decode(parser)?,
            inventory: Vec::decode(parser)?,
        })
    }
}

wire_record! {
    /// Ethereum transaction proposed by the round leader.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct EthTx {
        pub nonce: BigInt,
        pub value: BigInt,
        pub to: Option<Address>,
        pub sig: Option<Signature>,
        pub gas_price: BigInt,
        pub gas: BigInt,
        pub data: Bytes,
        pub chain_id: u8,
    }
}

wire_record! {
    /// Transaction output reference with a big-endian index.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Outpoint {
        pub txid: TxId,
        pub n: u32,
    }
}

wire_record! {
    /// Transaction output reference as Bitcoin serializes it (little-endian index).
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct BitcoinOutpoint {
        pub txid: TxId,
        pub n: Le<u32>,
    }
}

wire_record! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MemberUtxo {
        pub pubkey: PubKey,
        pub prevout: Outpoint,
    }
}

wire_record! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ChosenUtxo {
        pub address: Address,
        pub utxo: MemberUtxo,
    }
}

wire_record! {
    /// Signed Bitcoin transaction input contributed by one member.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct BitcoinTxIn {
        pub prevout: BitcoinOutpoint,
        pub script: CompactBuf,
        pub sequence: Le<u32>,
    }
}

wire_union! {
    /// Steps of the KMD to ETH flow.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum KmdToEthStep {
        CollectSigs(StepMessage<SigHash>) = 0,
        ProposeTx(StepMessage<Option<EthTx>>) = 1,
        /// Confirmation at step 3.
        Confirm3(StepMessage<()>) = 2,
        /// Confirmation at step 4.
        Confirm4(StepMessage<()>) = 3,
        /// Confirmation at step 5.
        Confirm5(StepMessage<()>) = 4,
    }
}

wire_union! {
    /// Steps of the ETH to KMD flow.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum EthToKmdStep {
        CollectUtxos(StepMessage<MemberUtxo>) = 0,
        ProposeUtxos(StepMessage<Option<Vec<ChosenUtxo>>>) = 1,
        CollectInputs(StepMessage<Option<BitcoinTxIn>>) = 2,
        Confirm(StepMessage<()>) = 3,
    }
}

wire_union! {
    /// Steps of the stats to KMD flow.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StatsToKmdStep {
        CollectSigs(StepMessage<SigHash>) = 0,
        ProposeTx(StepMessage<()>) = 1,
    }
}

/// Accessors shared by the step unions of every flow.
pub trait StepBody: WireUnion {
    fn round_index(&self) -> &BigInt;
    fn request(&self) -> &BigInt;
    fn inventory_len(&self) -> usize;
}

macro_rules! impl_step_body {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl StepBody for $name {
            fn round_index(&self) -> &BigInt {
                match self {
                    $( Self::$variant(m) => &m.round_index, )+
                }
            }

            fn request(&self) -> &BigInt {
                match self {
                    $( Self::$variant(m) => &m.request, )+
                }
            }

            fn inventory_len(&self) -> usize {
                match self {
                    $( Self::$variant(m) => m.inventory.len(), )+
                }
            }
        }
    };
}

impl_step_body!(KmdToEthStep { CollectSigs, ProposeTx, Confirm3, Confirm4, Confirm5 });
impl_step_body!(EthToKmdStep { CollectUtxos, ProposeUtxos, CollectInputs, Confirm });
impl_step_body!(StatsToKmdStep { CollectSigs, ProposeTx });

/// A step body framed by its `(major, minor)` tag pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step<S> {
    pub minor: u8,
    pub body: S,
}

impl<S: WireUnion> Step<S> {
    pub fn new(body: S) -> Self {
        Self { minor: 0, body }
    }

    pub fn with_minor(body: S, minor: u8) -> Self {
        Self { minor, body }
    }

    /// 1-based position of the step within its flow.
    pub fn major(&self) -> u8 {
        self.body.discriminant() + 1
    }
}

impl<S: WireUnion> Wire for Step<S> {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        out.put_u8(self.major());
        out.put_u8(self.minor);
        self.body.encode_variant(out)
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        let major = parser.read_u8()?;
        let minor = parser.read_u8()?;
        if major == 0 || usize::from(major) > S::MEMBERS.len() {
            return Err(ProtocolError::UnknownVariant {
                union: S::NAME,
                discriminant: major,
            });
        }
        let body = S::decode_variant(major - 1, parser)?;
        Ok(Self { minor, body })
    }
}

wire_union! {
    /// Top-level round message: one flow, one step.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RoundMessage {
        KmdToEth(Step<KmdToEthStep>) = 0,
        EthToKmd(Step<EthToKmdStep>) = 1,
        StatsToKmd(Step<StatsToKmdStep>) = 2,
    }
}

impl RoundMessage {
    /// `(major, minor)` tag pair of the carried step.
    pub fn step_tags(&self) -> (u8, u8) {
        match self {
            RoundMessage::KmdToEth(step) => (step.major(), step.minor),
            RoundMessage::EthToKmd(step) => (step.major(), step.minor),
            RoundMessage::StatsToKmd(step) => (step.major(), step.minor),
        }
    }

    pub fn step_name(&self) -> &'static str {
        match self {
            RoundMessage::KmdToEth(step) => step.body.variant_name(),
            RoundMessage::EthToKmd(step) => step.body.variant_name(),
            RoundMessage::StatsToKmd(step) => step.body.variant_name(),
        }
    }

    pub fn round_index(&self) -> &BigInt {
        match self {
            RoundMessage::KmdToEth(step) => step.body.round_index(),
            RoundMessage::EthToKmd(step) => step.body.round_index(),
            RoundMessage::StatsToKmd(step) => step.body.round_index(),
        }
    }

    pub fn inventory_len(&self) -> usize {
        match self {
            RoundMessage::KmdToEth(step) => step.body.inventory_len(),
            RoundMessage::EthToKmd(step) => step.body.inventory_len(),
            RoundMessage::StatsToKmd(step) => step.body.inventory_len(),
        }
    }
}

wire_record! {
    /// Outermost round-protocol object. An absent `inner` is a
    /// signature-only acknowledgement.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SignedRoundMessage {
        pub signature: Signature,
        pub inner: Option<RoundMessage>,
    }
}
