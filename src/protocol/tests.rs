// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::codec::encode_to_bytes;
use crate::error::ProtocolError;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::envelope::{Envelope, ProcedureId, PEER_CONTROLLER};
use crate::protocol::handshake::Handshake;
use crate::protocol::peer::{NodeId, PeerControl};
use crate::protocol::round::{
    KmdToEthStep, RoundMessage, SignedRoundMessage, Step, StepMessage,
};

fn round_procedure() -> ProcedureId {
    "00112233445566778899aabbccddeeff".parse().unwrap()
}

#[test]
fn test_handshake_layout() {
    let bytes = Handshake::new(7777).to_bytes();
    assert_eq!(bytes, [0x00, 0x1e, 0x61]);
    assert_eq!(Handshake::from_bytes(bytes).unwrap().port, 7777);
}

#[test]
fn test_handshake_bad_marker() {
    let result = Handshake::from_bytes([0x01, 0x1e, 0x61]);
    assert!(matches!(result, Err(ProtocolError::InvalidHandshake(1))));
}

#[tokio::test]
async fn test_handshake_over_stream() {
    let (mut a, mut b) = tokio::io::duplex(16);
    Handshake::new(40440).write_to(&mut a).await.unwrap();
    let read = Handshake::read_from(&mut b).await.unwrap();
    assert_eq!(read.port, 40440);
}

#[test]
fn test_peer_controller_id_text() {
    assert_eq!(PEER_CONTROLLER.to_string(), "e4dfbbb9aeaff2c844181d5f031f2cac");
    let parsed: ProcedureId = "e4dfbbb9aeaff2c844181d5f031f2cac".parse().unwrap();
    assert!(parsed.is_peer_controller());
}

#[test]
fn test_get_peers_envelope_bytes() {
    let bytes = Envelope::PeerControl(PeerControl::GetPeers(()))
        .encode()
        .unwrap();
    let mut expected = PEER_CONTROLLER.as_bytes().to_vec();
    expected.push(0);
    assert_eq!(&bytes[..], &expected[..]);
}

#[test]
fn test_undersized_envelope() {
    let result = Envelope::decode(&[0xe4, 0xdf, 0xbb]);
    assert!(matches!(result, Err(ProtocolError::UndersizedEnvelope(3))));
}

#[test]
fn test_round_envelope_demux() {
    let message = SignedRoundMessage {
        signature: [7; 65],
        inner: Some(RoundMessage::KmdToEth(Step::new(KmdToEthStep::Confirm3(
            StepMessage::new(12u64, 3u64),
        )))),
    };
    let envelope = Envelope::Round {
        procedure: round_procedure(),
        message: message.clone(),
    };
    let bytes = envelope.encode().unwrap();
    match Envelope::decode(&bytes).unwrap() {
        Envelope::Round { procedure, message: decoded } => {
            assert_eq!(procedure, round_procedure());
            assert_eq!(decoded, message);
        }
        other => panic!("Expected round envelope, got {other:?}"),
    }
}

#[test]
fn test_unknown_major_in_round_envelope() {
    let mut payload = round_procedure().as_bytes().to_vec();
    payload.extend_from_slice(&[0x55; 65]);
    payload.push(1); // inner present
    payload.push(0); // KmdToEth flow
    payload.push(0x09); // no ninth step
    payload.push(0);
    payload.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

    let result = Envelope::decode(&payload);
    assert!(matches!(
        result,
        Err(ProtocolError::UnknownVariant {
            discriminant: 9,
            ..
        })
    ));
}

#[test]
fn test_round_message_cannot_claim_peer_controller_id() {
    let envelope = Envelope::Round {
        procedure: PEER_CONTROLLER,
        message: SignedRoundMessage {
            signature: [0; 65],
            inner: None,
        },
    };
    assert!(envelope.encode().is_err());
}

#[test]
fn test_dispatcher_routes_by_procedure() {
    let dispatcher = Dispatcher::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    dispatcher
        .register(PEER_CONTROLLER, move |_, envelope| {
            counter.fetch_add(1, Ordering::SeqCst);
            match envelope {
                Envelope::PeerControl(PeerControl::GetPeers(())) => Ok(Some(
                    Envelope::PeerControl(PeerControl::Peers(BTreeSet::new())),
                )),
                _ => Ok(None),
            }
        })
        .unwrap();

    let from = NodeId::new("127.0.0.1", 1);
    let reply = dispatcher
        .dispatch(&from, &Envelope::PeerControl(PeerControl::GetPeers(())))
        .unwrap();
    assert!(matches!(
        reply,
        Some(Envelope::PeerControl(PeerControl::Peers(_)))
    ));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(dispatcher.handles(&PEER_CONTROLLER));
    assert!(!dispatcher.handles(&round_procedure()));
}

#[test]
fn test_dispatcher_unhandled_procedure() {
    let dispatcher = Dispatcher::new();
    let envelope = Envelope::Round {
        procedure: round_procedure(),
        message: SignedRoundMessage {
            signature: [0; 65],
            inner: None,
        },
    };
    let result = dispatcher.dispatch(&NodeId::new("10.0.0.1", 2), &envelope);
    assert!(matches!(result, Err(ProtocolError::UnexpectedMessage(_))));
}

#[test]
fn test_peer_list_body_matches_manual_layout() {
    let peers: BTreeSet<_> = [NodeId::new("127.0.0.1", 40440)].into_iter().collect();
    let body = encode_to_bytes(&PeerControl::Peers(peers)).unwrap();

    let mut expected = vec![1];
    expected.extend_from_slice(&1u64.to_be_bytes());
    expected.extend_from_slice(&9u64.to_be_bytes());
    expected.extend_from_slice(b"127.0.0.1");
    expected.extend_from_slice(&40440u16.to_be_bytes());
    assert_eq!(&body[..], &expected[..]);
}
