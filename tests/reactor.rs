//! Reactor integration tests over loopback sockets

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use zeno_net::config::NetworkConfig;
use zeno_net::protocol::peer::NodeId;
use zeno_net::transport::{Event, Reactor};

const WAIT: Option<Duration> = Some(Duration::from_secs(2));

fn loopback_config() -> NetworkConfig {
    NetworkConfig::default_with_overrides(|c| {
        c.node.listen_addr = "127.0.0.1".into();
        c.node.listen_port = 0;
        c.node.keepalive_interval = Duration::from_millis(50);
    })
}

async fn started_reactor() -> (Reactor, std::net::SocketAddr) {
    let reactor = Reactor::new(loopback_config());
    let addr = reactor.start().await.expect("Reactor should start");
    (reactor, addr)
}

#[tokio::test]
async fn test_handshake_then_keepalive_yields_only_new_peer() {
    let (reactor, addr) = started_reactor().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&[0x00, 0x1e, 0x61]).await.unwrap();
    client.write_all(&[0, 0, 0, 0]).await.unwrap();

    let event = reactor.get_event(true, WAIT).await.expect("NewPeer expected");
    assert_eq!(event, Event::NewPeer(NodeId::new("127.0.0.1", 7777)));

    let next = reactor
        .get_event(true, Some(Duration::from_millis(200)))
        .await;
    assert!(next.is_none(), "Keepalive must not surface: {next:?}");
    assert_eq!(reactor.metrics().snapshot().keepalives_received, 1);

    reactor.shutdown().await;
}

#[tokio::test]
async fn test_bad_marker_is_rejected_without_new_peer() {
    let (reactor, addr) = started_reactor().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&[0x01, 0x1e, 0x61]).await.unwrap();

    // The reactor closes the socket; the read sees EOF or a reset.
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("Connection should be closed");
    assert!(matches!(read, Ok(0) | Err(_)));

    let event = reactor
        .get_event(true, Some(Duration::from_millis(200)))
        .await;
    assert!(event.is_none(), "No event expected, got {event:?}");
    assert_eq!(reactor.metrics().snapshot().handshakes_failed, 1);

    reactor.shutdown().await;
}

#[tokio::test]
async fn test_messages_and_drop_peer() {
    let (reactor, addr) = started_reactor().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&[0x00, 0x9d, 0xf8]).await.unwrap();
    client.write_all(&[0, 0, 0, 2, b'h', b'i']).await.unwrap();
    client.write_all(&[0, 0, 0, 0]).await.unwrap();
    client.write_all(&[0, 0, 0, 1, b'!']).await.unwrap();

    let peer = NodeId::new("127.0.0.1", 40440);
    assert_eq!(
        reactor.get_event(true, WAIT).await,
        Some(Event::NewPeer(peer.clone()))
    );
    assert_eq!(
        reactor.get_event(true, WAIT).await,
        Some(Event::Message(peer.clone(), Bytes::from_static(b"hi")))
    );
    assert_eq!(
        reactor.get_event(true, WAIT).await,
        Some(Event::Message(peer.clone(), Bytes::from_static(b"!")))
    );

    drop(client);
    assert_eq!(reactor.get_event(true, WAIT).await, Some(Event::DropPeer(peer)));

    reactor.shutdown().await;
}

#[tokio::test]
async fn test_two_reactors_exchange_messages() {
    let (receiver, addr) = started_reactor().await;
    let (sender, sender_addr) = started_reactor().await;

    let dest = NodeId::new("127.0.0.1", addr.port());
    sender.send(&dest, Bytes::from_static(b"first")).unwrap();
    sender.send(&dest, Bytes::from_static(b"second")).unwrap();
    assert_eq!(sender.forwarder_count(), 1);

    let expected_peer = NodeId::new("127.0.0.1", sender_addr.port());
    assert_eq!(
        receiver.get_event(true, WAIT).await,
        Some(Event::NewPeer(expected_peer.clone()))
    );
    assert_eq!(
        receiver.get_event(true, WAIT).await,
        Some(Event::Message(expected_peer.clone(), Bytes::from_static(b"first")))
    );
    assert_eq!(
        receiver.get_event(true, WAIT).await,
        Some(Event::Message(expected_peer, Bytes::from_static(b"second")))
    );

    sender.shutdown().await;
    receiver.shutdown().await;
}

#[tokio::test]
async fn test_forwarder_writes_handshake_frames_and_keepalives() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dest = NodeId::new("127.0.0.1", listener.local_addr().unwrap().port());

    let reactor = Reactor::new(NetworkConfig::default_with_overrides(|c| {
        c.node.listen_port = 4321;
        c.node.keepalive_interval = Duration::from_millis(50);
    }));
    reactor.send(&dest, Bytes::from_static(b"abc")).unwrap();

    let (mut conn, _) = listener.accept().await.unwrap();
    let mut buf = [0u8; 14];
    tokio::time::timeout(Duration::from_secs(2), conn.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(&buf[..3], &[0x00, 0x10, 0xe1]);
    assert_eq!(&buf[3..10], &[0, 0, 0, 3, b'a', b'b', b'c']);
    // Nothing else queued, so the idle interval produces a keepalive.
    assert_eq!(&buf[10..], &[0, 0, 0, 0]);

    reactor.shutdown().await;
}

#[tokio::test]
async fn test_dead_forwarder_is_replaced_on_next_send() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dest = NodeId::new("127.0.0.1", listener.local_addr().unwrap().port());

    let reactor = Reactor::new(loopback_config());
    reactor.send(&dest, Bytes::from_static(b"one")).unwrap();

    // First connection: read the handshake and frame, then hang up.
    let (mut first, _) = listener.accept().await.unwrap();
    let mut buf = [0u8; 10];
    first.read_exact(&mut buf).await.unwrap();
    drop(first);

    // The forwarder notices the closed link and unregisters itself.
    tokio::time::timeout(Duration::from_secs(2), async {
        while reactor.has_forwarder(&dest) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Forwarder should terminate after the peer hangs up");
    assert_eq!(reactor.metrics().snapshot().forwarders_failed, 1);

    reactor.send(&dest, Bytes::from_static(b"two")).unwrap();
    let (mut second, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("A new connection attempt is expected")
        .unwrap();
    second.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf[3..], &[0, 0, 0, 3, b't', b'w', b'o']);
    assert_eq!(reactor.metrics().snapshot().forwarders_spawned, 2);

    reactor.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_destination_drops_forwarder() {
    // Bind then drop to get a port with nothing listening.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let dest = NodeId::new("127.0.0.1", port);

    let reactor = Reactor::new(loopback_config());
    reactor.send(&dest, Bytes::from_static(b"lost")).unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while reactor.has_forwarder(&dest) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Forwarder should give up on a refused connection");

    reactor.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drains_queued_events() {
    let (reactor, addr) = started_reactor().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&[0x00, 0x00, 0x01]).await.unwrap();
    client.write_all(&[0, 0, 0, 1, 7]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let drained = reactor.shutdown().await;
    let peer = NodeId::new("127.0.0.1", 1);
    assert!(drained.contains(&Event::NewPeer(peer.clone())));
    assert!(drained.contains(&Event::Message(peer, Bytes::from_static(&[7]))));
    assert!(reactor.next_event().await.is_none());
}
