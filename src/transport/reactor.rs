//! # Reactor
//!
//! Multiplexes every peer link of one node into a single ordered event queue.
//!
//! - Inbound: the listener accepts connections, reads the 3-byte handshake,
//!   emits `NewPeer`, then turns every data frame into a `Message` event and
//!   swallows keepalives. Any failure after the handshake emits `DropPeer`.
//! - Outbound: `send` enqueues onto the destination's forwarder, spawning it
//!   on first use and replacing it after it has died.
//!
//! Ordering is guaranteed per peer only.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::NetworkConfig;
use crate::core::frame::{Frame, FrameCodec};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::Handshake;
use crate::protocol::peer::NodeId;
use crate::transport::forwarder::{self, ForwarderHandle, ForwarderSettings};
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout;

/// Something that happened on a peer link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// An inbound connection completed its handshake.
    NewPeer(NodeId),
    /// An inbound connection that had completed its handshake closed.
    DropPeer(NodeId),
    /// A non-empty payload arrived.
    Message(NodeId, Bytes),
}

impl Event {
    pub fn node(&self) -> &NodeId {
        match self {
            Event::NewPeer(node) | Event::DropPeer(node) | Event::Message(node, _) => node,
        }
    }
}

type Registry = Arc<Mutex<HashMap<NodeId, ForwarderHandle>>>;

/// State shared by the listener and every inbound connection task.
#[derive(Clone)]
struct InboundContext {
    events: mpsc::UnboundedSender<Event>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
    max_frame_size: usize,
    handshake_timeout: Duration,
    nodelay: bool,
}

struct Inner {
    config: NetworkConfig,
    forwarders: Registry,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
    announce_port: AtomicU16,
    local_addr: Mutex<Option<SocketAddr>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    next_forwarder_id: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Connection reactor owning its own forwarder registry and event queue.
///
/// Cloning yields another handle to the same reactor. Spawning operations
/// (`start`, `send`) must run inside a Tokio runtime.
#[derive(Clone)]
pub struct Reactor {
    inner: Arc<Inner>,
}

impl Reactor {
    pub fn new(config: NetworkConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let announce_port = config.node.listen_port;
        Self {
            inner: Arc::new(Inner {
                config,
                forwarders: Arc::new(Mutex::new(HashMap::new())),
                events_tx,
                events_rx: tokio::sync::Mutex::new(events_rx),
                metrics: Arc::new(Metrics::new()),
                shutdown: CancellationToken::new(),
                announce_port: AtomicU16::new(announce_port),
                local_addr: Mutex::new(None),
                listener: Mutex::new(None),
                next_forwarder_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Port announced in outbound handshakes.
    pub fn announce_port(&self) -> u16 {
        self.inner.announce_port.load(Ordering::Relaxed)
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.lock().ok().and_then(|addr| *addr)
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Bind the listener and start accepting peers.
    ///
    /// A configured port of 0 binds an ephemeral port, which then becomes the
    /// announced port.
    #[instrument(skip(self), fields(bind = %self.inner.config.node.bind_address()))]
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.is_shutdown() {
            return Err(ProtocolError::Shutdown);
        }

        let listener = TcpListener::bind(self.inner.config.node.bind_address()).await?;
        let addr = listener.local_addr()?;
        self.inner.announce_port.store(addr.port(), Ordering::Relaxed);

        let ctx = InboundContext {
            events: self.inner.events_tx.clone(),
            metrics: self.inner.metrics.clone(),
            cancel: self.inner.shutdown.clone(),
            max_frame_size: self.inner.config.transport.max_frame_size,
            handshake_timeout: self.inner.config.transport.connect_timeout,
            nodelay: self.inner.config.transport.nodelay,
        };
        let handle = tokio::spawn(run_listener(listener, ctx));

        let mut slot = self
            .inner
            .listener
            .lock()
            .map_err(|_| ProtocolError::LockPoisoned)?;
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
        if let Ok(mut local) = self.inner.local_addr.lock() {
            *local = Some(addr);
        }

        info!(address = %addr, "Reactor listening");
        Ok(addr)
    }

    /// Queue a payload for `node`. Never blocks on the network.
    ///
    /// Delivery is FIFO per destination. A payload in flight when the
    /// connection dies is lost.
    pub fn send(&self, node: &NodeId, payload: Bytes) -> Result<()> {
        if payload.is_empty() {
            return Err(ProtocolError::EmptyPayload);
        }
        if payload.len() > self.inner.config.transport.max_frame_size {
            return Err(ProtocolError::OversizedFrame(payload.len()));
        }
        if self.is_shutdown() {
            return Err(ProtocolError::Shutdown);
        }

        let mut forwarders = self
            .inner
            .forwarders
            .lock()
            .map_err(|_| ProtocolError::LockPoisoned)?;

        let payload = match forwarders.get(node) {
            Some(handle) => match handle.tx.send(payload) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(payload)) => {
                    debug!(peer = %node, "Replacing dead forwarder");
                    forwarders.remove(node);
                    payload
                }
            },
            None => payload,
        };

        let handle = self.spawn_forwarder(node.clone(), payload);
        forwarders.insert(node.clone(), handle);
        Ok(())
    }

    fn spawn_forwarder(&self, node: NodeId, first: Bytes) -> ForwarderHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        // The receiver is alive until the task below drops it.
        let _ = tx.send(first);

        let id = self.inner.next_forwarder_id.fetch_add(1, Ordering::Relaxed);
        let settings = ForwarderSettings {
            announce_port: self.announce_port(),
            keepalive_interval: self.inner.config.node.keepalive_interval,
            connect_timeout: self.inner.config.transport.connect_timeout,
            max_frame_size: self.inner.config.transport.max_frame_size,
            nodelay: self.inner.config.transport.nodelay,
        };
        let registry = self.inner.forwarders.clone();
        let metrics = self.inner.metrics.clone();
        let cancel = self.inner.shutdown.child_token();

        metrics.forwarder_spawned();
        tokio::spawn(async move {
            if let Err(e) = forwarder::run(&node, &settings, &mut rx, &metrics, &cancel).await {
                metrics.forwarder_failed();
                warn!(peer = %node, error = %e, "{}", constants::ERR_FORWARDER_DIED);
            }
            drop(rx);
            if let Ok(mut forwarders) = registry.lock() {
                if forwarders.get(&node).map(|h| h.id) == Some(id) {
                    forwarders.remove(&node);
                }
            }
        });

        ForwarderHandle::new(id, tx)
    }

    pub fn forwarder_count(&self) -> usize {
        self.inner
            .forwarders
            .lock()
            .map(|forwarders| forwarders.len())
            .unwrap_or(0)
    }

    pub fn has_forwarder(&self, node: &NodeId) -> bool {
        self.inner
            .forwarders
            .lock()
            .map(|forwarders| forwarders.contains_key(node))
            .unwrap_or(false)
    }

    /// Destinations with a registered forwarder.
    pub fn destinations(&self) -> Vec<NodeId> {
        self.inner
            .forwarders
            .lock()
            .map(|forwarders| forwarders.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Take the next event.
    ///
    /// With `block == false` only an already queued event is returned, and
    /// nothing while another caller is waiting on the queue. When blocking,
    /// `timeout` bounds the whole wait; `None` waits until an event arrives or
    /// the reactor shuts down. After shutdown the queue is owned by
    /// [`Reactor::shutdown`] and this always returns `None`.
    pub async fn get_event(&self, block: bool, timeout: Option<Duration>) -> Option<Event> {
        if self.is_shutdown() {
            return None;
        }
        if !block {
            return self.try_event();
        }

        // Waiting for the queue lock counts against `timeout` too.
        let wait = async {
            tokio::select! {
                biased;
                event = async { self.inner.events_rx.lock().await.recv().await } => event,
                _ = self.inner.shutdown.cancelled() => None,
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.ok().flatten(),
            None => wait.await,
        }
    }

    pub async fn next_event(&self) -> Option<Event> {
        self.get_event(true, None).await
    }

    /// Non-blocking poll; also returns `None` while another caller is waiting.
    pub fn try_event(&self) -> Option<Event> {
        if self.is_shutdown() {
            return None;
        }
        self.inner
            .events_rx
            .try_lock()
            .ok()
            .and_then(|mut rx| rx.try_recv().ok())
    }

    /// Stop the listener, cancel every connection and forwarder, and return
    /// the events that were still queued.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Vec<Event> {
        self.inner.shutdown.cancel();

        if let Ok(mut forwarders) = self.inner.forwarders.lock() {
            forwarders.clear();
        }

        let listener = self
            .inner
            .listener
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = listener {
            let limit = self.inner.config.node.shutdown_timeout;
            if tokio::time::timeout(limit, handle).await.is_err() {
                warn!(timeout_ms = limit.as_millis() as u64, "Listener did not stop in time");
            }
        }

        let mut drained = Vec::new();
        let mut rx = self.inner.events_rx.lock().await;
        while let Ok(event) = rx.try_recv() {
            drained.push(event);
        }

        self.inner.metrics.log_metrics();
        info!(drained = drained.len(), "Reactor shut down");
        drained
    }
}

async fn run_listener(listener: TcpListener, ctx: InboundContext) {
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                debug!("Listener stopping");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    tokio::spawn(handle_inbound(stream, remote, ctx.clone()));
                }
                Err(e) => {
                    error!(error = %e, "Error accepting connection");
                }
            }
        }
    }
}

#[instrument(skip_all, fields(remote = %remote))]
async fn handle_inbound(mut stream: TcpStream, remote: SocketAddr, ctx: InboundContext) {
    ctx.metrics.connection_established();
    if let Err(e) = stream.set_nodelay(ctx.nodelay) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    let handshake = tokio::select! {
        _ = ctx.cancel.cancelled() => {
            ctx.metrics.connection_closed();
            return;
        }
        result = with_timeout(ctx.handshake_timeout, Handshake::read_from(&mut stream)) => result,
    };
    let node = match handshake {
        Ok(handshake) => NodeId::from_remote(remote, handshake.port),
        Err(e) => {
            ctx.metrics.handshake_failed();
            warn!(error = %e, "Rejecting connection");
            ctx.metrics.connection_closed();
            return;
        }
    };

    info!(peer = %node, "New peer");
    let _ = ctx.events.send(Event::NewPeer(node.clone()));

    let mut frames = FramedRead::new(stream, FrameCodec::new(ctx.max_frame_size));
    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                ctx.metrics.connection_closed();
                return;
            }
            frame = frames.next() => match frame {
                Some(Ok(Frame::Data(payload))) => {
                    ctx.metrics.message_received(payload.len() as u64);
                    let _ = ctx.events.send(Event::Message(node.clone(), payload));
                }
                Some(Ok(Frame::Keepalive)) => {
                    ctx.metrics.keepalive_received();
                }
                Some(Err(e)) => {
                    warn!(peer = %node, error = %e, "{}", constants::ERR_CONNECTION_DROPPED);
                    break;
                }
                None => {
                    debug!(peer = %node, "Peer closed connection");
                    break;
                }
            }
        }
    }

    let _ = ctx.events.send(Event::DropPeer(node));
    ctx.metrics.connection_closed();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> NetworkConfig {
        NetworkConfig::default_with_overrides(|c| {
            c.node.listen_addr = "127.0.0.1".into();
            c.node.listen_port = 0;
        })
    }

    #[tokio::test]
    async fn send_rejects_empty_payload() {
        let reactor = Reactor::new(loopback_config());
        let result = reactor.send(&NodeId::new("127.0.0.1", 1), Bytes::new());
        assert!(matches!(result, Err(ProtocolError::EmptyPayload)));
        assert_eq!(reactor.forwarder_count(), 0);
    }

    #[tokio::test]
    async fn send_after_shutdown_fails() {
        let reactor = Reactor::new(loopback_config());
        reactor.shutdown().await;
        let result = reactor.send(&NodeId::new("127.0.0.1", 1), Bytes::from_static(b"x"));
        assert!(matches!(result, Err(ProtocolError::Shutdown)));
    }

    #[tokio::test]
    async fn start_announces_bound_port() {
        let reactor = Reactor::new(loopback_config());
        let addr = reactor.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(reactor.announce_port(), addr.port());
        assert_eq!(reactor.local_addr(), Some(addr));
        reactor.shutdown().await;
    }

    #[tokio::test]
    async fn non_blocking_get_on_empty_queue() {
        let reactor = Reactor::new(loopback_config());
        assert!(reactor.get_event(false, None).await.is_none());
        assert!(reactor
            .get_event(true, Some(Duration::from_millis(20)))
            .await
            .is_none());
        assert!(reactor.try_event().is_none());
    }

    #[tokio::test]
    async fn waiting_consumer_does_not_stall_others() {
        let reactor = Reactor::new(loopback_config());
        let waiter = {
            let reactor = reactor.clone();
            tokio::spawn(async move { reactor.get_event(true, None).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let polled =
            tokio::time::timeout(Duration::from_millis(500), reactor.get_event(false, None)).await;
        assert!(matches!(polled, Ok(None)));

        let bounded = tokio::time::timeout(
            Duration::from_millis(500),
            reactor.get_event(true, Some(Duration::from_millis(20))),
        )
        .await;
        assert!(matches!(bounded, Ok(None)));

        reactor.shutdown().await;
        assert!(waiter.await.unwrap().is_none());
    }
}
