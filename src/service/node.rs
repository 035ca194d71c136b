//! Monitor node: a reactor that understands envelopes.
//!
//! Incoming payloads are decoded into [`Envelope`]s and routed through a
//! [`Dispatcher`]. The peer-controller procedure is handled here: `GetPeers`
//! is answered with the known peer set, received `Peers` lists are merged.
//! Seeds are asked for their peers on a fixed interval once started.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::NetworkConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::envelope::{Envelope, ProcedureId, PEER_CONTROLLER};
use crate::protocol::peer::{NodeId, PeerControl};
use crate::service::discovery::{self, BootstrapEndpoint};
use crate::transport::reactor::{Event, Reactor};
use crate::utils::metrics::Metrics;

/// A reactor event with its payload decoded.
#[derive(Debug)]
pub enum NodeEvent {
    NewPeer(NodeId),
    DropPeer(NodeId),
    Message {
        from: NodeId,
        envelope: Envelope,
    },
    /// A payload that failed to decode. Never guessed at.
    Invalid {
        from: NodeId,
        payload: Bytes,
        error: ProtocolError,
    },
}

type PeerSet = Arc<RwLock<BTreeSet<NodeId>>>;

pub struct MonitorNode {
    reactor: Reactor,
    dispatcher: Dispatcher,
    known_peers: PeerSet,
    seeds: Vec<NodeId>,
    cancel: CancellationToken,
    refresh: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorNode {
    pub fn new(config: NetworkConfig) -> Self {
        let seeds = config.discovery.seed_ids();
        let node = Self {
            reactor: Reactor::new(config),
            dispatcher: Dispatcher::new(),
            known_peers: Arc::new(RwLock::new(BTreeSet::new())),
            seeds,
            cancel: CancellationToken::new(),
            refresh: Mutex::new(None),
        };
        node.install_peer_controller();
        node
    }

    fn install_peer_controller(&self) {
        let peers = self.known_peers.clone();
        let registered = self.dispatcher.register(PEER_CONTROLLER, move |from, envelope| {
            match envelope {
                Envelope::PeerControl(PeerControl::GetPeers(())) => {
                    let known = peers.read().map_err(|_| ProtocolError::LockPoisoned)?;
                    let reply: BTreeSet<NodeId> =
                        known.iter().filter(|p| *p != from).cloned().collect();
                    debug!(peer = %from, peers = reply.len(), "Answering GetPeers");
                    Ok(Some(Envelope::PeerControl(PeerControl::Peers(reply))))
                }
                Envelope::PeerControl(PeerControl::Peers(list)) => {
                    let mut known = peers.write().map_err(|_| ProtocolError::LockPoisoned)?;
                    let before = known.len();
                    known.extend(list.iter().cloned());
                    debug!(peer = %from, learned = known.len() - before, "Merged peer list");
                    Ok(None)
                }
                Envelope::Round { .. } => Ok(None),
            }
        });
        if let Err(e) = registered {
            warn!(error = %e, "Failed to register peer controller");
        }
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub fn metrics(&self) -> &Metrics {
        self.reactor.metrics()
    }

    pub fn seeds(&self) -> &[NodeId] {
        &self.seeds
    }

    /// Snapshot of the peers this node knows about.
    pub fn peers(&self) -> BTreeSet<NodeId> {
        self.known_peers
            .read()
            .map(|peers| peers.clone())
            .unwrap_or_default()
    }

    pub fn add_peers<I: IntoIterator<Item = NodeId>>(&self, peers: I) {
        if let Ok(mut known) = self.known_peers.write() {
            known.extend(peers);
        }
    }

    /// Route envelopes of `procedure` to `handler`. A returned envelope is
    /// sent back to the originating peer.
    pub fn register_handler<F>(&self, procedure: ProcedureId, handler: F) -> Result<()>
    where
        F: Fn(&NodeId, &Envelope) -> Result<Option<Envelope>> + Send + Sync + 'static,
    {
        self.dispatcher.register(procedure, handler)
    }

    /// Start listening and the periodic seed refresh.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<SocketAddr> {
        let addr = self.reactor.start().await?;

        if !self.seeds.is_empty() {
            let handle = tokio::spawn(run_refresh(
                self.reactor.clone(),
                self.seeds.clone(),
                self.reactor.config().discovery.refresh_interval,
                self.cancel.clone(),
            ));
            let mut slot = self.refresh.lock().map_err(|_| ProtocolError::LockPoisoned)?;
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }

        info!(address = %addr, seeds = self.seeds.len(), "Monitor node started");
        Ok(addr)
    }

    /// Ask the seeds for their peers and wait for a dial-back.
    ///
    /// Before `start` the configured listen port is used; afterwards an
    /// ephemeral port is bound so the running listener is not disturbed.
    pub async fn bootstrap(&self) -> Result<BTreeSet<NodeId>> {
        let config = self.reactor.config();
        let mut endpoint = BootstrapEndpoint::from(&config.node);
        if self.reactor.local_addr().is_some() {
            endpoint.listen_port = 0;
        }
        let peers =
            discovery::bootstrap(&self.seeds, &endpoint, &config.discovery, &config.transport)
                .await?;
        self.add_peers(peers.iter().cloned());
        Ok(peers)
    }

    pub fn send(&self, node: &NodeId, payload: Bytes) -> Result<()> {
        self.reactor.send(node, payload)
    }

    /// Send an already encoded body under `procedure`.
    pub fn send_procedure(&self, node: &NodeId, procedure: ProcedureId, body: &[u8]) -> Result<()> {
        self.reactor.send(node, Envelope::wrap(procedure, body))
    }

    pub fn send_envelope(&self, node: &NodeId, envelope: &Envelope) -> Result<()> {
        self.reactor.send(node, envelope.encode()?)
    }

    pub fn request_peers(&self, node: &NodeId) -> Result<()> {
        self.send_envelope(node, &Envelope::PeerControl(PeerControl::GetPeers(())))
    }

    /// Next decoded event; same blocking rules as [`Reactor::get_event`].
    pub async fn get_event(&self, block: bool, timeout: Option<Duration>) -> Option<NodeEvent> {
        let event = self.reactor.get_event(block, timeout).await?;
        Some(self.process(event))
    }

    pub async fn next_event(&self) -> Option<NodeEvent> {
        self.get_event(true, None).await
    }

    fn process(&self, event: Event) -> NodeEvent {
        match event {
            Event::NewPeer(node) => {
                self.add_peers([node.clone()]);
                NodeEvent::NewPeer(node)
            }
            Event::DropPeer(node) => {
                if let Ok(mut known) = self.known_peers.write() {
                    known.remove(&node);
                }
                NodeEvent::DropPeer(node)
            }
            Event::Message(from, payload) => match Envelope::decode(&payload) {
                Ok(envelope) => {
                    self.route(&from, &envelope);
                    NodeEvent::Message { from, envelope }
                }
                Err(error) => {
                    if error.is_decode_error() {
                        self.reactor.metrics().decode_error();
                    }
                    warn!(peer = %from, error = %error, "{}", constants::ERR_UNDECODABLE_EVENT);
                    NodeEvent::Invalid {
                        from,
                        payload,
                        error,
                    }
                }
            },
        }
    }

    fn route(&self, from: &NodeId, envelope: &Envelope) {
        if !self.dispatcher.handles(&envelope.procedure_id()) {
            return;
        }
        match self.dispatcher.dispatch(from, envelope) {
            Ok(Some(reply)) => {
                if let Err(e) = self.send_envelope(from, &reply) {
                    warn!(peer = %from, error = %e, "Failed to send reply");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(peer = %from, error = %e, "Handler failed"),
        }
    }

    /// Stop the refresh loop and the reactor; returns undelivered events.
    pub async fn shutdown(&self) -> Vec<Event> {
        self.cancel.cancel();
        let refresh = self.refresh.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = refresh {
            let _ = handle.await;
        }
        self.reactor.shutdown().await
    }
}

async fn run_refresh(
    reactor: Reactor,
    seeds: Vec<NodeId>,
    period: Duration,
    cancel: CancellationToken,
) {
    let request = match Envelope::PeerControl(PeerControl::GetPeers(())).encode() {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Failed to encode GetPeers");
            return;
        }
    };
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                for seed in &seeds {
                    match reactor.send(seed, request.clone()) {
                        Ok(()) => debug!(seed = %seed, "Requested peers"),
                        Err(ProtocolError::Shutdown) => return,
                        Err(e) => warn!(seed = %seed, error = %e, "Peer refresh failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> NetworkConfig {
        NetworkConfig::default_with_overrides(|c| {
            c.node.listen_addr = "127.0.0.1".into();
            c.node.listen_port = 0;
        })
    }

    #[tokio::test]
    async fn peers_list_is_merged() {
        let node = MonitorNode::new(test_config());
        let list: BTreeSet<_> = [NodeId::new("10.0.0.1", 1), NodeId::new("10.0.0.2", 2)]
            .into_iter()
            .collect();
        let payload = Envelope::PeerControl(PeerControl::Peers(list.clone()))
            .encode()
            .unwrap();

        let event = node.process(Event::Message(NodeId::new("10.0.0.9", 9), payload));
        assert!(matches!(event, NodeEvent::Message { .. }));
        assert_eq!(node.peers(), list);
    }

    #[tokio::test]
    async fn undersized_payload_is_invalid() {
        let node = MonitorNode::new(test_config());
        let event = node.process(Event::Message(
            NodeId::new("10.0.0.9", 9),
            Bytes::from_static(&[1, 2, 3]),
        ));
        assert!(matches!(
            event,
            NodeEvent::Invalid {
                error: ProtocolError::UndersizedEnvelope(3),
                ..
            }
        ));
        assert_eq!(node.metrics().snapshot().decode_errors, 1);
    }

    #[tokio::test]
    async fn drop_peer_forgets_node() {
        let node = MonitorNode::new(test_config());
        let peer = NodeId::new("10.0.0.3", 3);
        node.process(Event::NewPeer(peer.clone()));
        assert!(node.peers().contains(&peer));
        node.process(Event::DropPeer(peer.clone()));
        assert!(!node.peers().contains(&peer));
    }
}
