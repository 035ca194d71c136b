//! Seed bootstrap.
//!
//! The node binds its advertised port, dials a seed, sends `GetPeers` and
//! waits for the seed to dial back with a `Peers` list. Only connections from
//! the seed's own addresses are accepted on the bootstrap listener.
//!
//! Unreachable seeds are retried with exponential backoff and jitter; the
//! bootstrap fails only once every attempt against every seed has failed.

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, instrument, warn};

use crate::config::{DiscoveryConfig, NodeConfig, TransportConfig};
use crate::core::frame::{Frame, FrameCodec};
use crate::error::{ProtocolError, Result};
use crate::protocol::envelope::Envelope;
use crate::protocol::handshake::Handshake;
use crate::protocol::peer::{NodeId, PeerControl};
use crate::utils::metrics::Timer;
use crate::utils::timeout::with_timeout;

/// Extract a peer list from a raw message payload.
///
/// Returns `Ok(None)` for well-formed payloads that are not a `Peers` reply,
/// so callers can keep reading.
pub fn decode_peer_list(payload: &[u8]) -> Result<Option<BTreeSet<NodeId>>> {
    let (procedure, _) = Envelope::split(payload)?;
    if !procedure.is_peer_controller() {
        return Ok(None);
    }
    match Envelope::decode(payload)? {
        Envelope::PeerControl(PeerControl::Peers(peers)) => Ok(Some(peers)),
        _ => Ok(None),
    }
}

/// Where the bootstrap listener binds and which port the handshake announces.
#[derive(Debug, Clone)]
pub struct BootstrapEndpoint {
    pub listen_addr: String,
    pub listen_port: u16,
}

impl BootstrapEndpoint {
    pub fn new(listen_addr: impl Into<String>, listen_port: u16) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            listen_port,
        }
    }

    fn bind_address(&self) -> String {
        if self.listen_addr.contains(':') {
            format!("[{}]:{}", self.listen_addr, self.listen_port)
        } else {
            format!("{}:{}", self.listen_addr, self.listen_port)
        }
    }
}

impl From<&NodeConfig> for BootstrapEndpoint {
    fn from(node: &NodeConfig) -> Self {
        Self::new(node.listen_addr.clone(), node.listen_port)
    }
}

/// Learn the initial peer set from the first seed that answers.
#[instrument(skip_all, fields(seeds = seeds.len()))]
pub async fn bootstrap(
    seeds: &[NodeId],
    endpoint: &BootstrapEndpoint,
    discovery: &DiscoveryConfig,
    transport: &TransportConfig,
) -> Result<BTreeSet<NodeId>> {
    if seeds.is_empty() {
        return Err(ProtocolError::Discovery("no seeds configured".into()));
    }
    let _timer = Timer::start("discovery_bootstrap");

    let mut backoff = discovery.initial_backoff;
    let mut last_error = None;

    for attempt in 1..=discovery.max_attempts {
        for seed in seeds {
            let result = with_timeout(
                discovery.attempt_timeout,
                request_peers(seed, endpoint, transport),
            )
            .await;
            match result {
                Ok(peers) => {
                    info!(seed = %seed, peers = peers.len(), attempt, "Bootstrap complete");
                    return Ok(peers);
                }
                Err(e) => {
                    warn!(seed = %seed, attempt, error = %e, "Bootstrap attempt failed");
                    last_error = Some(e);
                }
            }
        }

        if attempt < discovery.max_attempts {
            let delay = with_jitter(backoff);
            debug!(delay_ms = delay.as_millis() as u64, "Backing off before next round");
            tokio::time::sleep(delay).await;
            backoff = (backoff * 2).min(discovery.max_backoff);
        }
    }

    Err(ProtocolError::Discovery(format!(
        "all {} attempts failed: {}",
        discovery.max_attempts,
        last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
    )))
}

fn with_jitter(base: Duration) -> Duration {
    let spread = (base.as_millis() as u64) / 2;
    if spread == 0 {
        return base;
    }
    base + Duration::from_millis(rand::rng().random_range(0..=spread))
}

/// One request/dial-back exchange with a single seed.
#[instrument(skip_all, fields(seed = %seed))]
async fn request_peers(
    seed: &NodeId,
    endpoint: &BootstrapEndpoint,
    transport: &TransportConfig,
) -> Result<BTreeSet<NodeId>> {
    let seed_ips: HashSet<IpAddr> = lookup_host((seed.address.as_str(), seed.port))
        .await?
        .map(|addr| addr.ip().to_canonical())
        .collect();
    if seed_ips.is_empty() {
        return Err(ProtocolError::Discovery(format!("seed {seed} did not resolve")));
    }

    // Bound before the request goes out so the dial-back cannot arrive first.
    let listener = TcpListener::bind(endpoint.bind_address()).await?;
    let announce_port = listener.local_addr()?.port();

    let connect = async {
        TcpStream::connect((seed.address.as_str(), seed.port))
            .await
            .map_err(ProtocolError::from)
    };
    let mut outbound = with_timeout(transport.connect_timeout, connect).await?;
    Handshake::new(announce_port).write_to(&mut outbound).await?;

    let mut framed = FramedWrite::new(outbound, FrameCodec::new(transport.max_frame_size));
    let request = Envelope::PeerControl(PeerControl::GetPeers(())).encode()?;
    framed.send(Frame::Data(request)).await?;
    framed.send(Frame::Keepalive).await?;
    debug!(announce_port, "GetPeers sent, waiting for dial-back");

    loop {
        let (mut stream, remote) = listener.accept().await?;
        if !seed_ips.contains(&remote.ip().to_canonical()) {
            warn!(remote = %remote, "Rejecting bootstrap connection from non-seed address");
            continue;
        }

        if let Err(e) = Handshake::read_from(&mut stream).await {
            warn!(remote = %remote, error = %e, "Seed dial-back handshake failed");
            continue;
        }

        let mut frames = FramedRead::new(stream, FrameCodec::new(transport.max_frame_size));
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(Frame::Data(payload)) => match decode_peer_list(&payload) {
                    Ok(Some(peers)) => return Ok(peers),
                    Ok(None) => debug!("Ignoring non peer-list message during bootstrap"),
                    Err(e) => warn!(error = %e, "Undecodable message during bootstrap"),
                },
                Ok(Frame::Keepalive) => {}
                Err(e) => {
                    warn!(remote = %remote, error = %e, "Seed dial-back failed");
                    break;
                }
            }
        }
    }
}
