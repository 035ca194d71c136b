//! Per-destination outbound delivery.
//!
//! A forwarder owns one TCP connection and one FIFO queue. It writes the
//! handshake once, then drains the queue as data frames and fills idle
//! intervals with keepalives. Any I/O failure ends the forwarder; the reactor
//! creates a fresh one on the next send to the same destination.

use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::core::frame::{Frame, FrameCodec};
use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::Handshake;
use crate::protocol::peer::NodeId;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout;

/// Registry entry for a live forwarder.
#[derive(Debug, Clone)]
pub struct ForwarderHandle {
    pub(crate) id: u64,
    pub(crate) tx: mpsc::UnboundedSender<Bytes>,
}

impl ForwarderHandle {
    pub(crate) fn new(id: u64, tx: mpsc::UnboundedSender<Bytes>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the forwarder task has dropped its queue.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Connection parameters shared by every forwarder of one reactor.
#[derive(Debug, Clone)]
pub struct ForwarderSettings {
    /// Port written into the outbound handshake
    pub announce_port: u16,
    pub keepalive_interval: Duration,
    pub connect_timeout: Duration,
    pub max_frame_size: usize,
    pub nodelay: bool,
}

/// Drive one forwarder until its queue closes, shutdown is requested, or the
/// connection fails.
#[instrument(skip_all, fields(peer = %dest))]
pub async fn run(
    dest: &NodeId,
    settings: &ForwarderSettings,
    rx: &mut mpsc::UnboundedReceiver<Bytes>,
    metrics: &Metrics,
    cancel: &CancellationToken,
) -> Result<()> {
    let connect = async {
        TcpStream::connect((dest.address.as_str(), dest.port))
            .await
            .map_err(ProtocolError::from)
    };
    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        stream = with_timeout(settings.connect_timeout, connect) => stream?,
    };
    stream.set_nodelay(settings.nodelay)?;

    Handshake::new(settings.announce_port)
        .write_to(&mut stream)
        .await?;
    debug!(announce_port = settings.announce_port, "Forwarder connected");

    let (mut reader, writer) = stream.into_split();
    let mut framed = FramedWrite::new(writer, FrameCodec::new(settings.max_frame_size));
    // Peers never write on a connection they accepted; reading only detects closure.
    let mut probe = [0u8; 64];

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            read = reader.read(&mut probe) => match read {
                Ok(0) => return Err(ProtocolError::ConnectionClosed),
                Ok(n) => debug!(bytes = n, "Discarding unexpected inbound bytes"),
                Err(e) => return Err(e.into()),
            },
            next = tokio::time::timeout(settings.keepalive_interval, rx.recv()) => match next {
                Ok(Some(payload)) => {
                    let len = payload.len() as u64;
                    framed.send(Frame::Data(payload)).await?;
                    metrics.message_sent(len);
                }
                Ok(None) => return Ok(()),
                Err(_) => {
                    framed.send(Frame::Keepalive).await?;
                    metrics.keepalive_sent();
                }
            },
        }
    }
}
