//! # zeno-net
//!
//! Peer-to-peer messaging substrate for a notary network: a self-describing
//! binary codec, a TCP reactor that multiplexes many peers into one event
//! queue, and the peer-discovery and round-message protocols on top.
//!
//! ## Layers
//! - **core**: byte cursor, `Wire` codec and stream framing
//! - **protocol**: handshake, node ids, peer control, round messages,
//!   procedure-id envelopes and the handler dispatcher
//! - **transport**: the reactor (listener, inbound readers, per-peer
//!   forwarders)
//! - **service**: seed bootstrap and the monitor node that answers and
//!   refreshes peer lists
//! - **utils**: logging, metrics and timeouts
//!
//! ## Quick Start
//! ```rust,no_run
//! use zeno_net::config::NetworkConfig;
//! use zeno_net::service::node::MonitorNode;
//!
//! # async fn run() -> zeno_net::error::Result<()> {
//! let node = MonitorNode::new(NetworkConfig::default());
//! node.start().await?;
//! while let Some(event) = node.next_event().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
