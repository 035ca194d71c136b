//! # Service Layer
//!
//! Node behaviour built on the reactor and the protocol codecs.
//!
//! ## Components
//! - **Discovery**: seed bootstrap with dial-back, retry and backoff
//! - **Node**: `MonitorNode`, which decodes envelopes, answers peer requests
//!   and refreshes its peer set from the seeds

pub mod discovery;
pub mod node;

pub use discovery::{bootstrap, decode_peer_list, BootstrapEndpoint};
pub use node::{MonitorNode, NodeEvent};
