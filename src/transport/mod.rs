//! # Transport Layer
//!
//! TCP peer links carrying length-prefixed frames.
//!
//! ## Components
//! - **Reactor**: listener, inbound connection tasks, forwarder registry and
//!   the shared event queue
//! - **Forwarder**: one outbound connection and FIFO queue per destination
//!
//! ## Connection Lifecycle
//! `Connecting -> Open -> Closed`. A closed connection is never reopened; the
//! next send to the same destination opens a new one.

pub mod forwarder;
pub mod reactor;

pub use reactor::{Event, Reactor};
