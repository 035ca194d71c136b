//! # Utility Modules
//!
//! Supporting utilities for logging, timing and observability.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Timeout**: Timing defaults and async timeout wrappers
//! - **Metrics**: Thread-safe observability counters

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
