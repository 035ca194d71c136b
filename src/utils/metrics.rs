//! Observability and Metrics
//!
//! Per-reactor counters for connection, framing and forwarder activity.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector owned by one reactor instance
#[derive(Debug)]
pub struct Metrics {
    /// Total inbound connections accepted
    pub connections_total: AtomicU64,
    /// Currently open inbound connections
    pub connections_active: AtomicU64,
    /// Inbound handshakes rejected for a bad marker or short read
    pub handshakes_failed: AtomicU64,
    /// Data frames received
    pub messages_received: AtomicU64,
    /// Data frames written by forwarders
    pub messages_sent: AtomicU64,
    /// Keepalive frames received
    pub keepalives_received: AtomicU64,
    /// Keepalive frames written by forwarders
    pub keepalives_sent: AtomicU64,
    /// Payload bytes received
    pub bytes_received: AtomicU64,
    /// Payload bytes sent
    pub bytes_sent: AtomicU64,
    /// Forwarders created
    pub forwarders_spawned: AtomicU64,
    /// Forwarders that terminated on an I/O error
    pub forwarders_failed: AtomicU64,
    /// Payloads that failed envelope decoding
    pub decode_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            keepalives_received: AtomicU64::new(0),
            keepalives_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            forwarders_spawned: AtomicU64::new(0),
            forwarders_failed: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn keepalive_received(&self) {
        self.keepalives_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn keepalive_sent(&self) {
        self.keepalives_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forwarder_spawned(&self) {
        self.forwarders_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forwarder_failed(&self) {
        self.forwarders_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            keepalives_received: self.keepalives_received.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            forwarders_spawned: self.forwarders_spawned.load(Ordering::Relaxed),
            forwarders_failed: self.forwarders_failed.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            handshakes_failed = snapshot.handshakes_failed,
            messages_received = snapshot.messages_received,
            messages_sent = snapshot.messages_sent,
            keepalives_received = snapshot.keepalives_received,
            keepalives_sent = snapshot.keepalives_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            forwarders_spawned = snapshot.forwarders_spawned,
            forwarders_failed = snapshot.forwarders_failed,
            decode_errors = snapshot.decode_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Reactor metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub handshakes_failed: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub keepalives_received: u64,
    pub keepalives_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub forwarders_spawned: u64,
    pub forwarders_failed: u64,
    pub decode_errors: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
