//! Delivery Metrics
//!
//! Counters describing what happened to submitted alerts. Each dispatcher
//! owns its own [`Metrics`], so isolated pools report isolated numbers.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::FailureKind;

/// Metrics collector for one dispatcher
#[derive(Debug)]
pub struct Metrics {
    /// Alerts handed to `submit`
    pub submitted: AtomicU64,
    /// Alerts accepted into the queue
    pub queued: AtomicU64,
    /// Alerts dropped because the queue was full
    pub rejected: AtomicU64,
    /// Rejected alerts parked in the redelivery buffer
    pub buffered: AtomicU64,
    /// Buffered alerts moved back into the queue
    pub redelivered: AtomicU64,
    /// Alerts whose packet was fully written
    pub delivered: AtomicU64,
    /// Total packet bytes written
    pub bytes_sent: AtomicU64,
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// TCP connect attempts, successful or not
    pub connect_attempts: AtomicU64,
    /// Sends abandoned after exhausting connection attempts
    pub connect_failures: AtomicU64,
    /// Sends abandoned while reading the server greeting
    pub handshake_failures: AtomicU64,
    /// Sends abandoned while writing the packet
    pub send_failures: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            buffered: AtomicU64::new(0),
            redelivered: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            handshake_failures: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn alert_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_buffered(&self) {
        self.buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_redelivered(&self) {
        self.redelivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed packet write
    pub fn alert_delivered(&self, byte_count: u64) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one connect attempt
    pub fn connect_attempted(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record an abandoned send by failure kind
    pub fn delivery_failed(&self, kind: FailureKind) {
        let counter = match kind {
            FailureKind::Connection => &self.connect_failures,
            FailureKind::Handshake => &self.handshake_failures,
            FailureKind::QueueRejected => &self.rejected,
            FailureKind::Send | FailureKind::InvalidConfiguration | FailureKind::Internal => {
                &self.send_failures
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            submitted = snapshot.submitted,
            queued = snapshot.queued,
            rejected = snapshot.rejected,
            buffered = snapshot.buffered,
            redelivered = snapshot.redelivered,
            delivered = snapshot.delivered,
            bytes_sent = snapshot.bytes_sent,
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connect_attempts = snapshot.connect_attempts,
            connect_failures = snapshot.connect_failures,
            handshake_failures = snapshot.handshake_failures,
            send_failures = snapshot.send_failures,
            uptime_seconds = snapshot.uptime_seconds,
            "Delivery metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub queued: u64,
    pub rejected: u64,
    pub buffered: u64,
    pub redelivered: u64,
    pub delivered: u64,
    pub bytes_sent: u64,
    pub connections_total: u64,
    pub connections_active: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub handshake_failures: u64,
    pub send_failures: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Sends that ended without a full packet write
    pub fn abandoned(&self) -> u64 {
        self.connect_failures + self.handshake_failures + self.send_failures
    }
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
