//! Relay metrics for observability
//!
//! Lock-free counters updated from the connection tasks, exposed as a
//! serializable snapshot on `/metrics`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Peer metrics
    /// Currently admitted peers
    pub active_peers: AtomicU64,
    /// Total admissions since start
    pub total_admitted: AtomicU64,
    /// Admissions refused (missing or duplicate identity)
    pub admissions_rejected: AtomicU64,
    /// Upgrade handshakes that failed before admission
    pub upgrade_failures: AtomicU64,

    // Message metrics
    /// Signaling frames read from peers
    pub messages_received: AtomicU64,
    /// Signaling messages written to their target
    pub messages_forwarded: AtomicU64,
    /// Messages dropped for missing or unknown targets
    pub messages_dropped: AtomicU64,
    /// Presence events written
    pub presence_sent: AtomicU64,

    // Error metrics
    pub decode_failures: AtomicU64,
    pub delivery_failures: AtomicU64,
    pub liveness_failures: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn peer_admitted(&self) {
        self.active_peers.fetch_add(1, Ordering::Relaxed);
        self.total_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_departed(&self) {
        self.active_peers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn admission_rejected(&self) {
        self.admissions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upgrade_failed(&self) {
        self.upgrade_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_forwarded(&self) {
        self.messages_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn presence_sent(&self) {
        self.presence_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivery_failed(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn liveness_failed(&self) {
        self.liveness_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            peers: PeerMetrics {
                active: self.active_peers.load(Ordering::Relaxed),
                total_admitted: self.total_admitted.load(Ordering::Relaxed),
                rejected: self.admissions_rejected.load(Ordering::Relaxed),
                upgrade_failures: self.upgrade_failures.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                forwarded: self.messages_forwarded.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
                presence_sent: self.presence_sent.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                decode: self.decode_failures.load(Ordering::Relaxed),
                delivery: self.delivery_failures.load(Ordering::Relaxed),
                liveness: self.liveness_failures.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub peers: PeerMetrics,
    pub messages: MessageMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerMetrics {
    pub active: u64,
    pub total_admitted: u64,
    pub rejected: u64,
    pub upgrade_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub presence_sent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub decode: u64,
    pub delivery: u64,
    pub liveness: u64,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub peers: u64,
    pub uptime_secs: u64,
}
