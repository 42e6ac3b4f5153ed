//! Ingestion statistics.
//!
//! Counters are atomics so the session task, the connection state machine
//! and the CLI can share one instance without locking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running ingestion counters.
#[derive(Debug)]
pub struct IngestStats {
    /// Stream sessions that reached Active
    sessions_started: AtomicU64,
    /// Chunks received from transports
    chunks: AtomicU64,
    /// Bytes received from transports
    bytes: AtomicU64,
    /// Complete frames produced by framing
    frames: AtomicU64,
    /// Records delivered to observers
    records_delivered: AtomicU64,
    /// Frames dropped because they failed decoding
    decode_errors: AtomicU64,
    /// Sessions ended by a transport failure
    transport_errors: AtomicU64,
    /// Unterminated tail bytes dropped at end of stream
    discarded_tail_bytes: AtomicU64,
    /// When this instance was created
    started_at: DateTime<Utc>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            chunks: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            records_delivered: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            discarded_tail_bytes: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one received chunk of `len` bytes.
    pub fn record_chunk(&self, len: usize) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_frames(&self, count: u64) {
        self.frames.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.records_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded_tail(&self, bytes: usize) {
        self.discarded_tail_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            discarded_tail_bytes: self.discarded_tail_bytes.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Ingest Statistics:\n\
             - Stream sessions: {}\n\
             - Chunks received: {} ({} bytes)\n\
             - Frames: {}\n\
             - Records delivered: {}\n\
             - Frames dropped (decode errors): {}\n\
             - Transport errors: {}\n\
             - Unterminated tail bytes discarded: {}\n\
             - Uptime: {} seconds",
            stats.sessions_started,
            stats.chunks,
            stats.bytes,
            stats.frames,
            stats.records_delivered,
            stats.decode_errors,
            stats.transport_errors,
            stats.discarded_tail_bytes,
            stats.uptime_secs
        )
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatsSnapshot {
    pub sessions_started: u64,
    pub chunks: u64,
    pub bytes: u64,
    pub frames: u64,
    pub records_delivered: u64,
    pub decode_errors: u64,
    pub transport_errors: u64,
    pub discarded_tail_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared statistics.
pub type SharedIngestStats = Arc<IngestStats>;

/// Create a new shared statistics instance.
pub fn create_shared_stats() -> SharedIngestStats {
    Arc::new(IngestStats::new())
}
