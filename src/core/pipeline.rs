//! The per-session ingestion pipeline.
//!
//! ```text
//! chunk ──▶ LineFramer ──▶ RecordDecoder ──▶ SequenceAssigner ──▶ SlidingWindowFilter ──▶ Delivery
//! ```
//!
//! Frames are decoded strictly in arrival order. Rejected frames are logged,
//! counted and dropped without consuming a sequence number.

use crate::core::decoder::{EventRecord, RecordDecoder};
use crate::core::framing::LineFramer;
use crate::core::sequence::SequenceAssigner;
use crate::core::windowing::{SlidingWindowFilter, WindowSnapshot};
use crate::error::ValidationError;
use crate::stats::SharedIngestStats;
use std::sync::Arc;

/// One accepted record and the window it produced.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub record: Arc<EventRecord>,
    pub window: WindowSnapshot,
}

/// Owns one session's framer, decoder, sequence counter and window.
#[derive(Debug)]
pub struct IngestPipeline {
    framer: LineFramer,
    decoder: RecordDecoder,
    sequence: SequenceAssigner,
    window: SlidingWindowFilter,
    stats: SharedIngestStats,
}

impl IngestPipeline {
    /// Build a fresh pipeline: empty carry, sequence at 0, empty window.
    pub fn new(window_length: usize, stats: SharedIngestStats) -> Result<Self, ValidationError> {
        Ok(Self {
            framer: LineFramer::new(),
            decoder: RecordDecoder::new(),
            sequence: SequenceAssigner::new(),
            window: SlidingWindowFilter::new(window_length)?,
            stats,
        })
    }

    /// Run one chunk through the pipeline.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Delivery> {
        self.stats.record_chunk(chunk.len());

        let frames = self.framer.feed(chunk);
        if frames.is_empty() {
            tracing::trace!(
                pending = self.framer.pending_len(),
                "Chunk completed no frames"
            );
            return Vec::new();
        }
        self.stats.record_frames(frames.len() as u64);

        let mut deliveries = Vec::with_capacity(frames.len());
        for frame in frames {
            match self.decoder.decode(&frame) {
                Ok(decoded) => {
                    let record = Arc::new(decoded.into_record(self.sequence.next()));
                    let window = self.window.push(Arc::clone(&record));
                    deliveries.push(Delivery { record, window });
                }
                Err(e) if e.is_empty_frame() => {
                    tracing::debug!("Dropping frame: {}", e);
                    self.stats.record_decode_error();
                }
                Err(e) => {
                    tracing::warn!("Dropping frame: {}", e);
                    self.stats.record_decode_error();
                }
            }
        }
        deliveries
    }

    /// Change the window length; the window is re-trimmed immediately.
    pub fn resize_window(&mut self, length: usize) -> Result<WindowSnapshot, ValidationError> {
        self.window.configure(length)
    }

    /// End of stream: drop any unterminated tail and report its size.
    pub fn finish(&mut self) -> usize {
        let discarded = self.framer.discard_pending();
        if discarded > 0 {
            tracing::warn!(
                bytes = discarded,
                "Discarding unterminated data at end of stream"
            );
            self.stats.record_discarded_tail(discarded);
        }
        discarded
    }

    pub fn window(&self) -> WindowSnapshot {
        self.window.snapshot()
    }

    /// Sequence numbers handed out so far.
    pub fn records_accepted(&self) -> u64 {
        self.sequence.assigned()
    }
}
