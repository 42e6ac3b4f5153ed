//! Core ingestion components.
//!
//! This module contains:
//! - Line framing of chunked byte streams
//! - Structured record decoding
//! - Per-session sequence numbering
//! - The sliding window over recent records
//! - The pipeline that chains them for one stream session

pub mod decoder;
pub mod framing;
pub mod pipeline;
pub mod sequence;
pub mod windowing;

// Re-export commonly used types
pub use decoder::{DecodeError, DecodedFrame, EventRecord, RecordDecoder, RecordFields};
pub use framing::{Frame, LineFramer, TERMINATOR};
pub use pipeline::{Delivery, IngestPipeline};
pub use sequence::SequenceAssigner;
pub use windowing::{SlidingWindowFilter, WindowSnapshot, MAX_WINDOW_LENGTH, MIN_WINDOW_LENGTH};
