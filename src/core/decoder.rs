//! Structured decoding of stream frames into event records.
//!
//! Only structure is checked here: a frame must be UTF-8 JSON whose top
//! level is an object. Field content is passed through untouched.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Longest frame excerpt carried in a [`DecodeError`].
const PREVIEW_LEN: usize = 64;

/// Ordered field name → value mapping of one record.
pub type RecordFields = Map<String, Value>;

/// A decoded, sequenced classification event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Stream-local sequence number, contiguous from 0
    pub sequence: u64,
    /// Decoded fields in wire order
    pub fields: RecordFields,
    /// Arrival index of the source frame within the stream (counts rejected frames too)
    pub frame_index: u64,
    /// Wall-clock time the frame was decoded
    pub received_at: DateTime<Utc>,
}

impl EventRecord {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A record that passed decoding but has not been sequenced yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub fields: RecordFields,
    pub frame_index: u64,
    pub received_at: DateTime<Utc>,
}

impl DecodedFrame {
    /// Stamp the decoded fields with a sequence number.
    pub fn into_record(self, sequence: u64) -> EventRecord {
        EventRecord {
            sequence,
            fields: self.fields,
            frame_index: self.frame_index,
            received_at: self.received_at,
        }
    }
}

/// A frame that could not be decoded. Never fatal to the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Blank or whitespace-only frame
    Empty { frame_index: u64 },
    /// Frame bytes are not valid UTF-8
    InvalidUtf8 { frame_index: u64 },
    /// Frame is not parseable JSON
    Malformed {
        frame_index: u64,
        reason: String,
        preview: String,
    },
    /// Frame is JSON but its top level is not an object
    NotAnObject { frame_index: u64, preview: String },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Decode
    }

    /// Arrival index of the offending frame.
    pub fn frame_index(&self) -> u64 {
        match self {
            DecodeError::Empty { frame_index }
            | DecodeError::InvalidUtf8 { frame_index }
            | DecodeError::Malformed { frame_index, .. }
            | DecodeError::NotAnObject { frame_index, .. } => *frame_index,
        }
    }

    pub fn is_empty_frame(&self) -> bool {
        matches!(self, DecodeError::Empty { .. })
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Empty { frame_index } => write!(f, "Frame {frame_index} is empty"),
            DecodeError::InvalidUtf8 { frame_index } => {
                write!(f, "Frame {frame_index} is not valid UTF-8")
            }
            DecodeError::Malformed {
                frame_index,
                reason,
                preview,
            } => write!(f, "Frame {frame_index} is malformed ({reason}): {preview}"),
            DecodeError::NotAnObject {
                frame_index,
                preview,
            } => write!(f, "Frame {frame_index} is not a record object: {preview}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Parses frames as JSON object records.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    /// Arrival index of the next frame
    next_frame_index: u64,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one frame. Every call advances the arrival index, success or not.
    pub fn decode(&mut self, frame: &[u8]) -> Result<DecodedFrame, DecodeError> {
        let frame_index = self.next_frame_index;
        self.next_frame_index += 1;

        let frame = frame.strip_suffix(b"\r").unwrap_or(frame);
        let text =
            std::str::from_utf8(frame).map_err(|_| DecodeError::InvalidUtf8 { frame_index })?;
        if text.trim().is_empty() {
            return Err(DecodeError::Empty { frame_index });
        }

        let value: Value = serde_json::from_str(text).map_err(|e| DecodeError::Malformed {
            frame_index,
            reason: e.to_string(),
            preview: preview(text),
        })?;

        match value {
            Value::Object(fields) => Ok(DecodedFrame {
                fields,
                frame_index,
                received_at: Utc::now(),
            }),
            _ => Err(DecodeError::NotAnObject {
                frame_index,
                preview: preview(text),
            }),
        }
    }

    /// Number of frames seen so far.
    pub fn frames_seen(&self) -> u64 {
        self.next_frame_index
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
