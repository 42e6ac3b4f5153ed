//! Shared error vocabulary.
//!
//! Each module owns its own error enum; all of them report a machine-readable
//! [`ErrorKind`] so callers can branch without matching on message text.

use serde::Serialize;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Bad request from the caller. Nothing changed.
    Validation,
    /// The device or gateway reported a failure.
    Boundary,
    /// A single stream record could not be decoded.
    Decode,
    /// The byte stream failed mid-read.
    Transport,
    /// Another connect/disconnect request is already in flight.
    Busy,
    /// The request is well-formed but not allowed in the current state.
    State,
}

impl ErrorKind {
    /// Stable code suitable for logs and wire responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Boundary => "BOUNDARY_ERROR",
            ErrorKind::Decode => "DECODE_ERROR",
            ErrorKind::Transport => "TRANSPORT_ERROR",
            ErrorKind::Busy => "BUSY",
            ErrorKind::State => "INVALID_STATE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected request, with one human-readable reason per problem found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub reasons: Vec<String>,
}

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reasons: vec![reason.into()],
        }
    }

    /// Build from collected reasons; `None` when there is nothing to report.
    pub fn from_reasons(reasons: Vec<String>) -> Option<Self> {
        if reasons.is_empty() {
            None
        } else {
            Some(Self { reasons })
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.reasons.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Check a filter window length against the supported range.
pub fn validate_window_length(length: usize) -> Result<(), ValidationError> {
    if (crate::core::MIN_WINDOW_LENGTH..=crate::core::MAX_WINDOW_LENGTH).contains(&length) {
        Ok(())
    } else {
        Err(ValidationError::new(format!(
            "window length must be between {} and {}, got {length}",
            crate::core::MIN_WINDOW_LENGTH,
            crate::core::MAX_WINDOW_LENGTH
        )))
    }
}
