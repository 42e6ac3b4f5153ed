//! The seam between this crate and whatever talks to the device.
//!
//! A [`DeviceBoundary`] answers connect/disconnect/config requests with
//! configuration snapshots and opens result streams. Implementations live in
//! [`crate::gateway`] (HTTP) and [`crate::device::simulated`] (in-process).

use crate::device::types::{ConfigSnapshot, ConnectRequest};
use crate::error::ErrorKind;
use async_trait::async_trait;

/// Failure reported by the device or gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryError {
    /// HTTP status or similar code, when the boundary has one
    pub status: Option<u16>,
    pub message: String,
}

impl BoundaryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Boundary
    }
}

impl std::fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "Device error ({status}): {}", self.message),
            None => write!(f, "Device error: {}", self.message),
        }
    }
}

impl std::error::Error for BoundaryError {}

/// Failure while reading an open byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transport
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transport error: {}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// An open, chunk-delivering byte stream. Dropping it closes the connection.
#[async_trait]
pub trait ByteStream: Send {
    /// Wait for the next chunk. `Ok(None)` means the stream ended cleanly.
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses no
    /// bytes that a later call would have returned.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Requests understood by the device side.
#[async_trait]
pub trait DeviceBoundary: Send + Sync {
    /// Ask the device to connect with the given settings.
    async fn connect(&self, request: &ConnectRequest) -> Result<ConfigSnapshot, BoundaryError>;

    /// Ask the device to disconnect.
    async fn disconnect(&self) -> Result<ConfigSnapshot, BoundaryError>;

    /// Current device configuration.
    async fn config(&self) -> Result<ConfigSnapshot, BoundaryError>;

    /// Open the recognition result stream.
    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, TransportError>;
}

/// A byte stream fed through a tokio channel.
///
/// The sending side delivers `Ok(chunk)` items or an `Err` to simulate a
/// read failure; dropping every sender ends the stream cleanly.
pub struct ChannelStream {
    receiver: tokio::sync::mpsc::Receiver<Result<Vec<u8>, TransportError>>,
}

/// Sending half of a [`ChannelStream`].
pub type ChunkSender = tokio::sync::mpsc::Sender<Result<Vec<u8>, TransportError>>;

impl ChannelStream {
    /// Create a stream with room for `capacity` undelivered chunks.
    pub fn new(capacity: usize) -> (ChunkSender, Self) {
        let (sender, receiver) = tokio::sync::mpsc::channel(capacity);
        (sender, Self { receiver })
    }
}

#[async_trait]
impl ByteStream for ChannelStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.receiver.recv().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
