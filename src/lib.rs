//! Recognition Link - live classification event ingestion for sensing devices.
//!
//! This library lets an operator connect a sensing device (through a
//! gateway), watch its connection status, and consume the unbounded feed of
//! classification results the device produces in recognition mode.
//!
//! # Guarantees
//!
//! - **Chunk independence**: records are framed on newlines no matter how the
//!   transport splits the bytes
//! - **No loss, no duplication**: every decodable line becomes exactly one
//!   record, with contiguous sequence numbers from 0 per stream session
//! - **Resilience**: a malformed line is logged and dropped; the stream goes on
//! - **Prompt cancellation**: once a stop returns, no further record is delivered
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Recognition Link                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐  ┌───────────┐  ┌──────────┐  ┌──────────────┐   │
//! │  │ LineFramer │─▶│  Record   │─▶│ Sequence │─▶│SlidingWindow │─▶ observers
//! │  │            │  │  Decoder  │  │ Assigner │  │   Filter     │   │
//! │  └────────────┘  └───────────┘  └──────────┘  └──────────────┘   │
//! │        ▲              one StreamSession per stream               │
//! │        │ chunks                                                  │
//! │  ┌─────────────┐    gates     ┌───────────────────────┐          │
//! │  │   Device    │◀────────────│  ConnectionStateMachine │◀─ Config  │
//! │  │  Boundary   │─ snapshots ─▶│                       │  Reconciler│
//! │  └─────────────┘              └───────────────────────┘          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use recognition_link::{
//!     create_shared_stats, ChannelObserver, ConnectRequest, ConnectionStateMachine, DataSource,
//!     DeviceMode, SimulatedDevice, TEST_IMU_DEVICE,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let machine = ConnectionStateMachine::new(
//!     Arc::new(SimulatedDevice::default()),
//!     3,
//!     create_shared_stats(),
//! )?;
//!
//! machine
//!     .connect(ConnectRequest::new(TEST_IMU_DEVICE, DataSource::Test, DeviceMode::Recognition))
//!     .await?;
//!
//! let (observer, events) = ChannelObserver::new();
//! let session = machine.start_stream(vec![observer]).await?;
//!
//! // Session events can be received from `events`
//! # let _ = (session, events);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod core;
pub mod device;
pub mod error;
pub mod session;
pub mod stats;

#[cfg(feature = "gateway")]
pub mod gateway;

// Re-export key types at crate root for convenience
pub use crate::core::{
    Delivery, DecodeError, EventRecord, IngestPipeline, LineFramer, RecordDecoder,
    SequenceAssigner, SlidingWindowFilter, WindowSnapshot,
};
pub use config::{Config, ConfigError};
pub use connection::{
    ConnectionError, ConnectionObserver, ConnectionState, ConnectionStateMachine,
    ConnectionStatus,
};
pub use device::{
    BoundaryError, ByteStream, ChannelStream, ConfigReconciler, ConfigSnapshot, ConnectRequest,
    DataSource, DeviceBoundary, DeviceConfig, DeviceMode, SimulatedDevice, SimulatorConfig,
    TransportError, TEST_AUDIO_DEVICE, TEST_IMU_DEVICE,
};
pub use error::{ErrorKind, ValidationError};
pub use session::{
    ChannelObserver, SessionEnd, SessionError, SessionEvent, SessionObserver, SessionState,
    StreamSession,
};
pub use stats::{create_shared_stats, IngestStats, IngestStatsSnapshot, SharedIngestStats};

// Gateway re-exports (when enabled)
#[cfg(feature = "gateway")]
pub use gateway::{GatewayConfig, HttpGateway};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
