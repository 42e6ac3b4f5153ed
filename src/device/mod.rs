//! Device-side types and boundaries.
//!
//! The crate never speaks serial/BLE/TCP itself. It only sees configuration
//! snapshots and result byte streams through a [`DeviceBoundary`].

pub mod boundary;
pub mod reconcile;
pub mod simulated;
pub mod types;

// Re-export commonly used types
pub use boundary::{
    BoundaryError, ByteStream, ChannelStream, ChunkSender, DeviceBoundary, TransportError,
};
pub use reconcile::ConfigReconciler;
pub use simulated::{SimulatedDevice, SimulatorConfig, TEST_AUDIO_DEVICE, TEST_IMU_DEVICE};
pub use types::{ConfigSnapshot, ConnectRequest, DataSource, DeviceConfig, DeviceMode};
