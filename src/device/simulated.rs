//! In-process simulated device.
//!
//! This exists so the client (and binary) can run end to end without a
//! gateway or any sensor hardware. It knows two test devices and emits a
//! classification result line on every tick once connected.

use crate::device::boundary::{BoundaryError, ByteStream, DeviceBoundary, TransportError};
use crate::device::types::{ConfigSnapshot, ConnectRequest, DataSource};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Six-axis IMU test device.
pub const TEST_IMU_DEVICE: &str = "Test IMU 6-axis";
/// Single-channel audio test device.
pub const TEST_AUDIO_DEVICE: &str = "Test Audio";

/// Number of distinct classifications the simulator emits.
const CLASS_COUNT: u64 = 11;

/// Configuration for the simulated device.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Time between result lines
    pub tick: Duration,
    /// Stop the stream cleanly after this many results
    pub result_limit: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            result_limit: None,
        }
    }
}

/// A device boundary that never leaves the process.
pub struct SimulatedDevice {
    config: SimulatorConfig,
    snapshot: Mutex<ConfigSnapshot>,
    connected: Arc<AtomicBool>,
}

impl SimulatedDevice {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            snapshot: Mutex::new(disconnected_snapshot()),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn store(&self, snapshot: ConfigSnapshot) -> ConfigSnapshot {
        match self.snapshot.lock() {
            Ok(mut guard) => *guard = snapshot.clone(),
            Err(poisoned) => *poisoned.into_inner() = snapshot.clone(),
        }
        snapshot
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

fn disconnected_snapshot() -> ConfigSnapshot {
    ConfigSnapshot {
        streaming: Some(false),
        camera_on: Some(false),
        ..ConfigSnapshot::default()
    }
}

fn column_location(names: &[&str]) -> Map<String, Value> {
    names
        .iter()
        .enumerate()
        .map(|(position, name)| (name.to_string(), Value::from(position)))
        .collect()
}

#[async_trait]
impl DeviceBoundary for SimulatedDevice {
    async fn connect(&self, request: &ConnectRequest) -> Result<ConfigSnapshot, BoundaryError> {
        let (columns, sample_rate) = match request.device_id.as_str() {
            TEST_IMU_DEVICE => (
                column_location(&[
                    "AccelerometerX",
                    "AccelerometerY",
                    "AccelerometerZ",
                    "GyroscopeX",
                    "GyroscopeY",
                    "GyroscopeZ",
                ]),
                104,
            ),
            TEST_AUDIO_DEVICE => (column_location(&["Microphone"]), 16_000),
            _ => return Err(BoundaryError::new("Invalid Device ID")),
        };

        tracing::debug!(device_id = %request.device_id, "Simulated device connecting");
        self.connected.store(true, Ordering::SeqCst);

        Ok(self.store(ConfigSnapshot {
            streaming: Some(true),
            source: Some(DataSource::Test),
            mode: Some(request.mode),
            device_id: Some(request.device_id.clone()),
            baud_rate: request.baud_rate,
            sample_rate: Some(sample_rate),
            camera_on: Some(false),
            column_location: Some(columns),
            protocol: Some("SIMULATED".to_string()),
        }))
    }

    async fn disconnect(&self) -> Result<ConfigSnapshot, BoundaryError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(self.store(disconnected_snapshot()))
    }

    async fn config(&self) -> Result<ConfigSnapshot, BoundaryError> {
        self.snapshot
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| BoundaryError::new("simulated device state is unavailable"))
    }

    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::new("device is not connected"));
        }
        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        Ok(Box::new(SimulatedResultStream {
            ticker,
            emitted: 0,
            limit: self.config.result_limit,
            connected: Arc::clone(&self.connected),
        }))
    }
}

/// Result stream of the simulated device: one JSON line per tick.
struct SimulatedResultStream {
    ticker: tokio::time::Interval,
    emitted: u64,
    limit: Option<u64>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl ByteStream for SimulatedResultStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.limit.is_some_and(|limit| self.emitted >= limit) {
            return Ok(None);
        }
        self.ticker.tick().await;

        if !self.connected.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let classification = (self.emitted * 7 + 3) % CLASS_COUNT;
        let result = json!({
            "ModelNumber": 0,
            "Classification": classification,
            "timestamp": Utc::now().timestamp_millis() as f64 / 1000.0,
        });
        self.emitted += 1;

        let mut line = result.to_string().into_bytes();
        line.push(b'\n');
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::DeviceMode;

    fn fast_device(limit: u64) -> SimulatedDevice {
        SimulatedDevice::new(SimulatorConfig {
            tick: Duration::from_millis(1),
            result_limit: Some(limit),
        })
    }

    #[tokio::test]
    async fn test_connect_known_device() {
        let device = SimulatedDevice::default();
        let request = ConnectRequest::new(TEST_IMU_DEVICE, DataSource::Serial, DeviceMode::Recognition);
        let snapshot = device.connect(&request).await.unwrap();

        assert_eq!(snapshot.streaming, Some(true));
        assert_eq!(snapshot.source, Some(DataSource::Test));
        assert_eq!(snapshot.sample_rate, Some(104));
        assert_eq!(snapshot.column_location.unwrap().len(), 6);
        assert_eq!(device.config().await.unwrap().streaming, Some(true));
    }

    #[tokio::test]
    async fn test_connect_unknown_device_fails() {
        let device = SimulatedDevice::default();
        let request = ConnectRequest::new("nope", DataSource::Ble, DeviceMode::Recognition);
        let err = device.connect(&request).await.unwrap_err();
        assert_eq!(err.message, "Invalid Device ID");
        assert!(!device.is_connected());
    }

    #[tokio::test]
    async fn test_stream_requires_connection() {
        let device = SimulatedDevice::default();
        assert!(device.open_stream().await.is_err());
    }

    #[tokio::test]
    async fn test_stream_emits_json_lines_until_limit() {
        let device = fast_device(3);
        let request = ConnectRequest::new(TEST_AUDIO_DEVICE, DataSource::Microphone, DeviceMode::Recognition);
        device.connect(&request).await.unwrap();

        let mut stream = device.open_stream().await.unwrap();
        let mut lines = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            assert_eq!(chunk.last(), Some(&b'\n'));
            let value: Value = serde_json::from_slice(&chunk[..chunk.len() - 1]).unwrap();
            lines.push(value);
        }

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["Classification"], json!(3));
        assert_eq!(lines[1]["Classification"], json!(10));
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let device = SimulatedDevice::new(SimulatorConfig {
            tick: Duration::from_millis(1),
            result_limit: None,
        });
        let request = ConnectRequest::new(TEST_AUDIO_DEVICE, DataSource::Microphone, DeviceMode::Recognition);
        device.connect(&request).await.unwrap();
        let mut stream = device.open_stream().await.unwrap();
        assert!(stream.next_chunk().await.unwrap().is_some());

        let snapshot = device.disconnect().await.unwrap();
        assert_eq!(snapshot.streaming, Some(false));
        assert_eq!(stream.next_chunk().await.unwrap(), None);
    }
}
