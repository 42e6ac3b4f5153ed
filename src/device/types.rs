//! Device configuration types, on the wire and in client state.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Where the gateway reads sensor data from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSource {
    #[default]
    #[serde(rename = "SERIAL")]
    Serial,
    #[serde(rename = "BLE")]
    Ble,
    #[serde(rename = "TCPIP")]
    TcpIp,
    #[serde(rename = "TEST")]
    Test,
    #[serde(rename = "MICROPHONE")]
    Microphone,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Serial => "SERIAL",
            DataSource::Ble => "BLE",
            DataSource::TcpIp => "TCPIP",
            DataSource::Test => "TEST",
            DataSource::Microphone => "MICROPHONE",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SERIAL" => Ok(DataSource::Serial),
            "BLE" => Ok(DataSource::Ble),
            "TCPIP" | "TCP/IP" | "TCP" => Ok(DataSource::TcpIp),
            "TEST" => Ok(DataSource::Test),
            "MICROPHONE" | "MIC" => Ok(DataSource::Microphone),
            other => Err(format!("unknown data source '{other}'")),
        }
    }
}

/// What the device is doing with its data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceMode {
    #[default]
    DataCapture,
    Recognition,
}

impl DeviceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceMode::DataCapture => "DATA_CAPTURE",
            DeviceMode::Recognition => "RECOGNITION",
        }
    }
}

impl std::fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "DATA_CAPTURE" | "CAPTURE" => Ok(DeviceMode::DataCapture),
            "RECOGNITION" | "RESULTS" => Ok(DeviceMode::Recognition),
            other => Err(format!("unknown device mode '{other}'")),
        }
    }
}

/// Client-side view of the device configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub source: DataSource,
    pub mode: DeviceMode,
    pub device_id: String,
    pub baud_rate: Option<u32>,
    pub sample_rate: Option<u32>,
    /// Sorted sensor column names
    pub columns: BTreeSet<String>,
    pub connected: bool,
    pub camera_connected: bool,
    pub protocol: Option<String>,
}

impl DeviceConfig {
    /// Seed a configuration from the fields of a connect request.
    pub fn from_request(request: &ConnectRequest) -> Self {
        Self {
            source: request.source,
            mode: request.mode,
            device_id: request.device_id.clone(),
            baud_rate: request.baud_rate,
            sample_rate: request.sample_rate,
            ..Self::default()
        }
    }
}

/// Device configuration as reported by the gateway.
///
/// Every field is optional; absent fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DataSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DeviceMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_on: Option<bool>,
    /// Column name → column position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_location: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// A request to connect to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub device_id: String,
    pub source: DataSource,
    pub mode: DeviceMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

impl ConnectRequest {
    pub fn new(device_id: impl Into<String>, source: DataSource, mode: DeviceMode) -> Self {
        Self {
            device_id: device_id.into(),
            source,
            mode,
            baud_rate: None,
            sample_rate: None,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Check the request, collecting every problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut reasons = Vec::new();

        if self.device_id.trim().is_empty() {
            reasons.push("device id is required".to_string());
        }
        if self.baud_rate == Some(0) {
            reasons.push("baud rate must be greater than zero".to_string());
        }
        if self.sample_rate == Some(0) {
            reasons.push("sample rate must be greater than zero".to_string());
        }

        match ValidationError::from_reasons(reasons) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
