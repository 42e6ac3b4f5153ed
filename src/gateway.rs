//! HTTP device boundary for the recognition gateway.
//!
//! The gateway server owns the device transport (serial/BLE/TCP/microphone).
//! This client speaks its four endpoints:
//!
//! ```text
//! POST /connect     ConnectRequest ──▶ ConfigSnapshot
//! POST /disconnect                 ──▶ ConfigSnapshot
//! GET  /config                     ──▶ ConfigSnapshot
//! GET  /results                    ──▶ chunked, newline-delimited JSON records
//! ```

use crate::device::boundary::{BoundaryError, ByteStream, DeviceBoundary, TransportError};
use crate::device::types::{ConfigSnapshot, ConnectRequest};
use async_trait::async_trait;
use std::time::Duration;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL, e.g. `http://127.0.0.1:5000`
    pub base_url: String,
    /// Timeout for request/response calls and for opening the result stream
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create a new gateway configuration.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    pub fn connect_url(&self) -> String {
        self.endpoint("connect")
    }

    pub fn disconnect_url(&self) -> String {
        self.endpoint("disconnect")
    }

    pub fn config_url(&self) -> String {
        self.endpoint("config")
    }

    pub fn results_url(&self) -> String {
        self.endpoint("results")
    }
}

/// Device boundary backed by the gateway's HTTP API.
pub struct HttpGateway {
    config: GatewayConfig,
    /// Client for request/response calls (bounded by `timeout`)
    client: reqwest::Client,
    /// Client for the open-ended result stream (only connecting is bounded)
    stream_client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, BoundaryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BoundaryError::new(format!("Failed to create HTTP client: {e}")))?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| BoundaryError::new(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            stream_client,
        })
    }

    pub fn gateway_config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn read_snapshot(response: reqwest::Response) -> Result<ConfigSnapshot, BoundaryError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BoundaryError::with_status(status.as_u16(), body));
        }

        response
            .json::<ConfigSnapshot>()
            .await
            .map_err(|e| BoundaryError::new(format!("Invalid configuration response: {e}")))
    }
}

fn network_error(e: reqwest::Error) -> BoundaryError {
    BoundaryError::new(format!("Gateway request failed: {e}"))
}

#[async_trait]
impl DeviceBoundary for HttpGateway {
    async fn connect(&self, request: &ConnectRequest) -> Result<ConfigSnapshot, BoundaryError> {
        tracing::debug!(url = %self.config.connect_url(), "Sending connect request");
        let response = self
            .client
            .post(self.config.connect_url())
            .json(request)
            .send()
            .await
            .map_err(network_error)?;
        Self::read_snapshot(response).await
    }

    async fn disconnect(&self) -> Result<ConfigSnapshot, BoundaryError> {
        let response = self
            .client
            .post(self.config.disconnect_url())
            .send()
            .await
            .map_err(network_error)?;
        Self::read_snapshot(response).await
    }

    async fn config(&self) -> Result<ConfigSnapshot, BoundaryError> {
        let response = self
            .client
            .get(self.config.config_url())
            .send()
            .await
            .map_err(network_error)?;
        Self::read_snapshot(response).await
    }

    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, TransportError> {
        tracing::debug!(url = %self.config.results_url(), "Opening result stream");
        let response = self
            .stream_client
            .get(self.config.results_url())
            .send()
            .await
            .map_err(|e| TransportError::new(format!("Failed to open result stream: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(format!(
                "Result stream returned {status}"
            )));
        }
        Ok(Box::new(HttpResultStream { response }))
    }
}

/// Chunked body of `GET /results`. Dropping it closes the connection.
struct HttpResultStream {
    response: reqwest::Response,
}

#[async_trait]
impl ByteStream for HttpResultStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.response
            .chunk()
            .await
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(|e| TransportError::new(e.to_string()))
    }
}
