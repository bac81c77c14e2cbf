//! HTTP transport
//!
//! Talks to the dispenser's request/response endpoints:
//! - `GET /` returns the slot snapshot
//! - `GET /servo?number=<id>&angle=<deg>` actuates one slot
//! - `GET /updatePills?number=<id>&count=<n>&name=<label>` corrects a slot

use super::{wire, Ack, DeviceGateway};
use async_trait::async_trait;
use dispensekit_core::{RawSlot, SlotId, TransportError};
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway over the device's HTTP endpoints
#[derive(Debug, Clone)]
pub struct HttpDeviceGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDeviceGateway {
    /// Create a gateway for the device at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::connection(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Base URL of the device
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {} {:?}", url, query);

        let mut request = self.client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Device answered {} for {}", status, path);
            return Err(TransportError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.map_error(e))?;
        Ok(body.to_vec())
    }

    fn map_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            TransportError::connection(error.to_string())
        }
    }
}

#[async_trait]
impl DeviceGateway for HttpDeviceGateway {
    async fn fetch_snapshot(&self) -> Result<Vec<RawSlot>, TransportError> {
        let body = self.get("/", &[]).await?;
        let entries = wire::parse_snapshot(&body)?;
        tracing::debug!("Fetched {} slot entries", entries.len());
        Ok(entries)
    }

    async fn send_dispense(&self, slot: SlotId, angle: u16) -> Result<Ack, TransportError> {
        let body = self
            .get(
                "/servo",
                &[("number", slot.to_string()), ("angle", angle.to_string())],
            )
            .await?;
        let fallback = format!("Slot {} dispensed", slot);
        Ok(Ack::new(wire::parse_ack(&body, &fallback)))
    }

    async fn send_update(
        &self,
        slot: SlotId,
        label: &str,
        count: u32,
    ) -> Result<Ack, TransportError> {
        let body = self
            .get(
                "/updatePills",
                &[
                    ("number", slot.to_string()),
                    ("count", count.to_string()),
                    ("name", label.to_string()),
                ],
            )
            .await?;
        let fallback = format!("Slot {} updated", slot);
        Ok(Ack::new(wire::parse_ack(&body, &fallback)))
    }

    fn name(&self) -> &str {
        "http"
    }
}
