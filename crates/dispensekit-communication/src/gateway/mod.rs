//! Device gateway
//!
//! The single point of network I/O toward the dispenser. Two transports
//! implement [`DeviceGateway`]: the request/response HTTP endpoints and the
//! bidirectional push channel.

pub mod http;
pub mod wire;

use async_trait::async_trait;
use dispensekit_core::{RawSlot, SlotId, TransportError};

pub use http::HttpDeviceGateway;

/// Acknowledgement returned by the device for a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Opaque text suitable for the message banner
    pub message: String,
}

impl Ack {
    /// Create an acknowledgement from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Transport toward the dispenser
///
/// Snapshots come back un-normalized; the slot store owns normalization so
/// every ingress path goes through the same rules.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Fetch the device's full slot list
    async fn fetch_snapshot(&self) -> Result<Vec<RawSlot>, TransportError>;

    /// Actuate the mechanism of `slot` once
    async fn send_dispense(&self, slot: SlotId, angle: u16) -> Result<Ack, TransportError>;

    /// Push a label/count correction for `slot`
    async fn send_update(
        &self,
        slot: SlotId,
        label: &str,
        count: u32,
    ) -> Result<Ack, TransportError>;

    /// Short name for logging
    fn name(&self) -> &str;
}
