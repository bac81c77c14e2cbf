//! Seams between the sync engine and its collaborators
//!
//! Defines the dispense capability consumed by batch callers and the sink
//! that receives device-pushed events.

use crate::data::{RawSlot, SlotId};
use crate::error::SyncError;
use async_trait::async_trait;

/// Result of a confirmed dispense
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispenseReceipt {
    /// Slot that was dispensed
    pub slot: SlotId,
    /// Acknowledgement text from the device
    pub message: String,
    /// Count reported by the device after the post-confirmation refresh,
    /// `None` when that refresh failed
    pub count: Option<u32>,
}

/// Anything that can dispense a single slot
///
/// Implemented by the sync engine; group dispensing only depends on this.
#[async_trait]
pub trait SlotDispenser: Send + Sync {
    /// Dispense one item from `slot`
    async fn dispense_slot(&self, slot: SlotId) -> Result<DispenseReceipt, SyncError>;

    /// Receive the summary of a batch of dispenses
    fn report(&self, _summary: &str) {}
}

/// Receiver of device-pushed events
///
/// Implement this trait to be notified by the push channel
pub trait PushSink: Send + Sync {
    /// Called with a full slot list pushed by the device
    fn on_slots(&self, entries: Vec<RawSlot>);

    /// Called when the device reports an RFID tag scan
    fn on_tag(&self, tag: String);

    /// Called once when the channel stops receiving
    fn on_closed(&self) {}
}
