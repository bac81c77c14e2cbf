//! Push channel message envelopes
//!
//! Every frame is a JSON text message tagged by `type`. Slots on this
//! channel are addressed by 0-based position, not by slot number.

use dispensekit_core::{RawSlot, SlotId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One slot as reported in a `pillData` frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushedSlot {
    /// Label, any JSON value
    #[serde(default)]
    pub name: Value,
    /// Count exactly as reported
    #[serde(default)]
    pub count: Value,
}

/// Frames sent by the device
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEnvelope {
    /// An RFID tag was scanned
    #[serde(rename = "rfid")]
    Rfid {
        /// Tag identifier
        tag: String,
    },
    /// Full slot list in position order
    #[serde(rename = "pillData")]
    PillData {
        /// Slots, first entry is slot 1
        pills: Vec<PushedSlot>,
    },
}

impl InboundEnvelope {
    /// Decode a text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Convert pushed slots into raw entries keyed by slot id
pub fn pushed_to_raw(pills: Vec<PushedSlot>) -> Vec<RawSlot> {
    pills
        .into_iter()
        .enumerate()
        .map(|(index, pill)| {
            let label = pill.name.as_str().map(str::to_string);
            RawSlot::new(SlotId::from_index(index), label, pill.count)
        })
        .collect()
}

/// Frames sent to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundEnvelope {
    /// Open (or close) the mechanism of a slot
    #[serde(rename = "servo")]
    Servo {
        /// 0-based slot position
        servo: usize,
        /// Whether to open
        open: bool,
    },
    /// Correct a slot's label and count
    #[serde(rename = "updatePill")]
    UpdatePill {
        /// 0-based slot position
        servo: usize,
        /// New label
        name: String,
        /// New count
        count: u32,
    },
}

impl OutboundEnvelope {
    /// Open the mechanism of `slot`
    pub fn dispense(slot: SlotId) -> Self {
        Self::Servo {
            servo: slot.index(),
            open: true,
        }
    }

    /// Correct the label and count of `slot`
    pub fn update(slot: SlotId, name: impl Into<String>, count: u32) -> Self {
        Self::UpdatePill {
            servo: slot.index(),
            name: name.into(),
            count,
        }
    }

    /// Encode as a text frame
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
