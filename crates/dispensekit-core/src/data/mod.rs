//! Data models for slots and commands
//!
//! This module provides:
//! - Slot identity and the canonical slot record
//! - Command requests and the pending-command record owned by the sync engine
//! - Normalization of raw device payloads into slot records

pub mod normalize;

pub use normalize::{is_unreadable_label, normalize_entry, RawSlot, ValidationIssue};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Counts above this value are treated as garbage from the device
pub const COUNT_SANITY_CEILING: u32 = 1_000_000;

/// Number of slots on the stock dispenser
pub const DEFAULT_SLOT_COUNT: usize = 5;

/// Counts of the compiled-in default slots
pub const DEFAULT_SLOT_COUNTS: [u32; DEFAULT_SLOT_COUNT] = [10, 15, 20, 25, 30];

/// Identifier of a physical compartment (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl SlotId {
    /// Create a slot id, rejecting zero
    pub fn new(id: u32) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    /// Slot id for a 0-based position in an index-addressed list
    pub fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }

    /// 0-based position of this slot in an index-addressed list
    pub fn index(&self) -> usize {
        self.0.saturating_sub(1) as usize
    }

    /// Raw numeric value
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-side view of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// Slot identifier
    pub id: SlotId,
    /// Operator-facing label
    pub label: String,
    /// Remaining item count, always within `[0, COUNT_SANITY_CEILING]`
    pub count: u32,
}

impl SlotRecord {
    /// Create a record; counts above the sanity ceiling are stored as 0
    pub fn new(id: SlotId, label: impl Into<String>, count: u32) -> Self {
        Self {
            id,
            label: label.into(),
            count: if count > COUNT_SANITY_CEILING { 0 } else { count },
        }
    }

    /// The label shown when the device reports an unreadable one
    pub fn fallback_label(id: SlotId) -> String {
        format!("Slot {}", id)
    }

    /// Copy of this record with the count lowered by one, floored at zero
    pub fn decremented(&self) -> Self {
        Self {
            count: self.count.saturating_sub(1),
            ..self.clone()
        }
    }
}

impl fmt::Display for SlotRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ({})", self.id, self.label, self.count)
    }
}

/// The compiled-in slots used until the device reports its own
pub fn default_slots() -> Vec<SlotRecord> {
    slots_from_counts(&DEFAULT_SLOT_COUNTS)
}

/// Placeholder slots numbered from 1, one per starting count
pub fn slots_from_counts(counts: &[u32]) -> Vec<SlotRecord> {
    counts
        .iter()
        .enumerate()
        .map(|(index, count)| {
            let id = SlotId::from_index(index);
            SlotRecord::new(id, SlotRecord::fallback_label(id), *count)
        })
        .collect()
}

/// Kind of a command in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Release one item from the slot
    Dispense,
    /// Change the label (the count may be corrected in the same request)
    Rename,
    /// Correct the count only
    SetCount,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispense => write!(f, "dispense"),
            Self::Rename => write!(f, "rename"),
            Self::SetCount => write!(f, "set-count"),
        }
    }
}

/// An operator intent targeting one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    /// Actuate the slot mechanism once
    Dispense {
        /// Target slot
        slot: SlotId,
    },
    /// Push a label/count correction
    Update {
        /// Target slot
        slot: SlotId,
        /// New label
        label: String,
        /// New count
        count: u32,
    },
}

impl CommandRequest {
    /// Target slot of the request
    pub fn slot(&self) -> SlotId {
        match self {
            Self::Dispense { slot } | Self::Update { slot, .. } => *slot,
        }
    }

    /// Apply the speculative mutation for this request to `current`
    pub fn optimistic(&self, current: &SlotRecord) -> SlotRecord {
        match self {
            Self::Dispense { .. } => current.decremented(),
            Self::Update { label, count, .. } => {
                SlotRecord::new(current.id, label.clone(), *count)
            }
        }
    }

    /// Command kind, judged against the record being replaced
    pub fn kind(&self, current: &SlotRecord) -> CommandKind {
        match self {
            Self::Dispense { .. } => CommandKind::Dispense,
            Self::Update { label, .. } if *label != current.label => CommandKind::Rename,
            Self::Update { .. } => CommandKind::SetCount,
        }
    }
}

/// A command between send and outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// Unique id of this attempt
    pub id: Uuid,
    /// Target slot
    pub slot: SlotId,
    /// Command kind
    pub kind: CommandKind,
    /// When the command was issued
    pub issued_at: DateTime<Utc>,
    /// Record before the speculative mutation
    pub previous: SlotRecord,
    /// Record written speculatively
    pub optimistic: SlotRecord,
    /// Device revision of the slot at issue time
    pub device_revision: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_id_index_mapping() {
        assert_eq!(SlotId::from_index(0), SlotId(1));
        assert_eq!(SlotId(5).index(), 4);
        assert_eq!(SlotId::new(0), None);
        assert_eq!(SlotId::new(3), Some(SlotId(3)));
    }

    #[test]
    fn test_default_slots() {
        let slots = default_slots();
        assert_eq!(slots.len(), DEFAULT_SLOT_COUNT);
        assert_eq!(slots[0], SlotRecord::new(SlotId(1), "Slot 1", 10));
        assert_eq!(slots[4].count, 30);
    }

    #[test]
    fn test_decrement_floors_at_zero() {
        let empty = SlotRecord::new(SlotId(2), "Aspirin", 0);
        assert_eq!(empty.decremented().count, 0);

        let full = SlotRecord::new(SlotId(2), "Aspirin", 7);
        assert_eq!(full.decremented().count, 6);
    }

    #[test]
    fn test_command_kind_from_update() {
        let current = SlotRecord::new(SlotId(1), "Vitamin D", 4);
        let recount = CommandRequest::Update {
            slot: SlotId(1),
            label: "Vitamin D".to_string(),
            count: 12,
        };
        assert_eq!(recount.kind(&current), CommandKind::SetCount);

        let rename = CommandRequest::Update {
            slot: SlotId(1),
            label: "Iron".to_string(),
            count: 4,
        };
        assert_eq!(rename.kind(&current), CommandKind::Rename);
        assert_eq!(rename.optimistic(&current).label, "Iron");
    }
}
