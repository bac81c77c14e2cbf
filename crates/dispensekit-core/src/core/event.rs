//! Event system for store and command notifications
//!
//! Provides:
//! - Event types for slot state, command outcomes and push-channel activity
//! - Event dispatcher for publishing events to subscribers

use crate::data::{CommandKind, SlotId};
use tokio::sync::broadcast;

/// Sync event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Device data was written into the store
    SlotsChanged {
        /// Store generation after the write.
        generation: u64,
    },
    /// A command was issued and applied speculatively
    CommandIssued {
        /// Target slot.
        slot: SlotId,
        /// Command kind.
        kind: CommandKind,
    },
    /// The device acknowledged a command
    CommandConfirmed {
        /// Target slot.
        slot: SlotId,
        /// Command kind.
        kind: CommandKind,
    },
    /// A command failed and its mutation was reverted
    CommandRolledBack {
        /// Target slot.
        slot: SlotId,
        /// Command kind.
        kind: CommandKind,
    },
    /// Message banner text changed
    Banner(String),
    /// The device reported an RFID tag scan
    TagScanned(String),
    /// Push channel connected
    ChannelConnected(String),
    /// Push channel closed
    ChannelClosed,
}

impl std::fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncEvent::SlotsChanged { generation } => {
                write!(f, "Slots updated (generation {})", generation)
            }
            SyncEvent::CommandIssued { slot, kind } => write!(f, "Issued {} on slot {}", kind, slot),
            SyncEvent::CommandConfirmed { slot, kind } => {
                write!(f, "Confirmed {} on slot {}", kind, slot)
            }
            SyncEvent::CommandRolledBack { slot, kind } => {
                write!(f, "Rolled back {} on slot {}", kind, slot)
            }
            SyncEvent::Banner(msg) => write!(f, "Message: {}", msg),
            SyncEvent::TagScanned(tag) => write!(f, "Tag scanned: {}", tag),
            SyncEvent::ChannelConnected(url) => write!(f, "Connected to {}", url),
            SyncEvent::ChannelClosed => write!(f, "Push channel closed"),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for sync events.
    tx: broadcast::Sender<SyncEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 100)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Having no subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: SyncEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
