//! # DispenseKit Core
//!
//! Core types, traits, and utilities for DispenseKit.
//! Provides the slot store, the shared normalization of device data,
//! the per-command state machine, events, and the error taxonomy.

pub mod core;
pub mod data;
pub mod error;
pub mod store;

pub use crate::core::{
    command::{CommandEvent, CommandPhase, InvalidTransition},
    event::{EventDispatcher, SyncEvent},
    listener::{DispenseReceipt, PushSink, SlotDispenser},
};

pub use data::{
    default_slots, normalize_entry, slots_from_counts, CommandKind, CommandRequest,
    PendingCommand, RawSlot, SlotId, SlotRecord, ValidationIssue, COUNT_SANITY_CEILING,
    DEFAULT_SLOT_COUNT, DEFAULT_SLOT_COUNTS,
};

pub use error::{Error, PersistenceError, Result, SyncError, TransportError};

pub use store::{ApplyReport, SlotStore, StoreUpdate};
