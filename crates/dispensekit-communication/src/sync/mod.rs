//! Sync engine
//!
//! Coordinates the slot store, the device gateway and the push channel.

pub mod engine;

pub use engine::{CommandOutcome, CommandTicket, SyncEngine, SyncEngineConfig};
