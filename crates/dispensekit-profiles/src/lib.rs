//! # DispenseKit Profiles
//!
//! Local, persisted operator profiles. Each profile names a set of slots
//! that are dispensed together.

pub mod error;
pub mod group;
pub mod manager;
pub mod model;
pub mod storage;

pub use error::{ProfileError, ProfileResult};
pub use group::{dispense_group, GroupDispenseReport, SlotOutcome};
pub use manager::{ProfileRegistry, DEFAULT_PROFILES_KEY};
pub use model::OperatorProfile;
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
