//! Slot record store
//!
//! The single authoritative client-side view of the dispenser. Device data
//! enters only through [`SlotStore::apply`], which runs every entry through
//! the shared normalization; speculative writes from the sync engine go
//! through [`SlotStore::set_record`].
//!
//! The slot topology is fixed by the first device report. Until then the
//! store holds the compiled-in defaults; afterwards unknown ids are ignored
//! and no slot is ever added or removed.

use crate::data::{normalize_entry, RawSlot, SlotId, SlotRecord, ValidationIssue};
use std::collections::BTreeMap;

/// A batch of device data to write into the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreUpdate {
    /// Full state fetched over HTTP
    Snapshot(Vec<RawSlot>),
    /// Slot list pushed by the device over the push channel
    Push(Vec<RawSlot>),
}

impl StoreUpdate {
    fn source(&self) -> &'static str {
        match self {
            StoreUpdate::Snapshot(_) => "snapshot",
            StoreUpdate::Push(_) => "push",
        }
    }

    fn into_entries(self) -> Vec<RawSlot> {
        match self {
            StoreUpdate::Snapshot(entries) | StoreUpdate::Push(entries) => entries,
        }
    }
}

/// Outcome of applying a [`StoreUpdate`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Number of records written
    pub applied: usize,
    /// Ids not part of the established topology
    pub ignored: Vec<SlotId>,
    /// Corrections made by normalization
    pub corrections: Vec<ValidationIssue>,
    /// Whether this update established the topology
    pub established: bool,
}

/// In-memory mapping of slot id to record
#[derive(Debug, Clone)]
pub struct SlotStore {
    slots: BTreeMap<SlotId, SlotRecord>,
    revisions: BTreeMap<SlotId, u64>,
    generation: u64,
    established: bool,
}

impl SlotStore {
    /// Create a store seeded with provisional records
    pub fn new(defaults: Vec<SlotRecord>) -> Self {
        Self {
            slots: defaults.into_iter().map(|r| (r.id, r)).collect(),
            revisions: BTreeMap::new(),
            generation: 0,
            established: false,
        }
    }

    /// Get the record for a slot
    pub fn get(&self, id: SlotId) -> Option<&SlotRecord> {
        self.slots.get(&id)
    }

    /// All records ordered by slot id
    pub fn records(&self) -> Vec<SlotRecord> {
        self.slots.values().cloned().collect()
    }

    /// All slot ids ordered ascending
    pub fn ids(&self) -> Vec<SlotId> {
        self.slots.keys().copied().collect()
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the store has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of device updates applied so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of the last device update that wrote `id`
    ///
    /// Zero until the device has reported the slot. Speculative writes
    /// through [`SlotStore::set_record`] do not change it.
    pub fn revision(&self, id: SlotId) -> u64 {
        self.revisions.get(&id).copied().unwrap_or(0)
    }

    /// Whether a device report has fixed the topology
    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Write device data into the store
    ///
    /// Values of known slots are replaced wholesale; nothing is merged with
    /// speculative state.
    pub fn apply(&mut self, update: StoreUpdate) -> ApplyReport {
        let source = update.source();
        let mut report = ApplyReport::default();
        let mut normalized = Vec::new();

        for entry in update.into_entries() {
            let (record, issues) = normalize_entry(entry);
            report.corrections.extend(issues);
            normalized.push(record);
        }

        if normalized.is_empty() {
            tracing::debug!("Ignoring empty {} update", source);
            return report;
        }

        let next = self.generation + 1;
        if !self.established {
            self.slots = normalized.into_iter().map(|r| (r.id, r)).collect();
            self.revisions = self.slots.keys().map(|id| (*id, next)).collect();
            self.established = true;
            report.established = true;
            report.applied = self.slots.len();
            tracing::info!("Slot topology established from {}: {} slots", source, report.applied);
        } else {
            for record in normalized {
                match self.slots.get_mut(&record.id) {
                    Some(slot) => {
                        self.revisions.insert(record.id, next);
                        *slot = record;
                        report.applied += 1;
                    }
                    None => report.ignored.push(record.id),
                }
            }
            if !report.ignored.is_empty() {
                tracing::warn!(
                    "Ignored {} entries for unknown slots {:?}",
                    source,
                    report.ignored
                );
            }
        }

        if report.applied > 0 {
            self.generation = next;
        }
        report
    }

    /// Replace the record of a known slot, returning the old one
    pub fn set_record(&mut self, record: SlotRecord) -> Option<SlotRecord> {
        let slot = self.slots.get_mut(&record.id)?;
        Some(std::mem::replace(slot, record))
    }
}

impl Default for SlotStore {
    fn default() -> Self {
        Self::new(crate::data::default_slots())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: u32, label: &str, count: i64) -> RawSlot {
        RawSlot::new(SlotId(id), Some(label.to_string()), json!(count))
    }

    #[test]
    fn test_default_store_is_provisional() {
        let store = SlotStore::default();
        assert_eq!(store.len(), 5);
        assert!(!store.is_established());
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_first_snapshot_establishes_topology() {
        let mut store = SlotStore::default();
        let report = store.apply(StoreUpdate::Snapshot(vec![
            entry(1, "A", 3),
            entry(2, "B", 4),
        ]));

        assert!(report.established);
        assert_eq!(report.applied, 2);
        assert_eq!(store.ids(), vec![SlotId(1), SlotId(2)]);
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_later_updates_keep_topology() {
        let mut store = SlotStore::default();
        store.apply(StoreUpdate::Snapshot(vec![entry(1, "A", 3), entry(2, "B", 4)]));

        let report = store.apply(StoreUpdate::Push(vec![entry(2, "B", 9), entry(7, "X", 1)]));
        assert_eq!(report.applied, 1);
        assert_eq!(report.ignored, vec![SlotId(7)]);
        assert_eq!(store.get(SlotId(1)).map(|r| r.count), Some(3));
        assert_eq!(store.get(SlotId(2)).map(|r| r.count), Some(9));
        assert!(store.get(SlotId(7)).is_none());
    }

    #[test]
    fn test_revision_tracks_only_written_slots() {
        let mut store = SlotStore::default();
        assert_eq!(store.revision(SlotId(1)), 0);

        store.apply(StoreUpdate::Snapshot(vec![entry(1, "A", 3), entry(2, "B", 4)]));
        assert_eq!(store.revision(SlotId(1)), 1);
        assert_eq!(store.revision(SlotId(2)), 1);

        store.apply(StoreUpdate::Push(vec![entry(1, "A", 2)]));
        store.set_record(SlotRecord::new(SlotId(2), "B", 3));
        assert_eq!(store.generation(), 2);
        assert_eq!(store.revision(SlotId(1)), 2);
        assert_eq!(store.revision(SlotId(2)), 1);
    }

    #[test]
    fn test_apply_normalizes_entries() {
        let mut store = SlotStore::default();
        let report = store.apply(StoreUpdate::Snapshot(vec![
            entry(1, "\u{FFFD}\u{FFFD}", 2_000_000),
        ]));

        assert_eq!(report.corrections.len(), 2);
        assert_eq!(
            store.get(SlotId(1)),
            Some(&SlotRecord::new(SlotId(1), "Slot 1", 0))
        );
    }

    #[test]
    fn test_empty_update_changes_nothing() {
        let mut store = SlotStore::default();
        let report = store.apply(StoreUpdate::Snapshot(Vec::new()));
        assert_eq!(report, ApplyReport::default());
        assert_eq!(store.len(), 5);
        assert!(!store.is_established());
    }

    #[test]
    fn test_set_record_only_for_known_slots() {
        let mut store = SlotStore::default();
        let previous = store.set_record(SlotRecord::new(SlotId(1), "Slot 1", 9));
        assert_eq!(previous.map(|r| r.count), Some(10));
        assert!(store
            .set_record(SlotRecord::new(SlotId(42), "Nope", 1))
            .is_none());
    }
}
