//! Operator profile model
//!
//! A profile names an operator and the slots dispensed for them in one go.
//! Stored selections may be slot ids or the older checkbox list, where the
//! position of each `true` entry is the 0-based slot index.

use dispensekit_core::SlotId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// A named operator with the slots dispensed together for them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorProfile {
    /// Display name, unique within a registry
    pub name: String,
    /// Slot ids, not checked against the current slot topology
    #[serde(default, deserialize_with = "deserialize_selection")]
    pub selected_slots: BTreeSet<SlotId>,
}

impl OperatorProfile {
    /// Create a profile selecting `slots`
    pub fn new(name: impl Into<String>, slots: impl IntoIterator<Item = SlotId>) -> Self {
        Self {
            name: name.into(),
            selected_slots: slots.into_iter().collect(),
        }
    }

    /// Check if `slot` is part of the selection
    pub fn is_selected(&self, slot: SlotId) -> bool {
        self.selected_slots.contains(&slot)
    }

    /// Select `slot` if it is not selected, deselect it otherwise
    pub fn toggle(&mut self, slot: SlotId) {
        if !self.selected_slots.remove(&slot) {
            self.selected_slots.insert(slot);
        }
    }
}

impl std::fmt::Display for OperatorProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots: Vec<String> = self.selected_slots.iter().map(|s| s.to_string()).collect();
        write!(f, "{} [{}]", self.name, slots.join(", "))
    }
}

/// Accepts slot ids, or the older per-position checkbox list
#[derive(Deserialize)]
#[serde(untagged)]
enum Selection {
    Ids(Vec<u32>),
    Flags(Vec<bool>),
}

fn deserialize_selection<'de, D>(deserializer: D) -> Result<BTreeSet<SlotId>, D::Error>
where
    D: Deserializer<'de>,
{
    let selection = match Selection::deserialize(deserializer)? {
        Selection::Ids(ids) => ids.into_iter().filter_map(SlotId::new).collect(),
        Selection::Flags(flags) => flags
            .into_iter()
            .enumerate()
            .filter(|(_, selected)| *selected)
            .map(|(index, _)| SlotId::from_index(index))
            .collect(),
    };
    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_shape() {
        let profile = OperatorProfile::new("Alice", [SlotId(3), SlotId(1)]);
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value, json!({"name": "Alice", "selected_slots": [1, 3]}));
    }

    #[test]
    fn test_checkbox_selection_is_read() {
        let profile: OperatorProfile = serde_json::from_value(json!({
            "name": "Bob",
            "selected_slots": [true, false, true, false, false]
        }))
        .unwrap();
        assert_eq!(profile, OperatorProfile::new("Bob", [SlotId(1), SlotId(3)]));
    }

    #[test]
    fn test_missing_selection_is_empty() {
        let profile: OperatorProfile = serde_json::from_value(json!({"name": "Eve"})).unwrap();
        assert!(profile.selected_slots.is_empty());
    }

    #[test]
    fn test_toggle() {
        let mut profile = OperatorProfile::new("Alice", [SlotId(1)]);
        profile.toggle(SlotId(1));
        profile.toggle(SlotId(2));
        assert!(!profile.is_selected(SlotId(1)));
        assert!(profile.is_selected(SlotId(2)));
    }
}
