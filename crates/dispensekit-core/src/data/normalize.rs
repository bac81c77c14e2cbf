//! Normalization of raw device slot entries
//!
//! Both ingestion paths (HTTP snapshots and push-channel events) funnel every
//! entry through [`normalize_entry`] before anything reaches the store. The
//! device is known to report uninitialised label storage as runs of U+FFFD and
//! to report wrapped or uninitialised counters as huge or negative numbers;
//! both are corrected here and never surfaced as failures.

use super::{SlotId, SlotRecord, COUNT_SANITY_CEILING};
use serde_json::Value;

/// A slot entry as reported by the device, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawSlot {
    /// Slot identifier
    pub id: SlotId,
    /// Label, `None` when the device sent a non-string value
    pub label: Option<String>,
    /// Count exactly as reported
    pub count: Value,
}

impl RawSlot {
    /// Create a raw entry
    pub fn new(id: SlotId, label: Option<String>, count: Value) -> Self {
        Self { id, label, count }
    }
}

/// A correction applied during normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// Count was negative or above the sanity ceiling
    CountOutOfRange {
        /// Affected slot.
        slot: SlotId,
        /// The reported value.
        reported: String,
    },
    /// Count was not an integer
    CountNotNumeric {
        /// Affected slot.
        slot: SlotId,
        /// The reported value.
        reported: String,
    },
    /// Label was missing, blank or garbled
    LabelUnreadable {
        /// Affected slot.
        slot: SlotId,
    },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CountOutOfRange { slot, reported } => {
                write!(f, "slot {}: count {} out of range", slot, reported)
            }
            Self::CountNotNumeric { slot, reported } => {
                write!(f, "slot {}: count {} is not numeric", slot, reported)
            }
            Self::LabelUnreadable { slot } => write!(f, "slot {}: label unreadable", slot),
        }
    }
}

/// Check whether a label is unusable and must be replaced
///
/// A label is unreadable when it is blank, contains the Unicode replacement
/// character (what a failed decode of the device's label bytes turns into),
/// or contains control characters other than whitespace.
pub fn is_unreadable_label(label: &str) -> bool {
    label.trim().is_empty()
        || label
            .chars()
            .any(|c| c == char::REPLACEMENT_CHARACTER || (c.is_control() && !c.is_whitespace()))
}

/// Normalize one raw entry into a slot record
///
/// Returns the record together with the corrections that were needed.
pub fn normalize_entry(raw: RawSlot) -> (SlotRecord, Vec<ValidationIssue>) {
    let mut issues = Vec::new();
    let id = raw.id;

    let label = match raw.label {
        Some(label) if !is_unreadable_label(&label) => label,
        _ => {
            issues.push(ValidationIssue::LabelUnreadable { slot: id });
            SlotRecord::fallback_label(id)
        }
    };

    let count = match parse_count(id, &raw.count) {
        Ok(count) => count,
        Err(issue) => {
            issues.push(issue);
            0
        }
    };

    for issue in &issues {
        tracing::debug!("Corrected device entry: {}", issue);
    }

    (SlotRecord { id, label, count }, issues)
}

fn parse_count(slot: SlotId, value: &Value) -> Result<u32, ValidationIssue> {
    let not_numeric = || ValidationIssue::CountNotNumeric {
        slot,
        reported: value.to_string(),
    };
    let out_of_range = || ValidationIssue::CountOutOfRange {
        slot,
        reported: value.to_string(),
    };

    let whole = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i as f64
            } else if let Some(u) = n.as_u64() {
                u as f64
            } else {
                let f = n.as_f64().ok_or_else(not_numeric)?;
                if !f.is_finite() || f.fract() != 0.0 {
                    return Err(not_numeric());
                }
                f
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| not_numeric())? as f64,
        _ => return Err(not_numeric()),
    };

    if whole < 0.0 || whole > COUNT_SANITY_CEILING as f64 {
        return Err(out_of_range());
    }

    Ok(whole as u32)
}
