//! Group dispensing
//!
//! Fans a single dispense out to every slot a profile selects. Each slot is
//! dispensed independently; one failure does not stop the others.

use crate::model::OperatorProfile;
use dispensekit_core::{DispenseReceipt, SlotDispenser, SlotId, SyncError};
use futures_util::future::join_all;

/// Outcome of one slot in a group dispense
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOutcome {
    pub slot: SlotId,
    pub result: Result<DispenseReceipt, SyncError>,
}

/// Per-slot results of a group dispense
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDispenseReport {
    /// Name of the profile that was dispensed
    pub profile: String,
    /// One entry per selected slot, in slot order
    pub outcomes: Vec<SlotOutcome>,
}

impl GroupDispenseReport {
    /// Slots that were confirmed by the device
    pub fn succeeded(&self) -> Vec<SlotId> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.slot)
            .collect()
    }

    /// Slots that failed, with their errors
    pub fn failed(&self) -> Vec<(SlotId, &SyncError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.slot, e)))
            .collect()
    }

    /// Whether some but not all slots failed
    pub fn is_partial_failure(&self) -> bool {
        let failed = self.failed().len();
        failed > 0 && failed < self.outcomes.len()
    }

    /// Whether every selected slot was dispensed
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Short text for the message banner
    pub fn summary(&self) -> String {
        if self.outcomes.is_empty() {
            return format!("No slots selected for {}", self.profile);
        }

        let failed = self.failed();
        if failed.is_empty() {
            return format!(
                "Dispensed {} slot(s) for {}",
                self.outcomes.len(),
                self.profile
            );
        }

        let failures: Vec<String> = failed
            .iter()
            .map(|(slot, e)| format!("slot {} ({})", slot, e.user_message()))
            .collect();
        let succeeded = self.succeeded();
        if succeeded.is_empty() {
            format!(
                "Dispense failed for {}: {}",
                self.profile,
                failures.join(", ")
            )
        } else {
            let ok: Vec<String> = succeeded.iter().map(|s| s.to_string()).collect();
            format!(
                "Partially dispensed for {}: slots {} done; failed {}",
                self.profile,
                ok.join(", "),
                failures.join(", ")
            )
        }
    }
}

/// Dispense every slot selected by `profile`
pub async fn dispense_group(
    profile: &OperatorProfile,
    dispenser: &dyn SlotDispenser,
) -> GroupDispenseReport {
    let slots: Vec<SlotId> = profile.selected_slots.iter().copied().collect();
    tracing::info!("Group dispense for {}: slots {:?}", profile.name, slots);

    let results = join_all(slots.iter().map(|slot| dispenser.dispense_slot(*slot))).await;

    let outcomes: Vec<SlotOutcome> = slots
        .into_iter()
        .zip(results)
        .map(|(slot, result)| SlotOutcome { slot, result })
        .collect();

    let report = GroupDispenseReport {
        profile: profile.name.clone(),
        outcomes,
    };
    let summary = report.summary();
    if report.is_success() {
        tracing::info!("{}", summary);
    } else {
        tracing::warn!("{}", summary);
    }
    dispenser.report(&summary);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dispensekit_core::TransportError;
    use parking_lot::Mutex;

    struct FakeDispenser {
        failing: Vec<SlotId>,
        calls: Mutex<Vec<SlotId>>,
        reported: Mutex<Option<String>>,
    }

    #[async_trait]
    impl SlotDispenser for FakeDispenser {
        async fn dispense_slot(&self, slot: SlotId) -> Result<DispenseReceipt, SyncError> {
            self.calls.lock().push(slot);
            if self.failing.contains(&slot) {
                return Err(TransportError::connection("refused").into());
            }
            Ok(DispenseReceipt {
                slot,
                message: format!("Servo {} moved", slot),
                count: Some(1),
            })
        }

        fn report(&self, summary: &str) {
            *self.reported.lock() = Some(summary.to_string());
        }
    }

    fn dispenser(failing: &[u32]) -> FakeDispenser {
        FakeDispenser {
            failing: failing.iter().map(|id| SlotId(*id)).collect(),
            calls: Mutex::new(Vec::new()),
            reported: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn test_only_selected_slots_are_dispensed() {
        let fake = dispenser(&[]);
        let profile = OperatorProfile::new("Alice", [SlotId(4), SlotId(2)]);

        let report = dispense_group(&profile, &fake).await;

        let mut calls = fake.calls.lock().clone();
        calls.sort();
        assert_eq!(calls, vec![SlotId(2), SlotId(4)]);
        assert!(report.is_success());
        assert_eq!(report.summary(), "Dispensed 2 slot(s) for Alice");
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_slots() {
        let fake = dispenser(&[3]);
        let profile = OperatorProfile::new("Bob", [SlotId(1), SlotId(3), SlotId(5)]);

        let report = dispense_group(&profile, &fake).await;

        assert_eq!(fake.calls.lock().len(), 3);
        assert_eq!(report.succeeded(), vec![SlotId(1), SlotId(5)]);
        assert_eq!(report.failed().len(), 1);
        assert!(report.is_partial_failure());
        assert_eq!(
            report.summary(),
            "Partially dispensed for Bob: slots 1, 5 done; failed slot 3 \
             (Error: Could not connect to the dispenser)"
        );
        assert_eq!(fake.reported.lock().clone(), Some(report.summary()));
    }

    #[tokio::test]
    async fn test_empty_selection() {
        let fake = dispenser(&[]);
        let report = dispense_group(&OperatorProfile::new("Eve", []), &fake).await;

        assert!(report.outcomes.is_empty());
        assert_eq!(report.summary(), "No slots selected for Eve");
    }

    #[tokio::test]
    async fn test_total_failure() {
        let fake = dispenser(&[1]);
        let report = dispense_group(&OperatorProfile::new("Zed", [SlotId(1)]), &fake).await;

        assert!(!report.is_partial_failure());
        assert_eq!(
            report.summary(),
            "Dispense failed for Zed: slot 1 (Error: Could not connect to the dispenser)"
        );
    }
}
