//! Group dispense through a live sync engine

use async_trait::async_trait;
use dispensekit_communication::{Ack, DeviceGateway, SyncEngine, SyncEngineConfig};
use dispensekit_core::{RawSlot, SlotId, TransportError};
use dispensekit_profiles::{MemoryKeyValueStore, OperatorProfile, ProfileRegistry};
use serde_json::json;
use std::sync::Arc;

/// Slot 1 confirms and the device reports 7 left; slot 3 is unreachable
struct SplitGateway;

#[async_trait]
impl DeviceGateway for SplitGateway {
    async fn fetch_snapshot(&self) -> Result<Vec<RawSlot>, TransportError> {
        Ok((1..=5)
            .map(|id| {
                let count = if id == 1 { 7 } else { 20 };
                RawSlot::new(SlotId(id), Some(format!("Slot {}", id)), json!(count))
            })
            .collect())
    }

    async fn send_dispense(&self, slot: SlotId, _angle: u16) -> Result<Ack, TransportError> {
        if slot == SlotId(3) {
            return Err(TransportError::connection("no route to host"));
        }
        Ok(Ack::new(format!("Servo {} moved", slot)))
    }

    async fn send_update(
        &self,
        _slot: SlotId,
        _label: &str,
        _count: u32,
    ) -> Result<Ack, TransportError> {
        Ok(Ack::new("Updated"))
    }

    fn name(&self) -> &str {
        "split"
    }
}

#[tokio::test]
async fn partial_failure_confirms_one_and_rolls_back_the_other() {
    let engine = SyncEngine::new(Arc::new(SplitGateway), SyncEngineConfig::default());
    let slot3_before = engine.slot(SlotId(3)).unwrap();

    let registry = ProfileRegistry::load(Arc::new(MemoryKeyValueStore::new()), "profiles").await;
    registry
        .upsert(OperatorProfile::new("Alice", [SlotId(1), SlotId(3)]))
        .await
        .unwrap();
    registry
        .upsert(OperatorProfile::new("Bob", [SlotId(2)]))
        .await
        .unwrap();

    let report = registry.dispense_group(0, &engine).await.unwrap();

    assert_eq!(report.succeeded(), vec![SlotId(1)]);
    assert_eq!(report.failed()[0].0, SlotId(3));
    assert!(report.is_partial_failure());
    assert!(report.summary().starts_with("Partially dispensed for Alice"));
    assert_eq!(engine.banner(), Some(report.summary()));

    assert_eq!(engine.slot(SlotId(1)).unwrap().count, 7);
    assert_eq!(engine.slot(SlotId(2)).unwrap().count, 20);
    assert_eq!(engine.slot(SlotId(3)).unwrap().count, slot3_before.count);
}
