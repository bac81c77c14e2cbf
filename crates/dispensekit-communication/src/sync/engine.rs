//! Optimistic command execution and reconciliation
//!
//! A command mutates the store before the device answers. On success the
//! store is refreshed from the device; on failure the speculative write is
//! reverted, unless the device has reported that slot since the command was
//! issued, in which case the device's value is kept.
//!
//! Locks are never held across an `.await`. When both are needed the
//! in-flight table is locked before the store.
//!
//! The device call and the reconciliation that follows it run on a spawned
//! task, so a caller that stops waiting never leaves a slot pending.

use crate::gateway::{Ack, DeviceGateway};
use async_trait::async_trait;
use chrono::Utc;
use dispensekit_core::{
    ApplyReport, CommandEvent, CommandKind, CommandPhase, CommandRequest, DispenseReceipt,
    EventDispatcher, InvalidTransition, PendingCommand, PushSink, RawSlot, SlotDispenser, SlotId,
    SlotRecord, SlotStore, StoreUpdate, SyncError, SyncEvent, TransportError,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Servo angle the stock firmware expects for one dispense
pub const DEFAULT_DISPENSE_ANGLE: u16 = 90;

/// Sync engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncEngineConfig {
    /// Angle sent with every dispense request
    pub dispense_angle: u16,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            dispense_angle: DEFAULT_DISPENSE_ANGLE,
        }
    }
}

/// Handle to an issued, not yet executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTicket {
    id: Uuid,
    request: CommandRequest,
}

impl CommandTicket {
    /// Unique id of the command attempt
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Target slot
    pub fn slot(&self) -> SlotId {
        self.request.slot()
    }

    /// The request this ticket will send
    pub fn request(&self) -> &CommandRequest {
        &self.request
    }
}

/// Result of a confirmed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Target slot
    pub slot: SlotId,
    /// Command kind
    pub kind: CommandKind,
    /// Acknowledgement text from the device
    pub message: String,
    /// Count after the post-confirmation refresh, `None` if it failed
    pub count: Option<u32>,
}

#[derive(Debug)]
struct InFlight {
    command: PendingCommand,
    phase: CommandPhase,
}

#[derive(Debug, Default)]
struct Ambient {
    banner: Option<String>,
    last_tag: Option<String>,
}

/// Owner of the slot store and every pending command
///
/// Clones are handles to the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    gateway: Arc<dyn DeviceGateway>,
    store: Arc<RwLock<SlotStore>>,
    in_flight: Arc<Mutex<HashMap<SlotId, InFlight>>>,
    ambient: Arc<RwLock<Ambient>>,
    events: EventDispatcher,
    attached: Arc<AtomicBool>,
    config: SyncEngineConfig,
}

impl SyncEngine {
    /// Create an engine seeded with the compiled-in default slots
    pub fn new(gateway: Arc<dyn DeviceGateway>, config: SyncEngineConfig) -> Self {
        Self::with_store(gateway, SlotStore::default(), config)
    }

    /// Create an engine around an existing store
    pub fn with_store(
        gateway: Arc<dyn DeviceGateway>,
        store: SlotStore,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            gateway,
            store: Arc::new(RwLock::new(store)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            ambient: Arc::new(RwLock::new(Ambient::default())),
            events: EventDispatcher::default(),
            attached: Arc::new(AtomicBool::new(true)),
            config,
        }
    }

    /// Subscribe to store and command events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Snapshot of every slot in id order
    pub fn records(&self) -> Vec<SlotRecord> {
        self.store.read().records()
    }

    /// Current record of one slot
    pub fn slot(&self, id: SlotId) -> Option<SlotRecord> {
        self.store.read().get(id).cloned()
    }

    /// Store generation, bumped by every applied device report
    pub fn generation(&self) -> u64 {
        self.store.read().generation()
    }

    /// Most recent status or error text
    pub fn banner(&self) -> Option<String> {
        self.ambient.read().banner.clone()
    }

    /// Most recently scanned RFID tag
    pub fn last_tag(&self) -> Option<String> {
        self.ambient.read().last_tag.clone()
    }

    /// Pending command for `slot`, if any
    pub fn pending(&self, slot: SlotId) -> Option<PendingCommand> {
        self.in_flight
            .lock()
            .get(&slot)
            .map(|entry| entry.command.clone())
    }

    /// Lifecycle phase of the command for `slot`
    pub fn phase(&self, slot: SlotId) -> CommandPhase {
        self.in_flight
            .lock()
            .get(&slot)
            .map(|entry| entry.phase)
            .unwrap_or(CommandPhase::Idle)
    }

    /// Whether results are still being applied
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Stop applying results; outstanding calls finish but change nothing
    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        tracing::info!("Sync engine detached");
    }

    /// Refresh triggered by the view becoming active for the first time
    pub async fn on_mount(&self) -> Result<ApplyReport, SyncError> {
        tracing::debug!("Refreshing on mount");
        self.refresh().await
    }

    /// Refresh triggered by the view regaining focus
    pub async fn on_focus(&self) -> Result<ApplyReport, SyncError> {
        tracing::debug!("Refreshing on focus");
        self.refresh().await
    }

    /// Replace the store contents with the device's snapshot
    ///
    /// A failed fetch leaves the store untouched and reports the error
    /// through the banner.
    pub async fn refresh(&self) -> Result<ApplyReport, SyncError> {
        match self.gateway.fetch_snapshot().await {
            Ok(entries) => {
                if !self.is_attached() {
                    tracing::debug!("Discarding snapshot received after detach");
                    return Ok(ApplyReport::default());
                }
                Ok(self.apply(StoreUpdate::Snapshot(entries)))
            }
            Err(e) => {
                let error = SyncError::from(e);
                tracing::warn!("Snapshot fetch via {} failed: {}", self.gateway.name(), error);
                if self.is_attached() {
                    self.set_banner(error.user_message());
                }
                Err(error)
            }
        }
    }

    /// Apply a slot list pushed by the device
    pub fn ingest_push(&self, entries: Vec<RawSlot>) -> ApplyReport {
        if !self.is_attached() {
            return ApplyReport::default();
        }
        self.apply(StoreUpdate::Push(entries))
    }

    /// Record a scanned RFID tag
    pub fn ingest_tag(&self, tag: String) {
        if !self.is_attached() {
            return;
        }
        self.ambient.write().last_tag = Some(tag.clone());
        self.events.publish(SyncEvent::TagScanned(tag));
    }

    /// Dispense one item from `slot`
    pub async fn dispense(&self, slot: SlotId) -> Result<CommandOutcome, SyncError> {
        let ticket = self.issue(CommandRequest::Dispense { slot })?;
        self.execute(ticket).await
    }

    /// Correct the label and count of `slot`
    pub async fn update_slot(
        &self,
        slot: SlotId,
        label: impl Into<String>,
        count: u32,
    ) -> Result<CommandOutcome, SyncError> {
        let ticket = self.issue(CommandRequest::Update {
            slot,
            label: label.into(),
            count,
        })?;
        self.execute(ticket).await
    }

    /// Apply the speculative mutation and register the command as pending
    ///
    /// Fails without touching the store when the slot is unknown or
    /// already has an unresolved command.
    pub fn issue(&self, request: CommandRequest) -> Result<CommandTicket, SyncError> {
        let slot = request.slot();
        let mut in_flight = self.in_flight.lock();
        if in_flight.contains_key(&slot) {
            tracing::warn!("Rejected command for slot {}: already in flight", slot);
            return Err(SyncError::CommandAlreadyInFlight { slot });
        }

        let mut store = self.store.write();
        let previous = store
            .get(slot)
            .cloned()
            .ok_or(SyncError::UnknownSlot { slot })?;
        let phase = CommandPhase::Idle
            .transition(CommandEvent::Issue)
            .map_err(|e| invalid(slot, e))?;

        let optimistic = request.optimistic(&previous);
        let kind = request.kind(&previous);
        store.set_record(optimistic.clone());

        let command = PendingCommand {
            id: Uuid::new_v4(),
            slot,
            kind,
            issued_at: Utc::now(),
            previous,
            optimistic,
            device_revision: store.revision(slot),
        };
        drop(store);

        let id = command.id;
        in_flight.insert(slot, InFlight { command, phase });
        drop(in_flight);

        tracing::info!("Issued {} for slot {}", kind, slot);
        self.events.publish(SyncEvent::CommandIssued { slot, kind });
        Ok(CommandTicket { id, request })
    }

    /// Send an issued command and reconcile the store with its outcome
    ///
    /// Dropping the returned future does not cancel the command: the
    /// request still completes and its outcome is applied.
    pub async fn execute(&self, ticket: CommandTicket) -> Result<CommandOutcome, SyncError> {
        let slot = ticket.slot();
        let engine = self.clone();
        tokio::spawn(async move { engine.run(ticket).await })
            .await
            .map_err(|e| {
                tracing::error!("Command task for slot {} ended abnormally: {}", slot, e);
                SyncError::CommandAborted { slot }
            })?
    }

    /// Show a status message in the banner
    pub fn post_status(&self, message: impl Into<String>) {
        if self.is_attached() {
            self.set_banner(message.into());
        }
    }

    async fn run(&self, ticket: CommandTicket) -> Result<CommandOutcome, SyncError> {
        let command = self.advance(&ticket, CommandEvent::Send)?;

        let result = match &ticket.request {
            CommandRequest::Dispense { slot } => {
                self.gateway
                    .send_dispense(*slot, self.config.dispense_angle)
                    .await
            }
            CommandRequest::Update { slot, label, count } => {
                self.gateway.send_update(*slot, label, *count).await
            }
        };

        match result {
            Ok(ack) => self.confirm(&ticket, &command, ack).await,
            Err(e) => Err(self.roll_back(&ticket, &command, e)),
        }
    }

    async fn confirm(
        &self,
        ticket: &CommandTicket,
        command: &PendingCommand,
        ack: Ack,
    ) -> Result<CommandOutcome, SyncError> {
        self.advance(ticket, CommandEvent::Succeed)?;
        self.settle(ticket)?;
        tracing::info!(
            "{} on slot {} confirmed: {}",
            command.kind,
            command.slot,
            ack.message
        );

        let mut outcome = CommandOutcome {
            slot: command.slot,
            kind: command.kind,
            message: ack.message,
            count: None,
        };
        if !self.is_attached() {
            return Ok(outcome);
        }

        self.set_banner(outcome.message.clone());
        self.events.publish(SyncEvent::CommandConfirmed {
            slot: command.slot,
            kind: command.kind,
        });

        if self.refresh().await.is_ok() {
            outcome.count = self.slot(command.slot).map(|record| record.count);
        }
        Ok(outcome)
    }

    fn roll_back(
        &self,
        ticket: &CommandTicket,
        command: &PendingCommand,
        error: TransportError,
    ) -> SyncError {
        let error = SyncError::from(error);
        if let Err(e) = self.advance(ticket, CommandEvent::Fail) {
            return e;
        }
        tracing::warn!("{} on slot {} failed: {}", command.kind, command.slot, error);

        if self.is_attached() {
            let mut store = self.store.write();
            if store.revision(command.slot) == command.device_revision {
                store.set_record(command.previous.clone());
            } else {
                tracing::debug!(
                    "Slot {} changed on the device since issue, keeping device value",
                    command.slot
                );
            }
            drop(store);

            self.set_banner(error.user_message());
            self.events.publish(SyncEvent::CommandRolledBack {
                slot: command.slot,
                kind: command.kind,
            });
        }

        if let Err(e) = self.settle(ticket) {
            return e;
        }
        error
    }

    fn advance(
        &self,
        ticket: &CommandTicket,
        event: CommandEvent,
    ) -> Result<PendingCommand, SyncError> {
        let slot = ticket.slot();
        let mut in_flight = self.in_flight.lock();
        let entry = in_flight
            .get_mut(&slot)
            .filter(|entry| entry.command.id == ticket.id)
            .ok_or(SyncError::StaleTicket { slot })?;
        entry.phase = entry.phase.transition(event).map_err(|e| invalid(slot, e))?;
        Ok(entry.command.clone())
    }

    fn settle(&self, ticket: &CommandTicket) -> Result<(), SyncError> {
        self.advance(ticket, CommandEvent::Settle)?;
        self.in_flight.lock().remove(&ticket.slot());
        Ok(())
    }

    fn apply(&self, update: StoreUpdate) -> ApplyReport {
        let report = self.store.write().apply(update);
        for issue in &report.corrections {
            tracing::debug!("Corrected device data: {}", issue);
        }
        if report.applied > 0 {
            self.events.publish(SyncEvent::SlotsChanged {
                generation: self.generation(),
            });
        }
        report
    }

    fn set_banner(&self, message: String) {
        self.ambient.write().banner = Some(message.clone());
        self.events.publish(SyncEvent::Banner(message));
    }
}

fn invalid(slot: SlotId, error: InvalidTransition) -> SyncError {
    tracing::error!("Slot {}: {}", slot, error);
    SyncError::StaleTicket { slot }
}

#[async_trait]
impl SlotDispenser for SyncEngine {
    async fn dispense_slot(&self, slot: SlotId) -> Result<DispenseReceipt, SyncError> {
        let outcome = self.dispense(slot).await?;
        Ok(DispenseReceipt {
            slot: outcome.slot,
            message: outcome.message,
            count: outcome.count,
        })
    }

    fn report(&self, summary: &str) {
        self.post_status(summary);
    }
}

impl PushSink for SyncEngine {
    fn on_slots(&self, entries: Vec<RawSlot>) {
        self.ingest_push(entries);
    }

    fn on_tag(&self, tag: String) {
        self.ingest_tag(tag);
    }

    fn on_closed(&self) {
        tracing::warn!("Push channel closed; slots keep their last known values");
        self.events.publish(SyncEvent::ChannelClosed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedGateway {
        snapshot: Vec<RawSlot>,
        fail_commands: bool,
    }

    #[async_trait]
    impl DeviceGateway for FixedGateway {
        async fn fetch_snapshot(&self) -> Result<Vec<RawSlot>, TransportError> {
            Ok(self.snapshot.clone())
        }

        async fn send_dispense(&self, slot: SlotId, _angle: u16) -> Result<Ack, TransportError> {
            if self.fail_commands {
                return Err(TransportError::connection("unreachable"));
            }
            Ok(Ack::new(format!("Servo {} moved", slot)))
        }

        async fn send_update(
            &self,
            _slot: SlotId,
            _label: &str,
            _count: u32,
        ) -> Result<Ack, TransportError> {
            if self.fail_commands {
                return Err(TransportError::connection("unreachable"));
            }
            Ok(Ack::new("Updated"))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn engine(fail_commands: bool) -> SyncEngine {
        let snapshot = vec![
            RawSlot::new(SlotId(1), Some("Aspirin".into()), json!(9)),
            RawSlot::new(SlotId(2), Some("Zinc".into()), json!(4)),
        ];
        SyncEngine::new(
            Arc::new(FixedGateway {
                snapshot,
                fail_commands,
            }),
            SyncEngineConfig::default(),
        )
    }

    #[test]
    fn test_issue_applies_optimistic_decrement() {
        let engine = engine(false);
        let before = engine.slot(SlotId(1)).unwrap();

        let ticket = engine
            .issue(CommandRequest::Dispense { slot: SlotId(1) })
            .unwrap();

        assert_eq!(ticket.slot(), SlotId(1));
        assert_eq!(engine.slot(SlotId(1)).unwrap().count, before.count - 1);
        assert_eq!(engine.phase(SlotId(1)), CommandPhase::Optimistic);
        assert_eq!(engine.pending(SlotId(1)).unwrap().previous, before);
    }

    #[test]
    fn test_second_issue_is_rejected_without_mutation() {
        let engine = engine(false);
        engine
            .issue(CommandRequest::Dispense { slot: SlotId(1) })
            .unwrap();
        let after_first = engine.slot(SlotId(1)).unwrap();

        let err = engine
            .issue(CommandRequest::Dispense { slot: SlotId(1) })
            .unwrap_err();

        assert_eq!(err, SyncError::CommandAlreadyInFlight { slot: SlotId(1) });
        assert_eq!(engine.slot(SlotId(1)).unwrap(), after_first);
    }

    #[test]
    fn test_unknown_slot_is_rejected() {
        let engine = engine(false);
        let err = engine
            .issue(CommandRequest::Dispense { slot: SlotId(42) })
            .unwrap_err();
        assert_eq!(err, SyncError::UnknownSlot { slot: SlotId(42) });
        assert_eq!(engine.phase(SlotId(42)), CommandPhase::Idle);
    }

    #[tokio::test]
    async fn test_confirmed_dispense_refreshes_from_device() {
        let engine = engine(false);
        let outcome = engine.dispense(SlotId(1)).await.unwrap();

        assert_eq!(outcome.kind, CommandKind::Dispense);
        assert_eq!(outcome.message, "Servo 1 moved");
        assert_eq!(outcome.count, Some(9));
        assert_eq!(engine.slot(SlotId(1)).unwrap().label, "Aspirin");
        assert_eq!(engine.banner().as_deref(), Some("Servo 1 moved"));
        assert_eq!(engine.phase(SlotId(1)), CommandPhase::Idle);
    }

    #[tokio::test]
    async fn test_failed_dispense_restores_previous_record() {
        let engine = engine(true);
        let before = engine.records();

        let err = engine.dispense(SlotId(3)).await.unwrap_err();

        assert!(err.is_transport());
        assert_eq!(engine.records(), before);
        assert_eq!(
            engine.banner().as_deref(),
            Some("Error: Could not connect to the dispenser")
        );
        assert!(engine.pending(SlotId(3)).is_none());
    }

    #[tokio::test]
    async fn test_stale_ticket_is_rejected() {
        let engine = engine(false);
        let ticket = engine
            .issue(CommandRequest::Dispense { slot: SlotId(2) })
            .unwrap();
        engine.execute(ticket.clone()).await.unwrap();

        let err = engine.execute(ticket).await.unwrap_err();
        assert_eq!(err, SyncError::StaleTicket { slot: SlotId(2) });
    }

    #[tokio::test]
    async fn test_detached_engine_ignores_results() {
        let engine = engine(false);
        let before = engine.records();
        engine.detach();

        let report = engine.refresh().await.unwrap();
        assert_eq!(report, ApplyReport::default());
        engine.ingest_tag("04A1".to_string());

        assert_eq!(engine.records(), before);
        assert_eq!(engine.last_tag(), None);
        assert_eq!(engine.banner(), None);
    }

    #[test]
    fn test_push_sink_updates_store_and_tag() {
        let engine = engine(false);
        engine.on_slots(vec![RawSlot::new(SlotId(1), Some("Iron".into()), json!(7))]);
        engine.on_tag("04A1".to_string());

        assert_eq!(engine.slot(SlotId(1)).unwrap().label, "Iron");
        assert_eq!(engine.records().len(), 1);
        assert_eq!(engine.last_tag().as_deref(), Some("04A1"));
    }
}
