//! # DispenseKit Communication
//!
//! Transports and synchronization for DispenseKit.
//! Supports the dispenser's HTTP endpoints and its WebSocket push channel,
//! and provides the sync engine that keeps the slot store consistent with
//! the device.

pub mod gateway;
pub mod push;
pub mod sync;

pub use gateway::{
    http::DEFAULT_REQUEST_TIMEOUT, wire::parse_snapshot, Ack, DeviceGateway, HttpDeviceGateway,
};

pub use push::{InboundEnvelope, OutboundEnvelope, PushChannel, PushedSlot, DEFAULT_CONNECT_TIMEOUT};

pub use sync::{
    engine::DEFAULT_DISPENSE_ANGLE, CommandOutcome, CommandTicket, SyncEngine, SyncEngineConfig,
};
