//! Push channel
//!
//! Long-lived WebSocket link to the dispenser. The device pushes slot lists
//! and RFID scans; the client sends dispense and correction frames.

pub mod channel;
pub mod envelope;

pub use channel::{PushChannel, DEFAULT_CONNECT_TIMEOUT};
pub use envelope::{InboundEnvelope, OutboundEnvelope, PushedSlot};
