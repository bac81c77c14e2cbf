//! Error handling for DispenseKit
//!
//! Provides the error taxonomy shared by every layer:
//! - Transport errors (device unreachable, timeout, malformed payloads)
//! - Sync errors (command guard rejections, unknown slots)
//! - Persistence errors (local key-value storage)
//!
//! Validation problems found while normalizing device data are not errors;
//! they are recorded as [`crate::data::ValidationIssue`] and corrected in place.

use crate::data::SlotId;
use thiserror::Error;

/// Transport error type
///
/// Represents failures talking to the dispenser, over HTTP or the push channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The device could not be reached
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The reason the connection failed.
        reason: String,
    },

    /// The device did not answer in time
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// The device answered with a payload of the wrong shape
    #[error("Malformed response: {reason}")]
    MalformedResponse {
        /// What was wrong with the payload.
        reason: String,
    },

    /// The device answered with a non-success HTTP status
    #[error("Device rejected request with status {status}")]
    Rejected {
        /// The HTTP status code.
        status: u16,
    },

    /// The push channel is closed
    #[error("Push channel closed")]
    ChannelClosed,
}

impl TransportError {
    /// Create a malformed response error from a message
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    /// Create a connection failure from a message
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            reason: reason.into(),
        }
    }
}

/// Sync error type
///
/// Errors returned by the sync engine when issuing or resolving commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The gateway call failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A command for this slot is still unresolved
    #[error("A command for slot {slot} is already in flight")]
    CommandAlreadyInFlight {
        /// The slot that already has a pending command.
        slot: SlotId,
    },

    /// No record exists for this slot id
    #[error("Unknown slot {slot}")]
    UnknownSlot {
        /// The slot that was not found.
        slot: SlotId,
    },

    /// The ticket does not match the pending command for its slot
    #[error("Stale command ticket for slot {slot}")]
    StaleTicket {
        /// The slot the ticket was issued for.
        slot: SlotId,
    },

    /// The task running the command stopped before reporting an outcome
    #[error("Command task for slot {slot} was aborted")]
    CommandAborted {
        /// The slot the command targeted.
        slot: SlotId,
    },
}

impl SyncError {
    /// Short text suitable for the message banner
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Transport(TransportError::MalformedResponse { .. }) => {
                "Error: Invalid response format from the dispenser".to_string()
            }
            SyncError::Transport(TransportError::Timeout { .. }) => {
                "Error: The dispenser did not respond in time".to_string()
            }
            SyncError::Transport(_) => "Error: Could not connect to the dispenser".to_string(),
            SyncError::CommandAlreadyInFlight { slot } => {
                format!("Slot {} is still busy, please wait", slot)
            }
            SyncError::UnknownSlot { slot } => format!("Error: Slot {} does not exist", slot),
            SyncError::StaleTicket { slot } => {
                format!("Error: Command for slot {} was superseded", slot)
            }
            SyncError::CommandAborted { slot } => {
                format!("Error: Command for slot {} was interrupted", slot)
            }
        }
    }

    /// Check if this error came from the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}

/// Persistence error type
///
/// Failures reading or writing local key-value storage.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored payload has an unexpected shape
    #[error("Corrupted record '{key}': {reason}")]
    Corrupted {
        /// The storage key.
        key: String,
        /// What was wrong with the payload.
        reason: String,
    },
}

/// Main error type for DispenseKit
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Sync error
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Persistence error
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::Timeout { .. })
                | Error::Sync(SyncError::Transport(TransportError::Timeout { .. }))
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
