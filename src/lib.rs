//! # DispenseKit
//!
//! Operator console for networked multi-slot dispensers with support for:
//! - Pulling slot state over HTTP and receiving pushed updates over WebSocket
//! - Optimistic dispense and correction commands with rollback on failure
//! - Persisted operator profiles that dispense several slots at once
//!
//! ## Architecture
//!
//! DispenseKit is organized as a workspace with multiple crates:
//!
//! 1. **dispensekit-core** - Slot store, normalization, command state machine, errors
//! 2. **dispensekit-communication** - HTTP gateway, push channel, sync engine
//! 3. **dispensekit-profiles** - Operator profiles and group dispensing
//! 4. **dispensekit-settings** - Configuration files
//! 5. **dispensekit** - Operator CLI that integrates all crates

pub mod app;
pub mod cli;

pub use app::App;

pub use dispensekit_core::{
    ApplyReport, CommandKind, CommandPhase, Error, EventDispatcher, PendingCommand, Result,
    SlotId, SlotRecord, SlotStore, SyncError, SyncEvent, TransportError,
};

pub use dispensekit_communication::{
    Ack, CommandOutcome, DeviceGateway, HttpDeviceGateway, PushChannel, SyncEngine,
    SyncEngineConfig,
};

pub use dispensekit_profiles::{
    GroupDispenseReport, OperatorProfile, ProfileError, ProfileRegistry,
};

pub use dispensekit_settings::{Config, LoggingSettings, SettingsManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging with:
/// - Output on stderr, pretty or JSON lines
/// - RUST_LOG environment variable support, falling back to the configured filter
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))?;

    let (pretty, json) = if settings.json {
        let layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_line_number(true);
        (None, Some(layer))
    } else {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();
        (Some(layer), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty)
        .with(json)
        .try_init()?;

    Ok(())
}
