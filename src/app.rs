//! Application wiring
//!
//! Builds the sync engine and the profile registry from a configuration.

use dispensekit_communication::{HttpDeviceGateway, PushChannel, SyncEngine, SyncEngineConfig};
use dispensekit_core::{SlotStore, TransportError};
use dispensekit_profiles::{FileKeyValueStore, ProfileRegistry};
use dispensekit_settings::Config;
use std::path::PathBuf;
use std::sync::Arc;

/// A configured engine and registry
pub struct App {
    pub config: Config,
    pub engine: Arc<SyncEngine>,
    pub profiles: ProfileRegistry,
}

impl App {
    /// Build from `config`, keeping local data under `data_dir`
    pub async fn new(config: Config, data_dir: PathBuf) -> anyhow::Result<Self> {
        let gateway =
            HttpDeviceGateway::new(config.device.base_url.clone(), config.request_timeout())?;
        let engine = SyncEngine::with_store(
            Arc::new(gateway),
            SlotStore::new(config.default_slots()),
            SyncEngineConfig {
                dispense_angle: config.device.dispense_angle,
            },
        );

        let storage = FileKeyValueStore::new(data_dir);
        tracing::debug!("Profile storage at {}", storage.dir().display());
        let profiles =
            ProfileRegistry::load(Arc::new(storage), config.storage.profiles_key.clone()).await;

        Ok(Self {
            config,
            engine: Arc::new(engine),
            profiles,
        })
    }

    /// Open the push channel, feeding pushed data into the engine
    pub async fn connect_push(&self) -> Result<PushChannel, TransportError> {
        PushChannel::connect(
            &self.config.device.push_url,
            self.engine.clone(),
            self.config.request_timeout(),
        )
        .await
    }
}
