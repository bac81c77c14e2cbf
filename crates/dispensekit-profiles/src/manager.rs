//! Operator profile registry
//!
//! Profiles are kept in their persisted order and written back in full after
//! every mutation. A registry that cannot be read starts empty, and a failed
//! write is logged while the in-memory change stands.

use crate::error::{ProfileError, ProfileResult};
use crate::group::{dispense_group, GroupDispenseReport};
use crate::model::OperatorProfile;
use crate::storage::KeyValueStore;
use dispensekit_core::{PersistenceError, SlotDispenser};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage key used when none is configured
pub const DEFAULT_PROFILES_KEY: &str = "operator_profiles";

/// Ordered list of operator profiles backed by a key-value store
pub struct ProfileRegistry {
    store: Arc<dyn KeyValueStore>,
    key: String,
    profiles: Mutex<Vec<OperatorProfile>>,
}

impl ProfileRegistry {
    /// Load the registry stored under `key`
    ///
    /// Read failures and corrupt payloads are logged and yield an empty
    /// registry.
    pub async fn load(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let profiles = match read_profiles(store.as_ref(), &key).await {
            Ok(profiles) => {
                tracing::debug!("Loaded {} operator profiles", profiles.len());
                profiles
            }
            Err(e) => {
                tracing::warn!("Starting with no profiles: {}", e);
                Vec::new()
            }
        };

        Self {
            store,
            key,
            profiles: Mutex::new(profiles),
        }
    }

    /// All profiles in persisted order
    pub async fn list(&self) -> Vec<OperatorProfile> {
        self.profiles.lock().await.clone()
    }

    /// Profile at `index`
    pub async fn get(&self, index: usize) -> Option<OperatorProfile> {
        self.profiles.lock().await.get(index).cloned()
    }

    /// Position of the profile named `name`
    pub async fn position(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.profiles
            .lock()
            .await
            .iter()
            .position(|p| p.name == name)
    }

    /// Number of profiles
    pub async fn len(&self) -> usize {
        self.profiles.lock().await.len()
    }

    /// Check if the registry holds no profiles
    pub async fn is_empty(&self) -> bool {
        self.profiles.lock().await.is_empty()
    }

    /// Add a profile, or overwrite the one with the same name in place
    ///
    /// Returns the profile's position.
    pub async fn upsert(&self, profile: OperatorProfile) -> ProfileResult<usize> {
        let profile = validated(profile)?;
        let mut profiles = self.profiles.lock().await;

        let index = match profiles.iter().position(|p| p.name == profile.name) {
            Some(index) => {
                profiles[index] = profile;
                index
            }
            None => {
                profiles.push(profile);
                profiles.len() - 1
            }
        };

        self.persist(&profiles).await;
        tracing::info!("Saved profile {} at index {}", profiles[index].name, index);
        Ok(index)
    }

    /// Overwrite the profile at `index`
    pub async fn replace(&self, index: usize, profile: OperatorProfile) -> ProfileResult<()> {
        let profile = validated(profile)?;
        let mut profiles = self.profiles.lock().await;
        let len = profiles.len();
        let slot = profiles
            .get_mut(index)
            .ok_or(ProfileError::IndexOutOfRange { index, len })?;
        *slot = profile;

        self.persist(&profiles).await;
        Ok(())
    }

    /// Delete the profile at `index`; later profiles move up by one
    pub async fn remove(&self, index: usize) -> ProfileResult<OperatorProfile> {
        let mut profiles = self.profiles.lock().await;
        if index >= profiles.len() {
            return Err(ProfileError::IndexOutOfRange {
                index,
                len: profiles.len(),
            });
        }
        let removed = profiles.remove(index);

        self.persist(&profiles).await;
        tracing::info!("Removed profile {}", removed.name);
        Ok(removed)
    }

    /// Dispense every slot selected by the profile at `index`
    pub async fn dispense_group(
        &self,
        index: usize,
        dispenser: &dyn SlotDispenser,
    ) -> ProfileResult<GroupDispenseReport> {
        let profile = {
            let profiles = self.profiles.lock().await;
            profiles
                .get(index)
                .cloned()
                .ok_or(ProfileError::IndexOutOfRange {
                    index,
                    len: profiles.len(),
                })?
        };
        Ok(dispense_group(&profile, dispenser).await)
    }

    async fn persist(&self, profiles: &[OperatorProfile]) {
        let result = match serde_json::to_string(profiles) {
            Ok(payload) => self.store.set(&self.key, &payload).await,
            Err(e) => Err(PersistenceError::from(e)),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to persist {} profiles: {}", profiles.len(), e);
        }
    }
}

async fn read_profiles(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Vec<OperatorProfile>, PersistenceError> {
    let Some(payload) = store.get(key).await? else {
        return Ok(Vec::new());
    };
    serde_json::from_str(&payload).map_err(|e| PersistenceError::Corrupted {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn validated(mut profile: OperatorProfile) -> ProfileResult<OperatorProfile> {
    profile.name = profile.name.trim().to_string();
    if profile.name.is_empty() {
        return Err(ProfileError::EmptyName);
    }
    Ok(profile)
}
