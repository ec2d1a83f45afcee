use serde_json::Value;

use crate::models::{Settings, default_settings};
use crate::store::{StoreError, keys};

use super::Repository;

/// Numeric setting, ignoring values of the wrong type
pub fn setting_u64(settings: &Settings, key: &str) -> Option<u64> {
    settings.get(key).and_then(Value::as_u64)
}

fn merged_with_defaults(overrides: Settings) -> Settings {
    let mut settings = default_settings();
    settings.extend(overrides);
    settings
}

impl Repository {
    async fn stored_settings(&self) -> Result<Settings, StoreError> {
        Ok(self
            .store
            .get::<Settings>(keys::SETTINGS)
            .await?
            .unwrap_or_default())
    }

    /// Defaults overlaid with whatever has been stored
    pub async fn get_settings(&self) -> Settings {
        match self.stored_settings().await {
            Ok(stored) => merged_with_defaults(stored),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read settings");
                default_settings()
            }
        }
    }

    /// Shallow-merge `updates` into the stored settings
    pub async fn update_settings(&self, updates: Settings) -> Option<Settings> {
        let _guard = self.store.lock(keys::SETTINGS).await;
        let mut stored = match self.stored_settings().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read settings");
                return None;
            }
        };
        stored.extend(updates);

        if let Err(e) = self.store.set(keys::SETTINGS, &stored).await {
            tracing::error!(error = %e, "Failed to save settings");
            return None;
        }
        Some(merged_with_defaults(stored))
    }

    pub async fn reset_settings(&self) -> bool {
        let _guard = self.store.lock(keys::SETTINGS).await;
        match self.store.set(keys::SETTINGS, &default_settings()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to reset settings");
                false
            }
        }
    }
}
