use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use nav_backup_core::{BackupConfig, BackupConfigUpdate, Frequency};

use crate::store::SiteStore;

pub const KEY_URL: &str = "webdav_url";
pub const KEY_USERNAME: &str = "webdav_username";
pub const KEY_PASSWORD: &str = "webdav_password";
pub const KEY_FREQUENCY: &str = "backup_frequency";
pub const KEY_LAST_TIME: &str = "last_backup_time";
pub const KEY_LAST_STATUS: &str = "last_backup_status";

/// Backup configuration and last-run status, one settings row per field.
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn SiteStore>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn SiteStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self) -> Result<BackupConfig> {
        let last_backup_time = self
            .store
            .get_setting(KEY_LAST_TIME)
            .await?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(BackupConfig {
            url: self.store.get_setting(KEY_URL).await?,
            username: self.store.get_setting(KEY_USERNAME).await?,
            password: self.store.get_setting(KEY_PASSWORD).await?,
            frequency: self
                .store
                .get_setting(KEY_FREQUENCY)
                .await?
                .map(|raw| Frequency::parse(&raw)),
            last_backup_time,
            last_backup_status: self.store.get_setting(KEY_LAST_STATUS).await?,
        })
    }

    /// Writes only the fields present in `update`.
    pub async fn save(&self, update: &BackupConfigUpdate) -> Result<()> {
        let fields = [
            (KEY_URL, update.url.as_deref()),
            (KEY_USERNAME, update.username.as_deref()),
            (KEY_PASSWORD, update.password.as_deref()),
            (KEY_FREQUENCY, update.frequency.as_ref().map(Frequency::as_str)),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                self.store.put_setting(key, value).await?;
            }
        }
        Ok(())
    }

    /// A `None` time leaves the last successful run's timestamp in place.
    pub async fn record_status(&self, status: &str, time: Option<DateTime<Utc>>) -> Result<()> {
        self.store.put_setting(KEY_LAST_STATUS, status).await?;
        if let Some(time) = time {
            self.store
                .put_setting(KEY_LAST_TIME, &time.to_rfc3339_opts(SecondsFormat::Millis, true))
                .await?;
        }
        Ok(())
    }

    pub fn site_store(&self) -> &Arc<dyn SiteStore> {
        &self.store
    }
}
