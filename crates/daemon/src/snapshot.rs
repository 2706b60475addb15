use std::sync::Arc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use nav_backup_core::{SnapshotDocument, FORMAT_VERSION, SECRET_KEYS};
use nav_backup_storage::SiteStore;

/// Reads the current record set into a [`SnapshotDocument`].
#[derive(Clone)]
pub struct Snapshotter {
    store: Arc<dyn SiteStore>,
}

impl Snapshotter {
    pub fn new(store: Arc<dyn SiteStore>) -> Self {
        Self { store }
    }

    pub async fn export_all(&self) -> Result<SnapshotDocument> {
        Ok(SnapshotDocument {
            export_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            version: FORMAT_VERSION.to_owned(),
            categories: self.store.list_categories().await?,
            sites: self.store.list_sites().await?,
            settings: self.store.list_settings_except(&SECRET_KEYS).await?,
        })
    }
}
