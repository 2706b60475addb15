use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nav_backup_core::naming::{remote_path, snapshot_filename, BACKUP_DIR, ROOT_DIR};
use nav_backup_core::{content_hash, BackupFileRef, BackupOutcome};
use nav_backup_storage::{ConfigStore, SiteStore};
use nav_backup_webdav::Connector;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::retention;
use crate::session::Session;
use crate::snapshot::Snapshotter;

pub const DEFAULT_KEEP_DAYS: u32 = 7;
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Snapshots older than this many days are deleted after each backup.
    pub keep_days: u32,
    pub transport_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            keep_days: DEFAULT_KEEP_DAYS,
            transport_timeout: DEFAULT_TRANSPORT_TIMEOUT,
        }
    }
}

/// Backup, listing, restore and connection checks against the configured
/// remote. Holds no session between calls.
pub struct BackupEngine {
    configs: ConfigStore,
    snapshotter: Snapshotter,
    connector: Arc<dyn Connector>,
    settings: EngineSettings,
}

impl BackupEngine {
    pub fn new(
        store: Arc<dyn SiteStore>,
        connector: Arc<dyn Connector>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            configs: ConfigStore::new(store.clone()),
            snapshotter: Snapshotter::new(store),
            connector,
            settings,
        }
    }

    pub fn configs(&self) -> &ConfigStore {
        &self.configs
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn SiteStore> {
        self.configs.site_store()
    }

    pub(crate) fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    /// Opens a session from the stored configuration.
    pub(crate) async fn open_session(&self) -> Result<Session, EngineError> {
        let config = self.configs.get().await?;
        let credentials = config.credentials().ok_or(EngineError::ConfigIncomplete)?;
        Session::open(
            self.connector.as_ref(),
            &credentials,
            self.settings.transport_timeout,
        )
        .map_err(EngineError::TransportUnavailable)
    }

    /// Uploads today's snapshot, then retires old ones.
    ///
    /// Runs on the same UTC day share a filename; the later run overwrites
    /// the earlier snapshot.
    pub async fn perform_backup(&self) -> Result<BackupOutcome, EngineError> {
        let session = self.open_session().await?;

        let document = self.snapshotter.export_all().await?;
        let body = document
            .to_json()
            .map_err(|e| EngineError::Storage(e.into()))?
            .into_bytes();
        let size_bytes = body.len() as u64;
        let digest = content_hash(&body);

        ensure_backup_dir(&session).await;

        let filename = snapshot_filename(Utc::now().date_naive());
        let primary = remote_path(BACKUP_DIR, &filename);
        let path = match session.write(&primary, body.clone()).await {
            Ok(()) => primary,
            Err(err) => {
                warn!(path = %primary, error = %err, "upload to backup directory failed, trying root");
                let fallback = remote_path(ROOT_DIR, &filename);
                session
                    .write(&fallback, body)
                    .await
                    .map_err(EngineError::UploadFailed)?;
                fallback
            }
        };

        let time = Utc::now();
        self.configs.record_status("success", Some(time)).await?;

        let removed = retention::cleanup(&session, self.settings.keep_days).await;
        info!(
            %filename,
            %path,
            size_bytes,
            content_hash = %digest,
            removed,
            "backup uploaded"
        );

        Ok(BackupOutcome {
            filename,
            path,
            time,
            size_bytes,
            content_hash: digest,
        })
    }

    /// Snapshots in the backup directory and the root, newest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupFileRef>, EngineError> {
        let session = self.open_session().await?;
        let mut files = retention::enumerate_snapshots(&session).await;
        files.sort_by(|a, b| b.filename.cmp(&a.filename));
        Ok(files)
    }
}

/// Creates the backup directory when missing. Failures only get logged; the
/// upload falls back to the root if the directory is unusable.
async fn ensure_backup_dir(session: &Session) {
    match session.exists(BACKUP_DIR).await {
        Ok(true) => {}
        Ok(false) => match session.create_directory(BACKUP_DIR).await {
            Ok(()) => info!(dir = BACKUP_DIR, "created backup directory"),
            Err(err) => warn!(dir = BACKUP_DIR, error = %err, "could not create backup directory"),
        },
        Err(err) => warn!(dir = BACKUP_DIR, error = %err, "could not check backup directory"),
    }
}
