use nav_backup_webdav::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("webdav configuration is incomplete: url, username and password are required")]
    ConfigIncomplete,
    #[error("could not open a webdav session: {0}")]
    TransportUnavailable(#[source] TransportError),
    #[error("upload failed in the backup directory and at the root: {0}")]
    UploadFailed(#[source] TransportError),
    #[error("backup file {0} not found in any known location")]
    BackupNotFound(String),
    #[error("invalid backup file: {0}")]
    InvalidFormat(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
