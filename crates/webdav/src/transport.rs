use std::time::Duration;

use nav_backup_core::Credentials;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One child of a remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub basename: String,
    pub size: u64,
    pub last_modified: String,
    pub is_dir: bool,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid remote url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{method} {path} failed with status {status}")]
    Status {
        method: String,
        path: String,
        status: u16,
    },
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid multistatus response: {0}")]
    Malformed(String),
    #[error("{operation} {path} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        path: String,
        timeout: Duration,
    },
}

impl TransportError {
    /// HTTP status behind the failure, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TransportError::Status {
                method: "request".to_owned(),
                path: err.url().map(|u| u.path().to_owned()).unwrap_or_default(),
                status: status.as_u16(),
            },
            None => TransportError::Request(err.to_string()),
        }
    }
}

/// File operations against a remote store. Paths are absolute (`/dir/name`).
#[async_trait::async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, TransportError>;

    async fn create_directory(&self, path: &str) -> Result<(), TransportError>;

    /// Direct children of `path`, excluding `path` itself.
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, TransportError>;

    async fn write(&self, path: &str, content: Vec<u8>, overwrite: bool)
        -> Result<(), TransportError>;

    async fn read_text(&self, path: &str) -> Result<String, TransportError>;

    async fn delete(&self, path: &str) -> Result<(), TransportError>;
}

/// Opens a fresh transport session for a set of credentials.
pub trait Connector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn RemoteTransport>, TransportError>;
}
