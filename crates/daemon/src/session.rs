use std::future::Future;
use std::time::Duration;

use nav_backup_core::Credentials;
use nav_backup_webdav::{Connector, RemoteEntry, RemoteTransport, TransportError};

/// One remote session, opened per operation and dropped with it. Every call
/// is bounded by `timeout`.
pub struct Session {
    transport: Box<dyn RemoteTransport>,
    timeout: Duration,
}

impl Session {
    pub fn open(
        connector: &dyn Connector,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            transport: connector.connect(credentials)?,
            timeout,
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        path: &str,
        call: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                operation,
                path: path.to_owned(),
                timeout: self.timeout,
            }),
        }
    }

    pub async fn exists(&self, path: &str) -> Result<bool, TransportError> {
        self.bounded("exists", path, self.transport.exists(path)).await
    }

    pub async fn create_directory(&self, path: &str) -> Result<(), TransportError> {
        self.bounded("mkdir", path, self.transport.create_directory(path))
            .await
    }

    pub async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        self.bounded("list", path, self.transport.list(path)).await
    }

    pub async fn write(&self, path: &str, content: Vec<u8>) -> Result<(), TransportError> {
        self.bounded("write", path, self.transport.write(path, content, true))
            .await
    }

    pub async fn read_text(&self, path: &str) -> Result<String, TransportError> {
        self.bounded("read", path, self.transport.read_text(path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), TransportError> {
        self.bounded("delete", path, self.transport.delete(path)).await
    }
}
