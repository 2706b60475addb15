use nav_backup_core::Credentials;
use nav_backup_webdav::TransportError;
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::BackupEngine;
use crate::session::Session;

/// Result of probing a remote before saving its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCheck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ConnectionCheck {
    fn ok(warning: Option<&str>) -> Self {
        Self {
            success: true,
            error: None,
            warning: warning.map(str::to_owned),
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            warning: None,
        }
    }
}

impl BackupEngine {
    /// Probes the remote root with the given credentials. Never fails; the
    /// outcome is described in the returned check.
    pub async fn test_connection(&self, url: &str, username: &str, password: &str) -> ConnectionCheck {
        let credentials = Credentials {
            url: url.to_owned(),
            username: username.to_owned(),
            password: password.to_owned(),
        };
        let probe = match Session::open(
            self.connector(),
            &credentials,
            self.settings().transport_timeout,
        ) {
            Ok(session) => session.exists("/").await,
            Err(err) => Err(err),
        };

        let check = match probe {
            Ok(true) => ConnectionCheck::ok(None),
            Ok(false) => ConnectionCheck::ok(Some(
                "remote root reported as missing; it will be created on first backup",
            )),
            Err(err) => classify(&err),
        };
        if check.success {
            info!(url, "webdav connection ok");
        } else {
            warn!(url, error = ?check.error, "webdav connection failed");
        }
        check
    }
}

fn classify(err: &TransportError) -> ConnectionCheck {
    let message = err.to_string();
    if matches!(err, TransportError::Malformed(_)) || message.contains("multistatus") {
        return ConnectionCheck::ok(Some(
            "server returned a non-standard WebDAV response, but the connection works",
        ));
    }
    if err.status() == Some(401) || message.contains("401") {
        return ConnectionCheck::failed(
            "authentication failed, check username and password".to_owned(),
        );
    }
    if err.status() == Some(404) || message.contains("404") {
        return ConnectionCheck::failed("path not found, check the WebDAV URL".to_owned());
    }
    ConnectionCheck::failed(message)
}
