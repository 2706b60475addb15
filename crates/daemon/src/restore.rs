use nav_backup_core::naming::{remote_path, BACKUP_DIR, ROOT_DIR};
use nav_backup_core::snapshot::is_secret_key;
use nav_backup_core::{Category, RestoreOutcome, Site, SnapshotDocument, FORMAT_VERSION};
use serde_json::Value;
use tracing::{info, warn};

use crate::engine::BackupEngine;
use crate::error::EngineError;

impl BackupEngine {
    /// Replaces local categories and sites with the contents of a snapshot.
    ///
    /// Without `explicit_path` the backup directory is tried before the root.
    /// Nothing is written unless the document validates.
    pub async fn restore(
        &self,
        filename: &str,
        explicit_path: Option<&str>,
    ) -> Result<RestoreOutcome, EngineError> {
        let session = self.open_session().await?;

        let candidates = match explicit_path {
            Some(path) => vec![path.to_owned()],
            None => vec![
                remote_path(BACKUP_DIR, filename),
                remote_path(ROOT_DIR, filename),
            ],
        };

        let mut content = None;
        for path in &candidates {
            match session.read_text(path).await {
                Ok(text) => {
                    info!(%path, "read backup");
                    content = Some(text);
                    break;
                }
                Err(err) => warn!(%path, error = %err, "backup not readable here"),
            }
        }
        let content = content.ok_or_else(|| EngineError::BackupNotFound(filename.to_owned()))?;

        let document = parse_document(&content)?;
        let categories: Vec<Category> = document
            .categories
            .into_iter()
            .map(Category::with_defaults)
            .collect();
        let sites: Vec<Site> = document.sites.into_iter().map(Site::with_defaults).collect();

        let store = self.store();
        store.replace_records(&categories, &sites).await?;

        let mut settings = 0;
        for (key, value) in &document.settings {
            if is_secret_key(key) {
                continue;
            }
            store.put_setting(key, value).await?;
            settings += 1;
        }

        info!(
            filename,
            categories = categories.len(),
            sites = sites.len(),
            settings,
            "restore complete"
        );
        Ok(RestoreOutcome {
            categories: categories.len(),
            sites: sites.len(),
            settings,
        })
    }
}

/// Checks version and required collections before decoding the records.
pub(crate) fn parse_document(content: &str) -> Result<SnapshotDocument, EngineError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| EngineError::InvalidFormat(format!("not valid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| EngineError::InvalidFormat("top level is not an object".to_owned()))?;

    if let Some(version) = object.get("version") {
        if version.as_str() != Some(FORMAT_VERSION) {
            return Err(EngineError::InvalidFormat(format!(
                "unsupported version {version}"
            )));
        }
    }
    for field in ["categories", "sites"] {
        if !object.get(field).is_some_and(Value::is_array) {
            return Err(EngineError::InvalidFormat(format!(
                "missing {field} collection"
            )));
        }
    }

    serde_json::from_value(value).map_err(|e| EngineError::InvalidFormat(e.to_string()))
}
