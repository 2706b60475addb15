use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use nav_backup_core::{Category, Site};

use crate::postgres_store::PostgresStore;
use crate::sqlite_store::SqliteStore;

/// The application's settings table plus its two ordered record tables,
/// implemented by both SQLite and Postgres backends.
#[async_trait::async_trait]
pub trait SiteStore: Send + Sync {
    /// Value stored under `key`, if any.
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace one setting.
    async fn put_setting(&self, key: &str, value: &str) -> Result<()>;

    /// Every setting whose key is not in `excluded`.
    async fn list_settings_except(&self, excluded: &[&str]) -> Result<BTreeMap<String, String>>;

    /// Categories ordered by sort_order ASC.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Sites ordered by sort_order ASC.
    async fn list_sites(&self) -> Result<Vec<Site>>;

    /// Delete all categories and sites and insert the given rows, in one transaction.
    async fn replace_records(&self, categories: &[Category], sites: &[Site]) -> Result<()>;
}

/// Opens Postgres when a database URL is configured, else SQLite under `root`.
pub async fn open_store(root: &Path, database_url: Option<&str>) -> Result<Arc<dyn SiteStore>> {
    match database_url {
        Some(url) => Ok(Arc::new(PostgresStore::new(url).await?)),
        None => {
            std::fs::create_dir_all(root)
                .with_context(|| format!("create data directory: {}", root.display()))?;
            Ok(Arc::new(SqliteStore::new(root.join("nav.db"))?))
        }
    }
}
