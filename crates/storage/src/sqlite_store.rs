use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use nav_backup_core::{Category, Site};
use rusqlite::{params, Connection, OptionalExtension};

use crate::store::SiteStore;

/// SQLite-backed store. Each method opens a fresh connection on a blocking task.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let store = Self { db_path };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("open site db")
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                icon TEXT DEFAULT '',
                color TEXT DEFAULT '#ff9a56',
                sort_order INTEGER DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS sites (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                description TEXT DEFAULT '',
                logo TEXT DEFAULT '',
                category_id INTEGER,
                sort_order INTEGER DEFAULT 0
            );",
        )
        .context("create site tables")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SiteStore for SqliteStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let db_path = self.db_path.clone();
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open site db")?;
            let value = conn
                .query_row("SELECT value FROM settings WHERE key = ?1", [&key], |row| {
                    row.get::<_, Option<String>>(0)
                })
                .optional()?;
            Ok(value.flatten())
        })
        .await?
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        let db_path = self.db_path.clone();
        let (key, value) = (key.to_owned(), value.to_owned());
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open site db")?;
            conn.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .with_context(|| format!("write setting {key}"))?;
            Ok(())
        })
        .await?
    }

    async fn list_settings_except(&self, excluded: &[&str]) -> Result<BTreeMap<String, String>> {
        let db_path = self.db_path.clone();
        let excluded: Vec<String> = excluded.iter().map(|k| (*k).to_owned()).collect();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open site db")?;
            let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;

            let mut settings = BTreeMap::new();
            for row in rows {
                let (key, value) = row?;
                if excluded.contains(&key) {
                    continue;
                }
                if let Some(value) = value {
                    settings.insert(key, value);
                }
            }
            Ok(settings)
        })
        .await?
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open site db")?;
            let mut stmt = conn.prepare(
                "SELECT id, name, icon, color, sort_order FROM categories
                 ORDER BY sort_order ASC, id ASC",
            )?;
            let rows = stmt.query_map([], row_to_category)?;
            rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
        })
        .await?
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open site db")?;
            let mut stmt = conn.prepare(
                "SELECT id, name, url, description, logo, category_id, sort_order FROM sites
                 ORDER BY sort_order ASC, id ASC",
            )?;
            let rows = stmt.query_map([], row_to_site)?;
            rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
        })
        .await?
    }

    async fn replace_records(&self, categories: &[Category], sites: &[Site]) -> Result<()> {
        let db_path = self.db_path.clone();
        let categories = categories.to_vec();
        let sites = sites.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&db_path).context("open site db")?;
            let tx = conn.transaction().context("begin restore transaction")?;

            tx.execute("DELETE FROM categories", [])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO categories (id, name, icon, color, sort_order)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for cat in &categories {
                    stmt.execute(params![cat.id, cat.name, cat.icon, cat.color, cat.sort_order])
                        .with_context(|| format!("insert category {}", cat.id))?;
                }
            }

            tx.execute("DELETE FROM sites", [])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO sites (id, name, url, description, logo, category_id, sort_order)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for site in &sites {
                    stmt.execute(params![
                        site.id,
                        site.name,
                        site.url,
                        site.description,
                        site.logo,
                        site.category_id,
                        site.sort_order
                    ])
                    .with_context(|| format!("insert site {}", site.id))?;
                }
            }

            tx.commit().context("commit restore transaction")?;
            Ok(())
        })
        .await?
    }
}

fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        icon: row.get(2)?,
        color: row.get(3)?,
        sort_order: row.get(4)?,
    })
}

fn row_to_site(row: &rusqlite::Row) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        description: row.get(3)?,
        logo: row.get(4)?,
        category_id: row.get(5)?,
        sort_order: row.get(6)?,
    })
}
