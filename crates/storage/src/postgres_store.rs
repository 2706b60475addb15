use std::collections::BTreeMap;

use anyhow::{Context, Result};
use nav_backup_core::{Category, Site};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::store::SiteStore;

/// Postgres-backed store.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connect to postgres")?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .context("create settings table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                icon TEXT DEFAULT '',
                color TEXT DEFAULT '#ff9a56',
                sort_order BIGINT DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await
        .context("create categories table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sites (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                description TEXT DEFAULT '',
                logo TEXT DEFAULT '',
                category_id BIGINT,
                sort_order BIGINT DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await
        .context("create sites table")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl SiteStore for PostgresStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.get::<Option<String>, _>("value")))
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("write setting {key}"))?;
        Ok(())
    }

    async fn list_settings_except(&self, excluded: &[&str]) -> Result<BTreeMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|r| {
                let key: String = r.get("key");
                let value: Option<String> = r.get("value");
                if excluded.contains(&key.as_str()) {
                    return None;
                }
                value.map(|v| (key, v))
            })
            .collect())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT id, name, icon, color, sort_order FROM categories
             ORDER BY sort_order ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Category {
                id: r.get("id"),
                name: r.get("name"),
                icon: r.get("icon"),
                color: r.get("color"),
                sort_order: r.get("sort_order"),
            })
            .collect())
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query(
            "SELECT id, name, url, description, logo, category_id, sort_order FROM sites
             ORDER BY sort_order ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Site {
                id: r.get("id"),
                name: r.get("name"),
                url: r.get("url"),
                description: r.get("description"),
                logo: r.get("logo"),
                category_id: r.get("category_id"),
                sort_order: r.get("sort_order"),
            })
            .collect())
    }

    async fn replace_records(&self, categories: &[Category], sites: &[Site]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin restore transaction")?;

        sqlx::query("DELETE FROM categories").execute(&mut *tx).await?;
        for cat in categories {
            sqlx::query(
                "INSERT INTO categories (id, name, icon, color, sort_order)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(cat.id)
            .bind(&cat.name)
            .bind(&cat.icon)
            .bind(&cat.color)
            .bind(cat.sort_order)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("insert category {}", cat.id))?;
        }

        sqlx::query("DELETE FROM sites").execute(&mut *tx).await?;
        for site in sites {
            sqlx::query(
                "INSERT INTO sites (id, name, url, description, logo, category_id, sort_order)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(site.id)
            .bind(&site.name)
            .bind(&site.url)
            .bind(&site.description)
            .bind(&site.logo)
            .bind(site.category_id)
            .bind(site.sort_order)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("insert site {}", site.id))?;
        }

        tx.commit().await.context("commit restore transaction")?;
        Ok(())
    }
}
