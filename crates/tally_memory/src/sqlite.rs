use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;
use tally_core::KvStore;

/// Key-value byte store backed by a single SQLite table.
#[derive(Clone)]
pub struct SqliteKvStore {
    pool: Pool<Sqlite>,
}

impl SqliteKvStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create kv table")?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read key '{}'", key))?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write key '{}'", key))?;

        tracing::debug!("Stored {} byte(s) under '{}'", value.len(), key);
        Ok(())
    }
}
