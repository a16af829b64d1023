//! Durable Local Store persisted in SQLite.
//!
//! All collections share one table (`records`); each document is stored as
//! JSON text under `(collection, key)`. Insertion order is the table's rowid
//! order, which an upsert preserves.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use crate::collection::Collection;
use crate::error::{StoreError, StoreResult};
use crate::store::{LocalStore, merge_patch};

/// SQLite-backed store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        // A single connection serialises writers, matching the single-writer
        // discipline of the sync engine.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        tracing::info!(path = %path.display(), "opened sqlite store");
        Self::with_pool(pool).await
    }

    /// Open the database at [`default_path`].
    pub async fn open_default() -> StoreResult<Self> {
        Self::open(default_path()?).await
    }

    /// Private in-memory database (tests, throwaway demos).
    pub async fn open_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // The database lives as long as its only connection does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                key        TEXT NOT NULL,
                data       TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Close the pool, flushing outstanding work.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode(data: &str) -> StoreResult<Value> {
    Ok(serde_json::from_str(data)?)
}

#[async_trait::async_trait]
impl LocalStore for SqliteStore {
    async fn put(&self, collection: Collection, key: &str, document: Value) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO records (collection, key, data)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (collection, key) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .bind(document.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>> {
        let row = sqlx::query("SELECT data FROM records WHERE collection = ?1 AND key = ?2")
            .bind(collection.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data")?;
                Ok(Some(decode(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, collection: Collection, key: &str, patch: Value) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT data FROM records WHERE collection = ?1 AND key = ?2")
            .bind(collection.as_str())
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        let data: String = row.try_get("data")?;
        let mut document = decode(&data)?;
        merge_patch(collection, key, &mut document, patch)?;

        sqlx::query("UPDATE records SET data = ?3 WHERE collection = ?1 AND key = ?2")
            .bind(collection.as_str())
            .bind(key)
            .bind(document.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_all(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        let rows = sqlx::query("SELECT data FROM records WHERE collection = ?1 ORDER BY rowid ASC")
            .bind(collection.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("data")?;
            documents.push(decode(&data)?);
        }
        Ok(documents)
    }

    async fn clear(&self, collection: Collection) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ?1")
            .bind(collection.as_str())
            .execute(&self.pool)
            .await?;

        tracing::debug!(%collection, removed = result.rows_affected(), "cleared collection");
        Ok(())
    }
}

/// Resolve the default database location: `{data_dir}/localfirst/store.db`.
pub fn default_path() -> StoreResult<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .ok_or_else(|| {
            StoreError::storage("failed to resolve OS app data directory (tried data_dir and home_dir)")
        })?;

    let mut path = base;
    path.push("localfirst");
    path.push("store.db");
    Ok(path)
}
