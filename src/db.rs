use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use anyhow::Result;
use std::path::Path;

use crate::core::persistence::StateStore;
use crate::error::TrackerError;

pub async fn init(data_dir: &Path) -> Result<SqlitePool> {
    let db_path = data_dir.join("gold_tracker.db");
    let database_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());

    tracing::info!(url = %database_url, "connecting to SQLite database");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("database initialized");
    Ok(pool)
}

/// In-memory database with the schema applied. Handy for tests and dry runs.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub async fn save_state(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO kv_state (key, value) VALUES ($1, $2)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = CURRENT_TIMESTAMP"
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_state(pool: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT value FROM kv_state WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(record) => Ok(Some(record.try_get("value")?)),
        None => Ok(None),
    }
}

/// All persisted keys with their last write time, for diagnostics.
pub async fn list_state(pool: &SqlitePool) -> Result<Vec<(String, String, Option<String>)>> {
    let rows = sqlx::query("SELECT key, value, CAST(updated_at AS TEXT) AS updated_at FROM kv_state ORDER BY key")
        .fetch_all(pool)
        .await?;

    let mut result = Vec::new();
    for row in rows {
        let key: String = row.try_get("key")?;
        let value: String = row.try_get("value")?;
        let updated_at: Option<String> = row.try_get("updated_at").ok().flatten();
        result.push((key, value, updated_at));
    }
    Ok(result)
}

/// `StateStore` backed by the `kv_state` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load(&self, key: &str) -> Result<Option<String>, TrackerError> {
        Ok(get_state(&self.pool, key).await?)
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), TrackerError> {
        Ok(save_state(&self.pool, key, value).await?)
    }
}

// =====================================================================
// API RATE LIMIT TRACKER
// =====================================================================

/// Increments the usage counter for `key` (e.g. "METALPRICE_USAGE_2024-05").
pub async fn increment_api_usage(pool: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO api_usage (key, count) VALUES ($1, 1)
         ON CONFLICT (key) DO UPDATE SET count = count + 1"
    )
    .bind(key)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_api_usage(pool: &SqlitePool, key: &str) -> Result<i64> {
    let row = sqlx::query("SELECT count FROM api_usage WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(record) => Ok(record.try_get("count")?),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_upsert() {
        let pool = init_in_memory().await.unwrap();
        save_state(&pool, "selection", "a").await.unwrap();
        save_state(&pool, "selection", "b").await.unwrap();
        assert_eq!(get_state(&pool, "selection").await.unwrap().as_deref(), Some("b"));
        assert_eq!(get_state(&pool, "missing").await.unwrap(), None);
        assert_eq!(list_state(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_api_usage_counter() {
        let pool = init_in_memory().await.unwrap();
        let key = "METALPRICE_USAGE_2024-05";
        assert_eq!(get_api_usage(&pool, key).await.unwrap(), 0);
        increment_api_usage(&pool, key).await.unwrap();
        increment_api_usage(&pool, key).await.unwrap();
        assert_eq!(get_api_usage(&pool, key).await.unwrap(), 2);
        assert_eq!(get_api_usage(&pool, "METALPRICE_USAGE_2024-06").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_store_trait() {
        let store = SqliteStore::new(init_in_memory().await.unwrap());
        store.save("history", "[]").await.unwrap();
        assert_eq!(store.load("history").await.unwrap().as_deref(), Some("[]"));
    }
}
