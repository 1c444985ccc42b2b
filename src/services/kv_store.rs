//! Key-value store holding JSON documents under string keys.
//!
//! This is the persistence seam beneath the metadata repository and the
//! credential/admin keys. Two backends are provided:
//! - [`SqliteKeyValueStore`]: durable, one row per key in `kv_entries`
//! - [`InMemoryKeyValueStore`]: `HashMap`-based, for tests and embedding

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::SqlitePool;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Schema applied by [`SqliteKeyValueStore::migrate`].
const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum KvError {
    #[error("value under `{key}` is not valid JSON for the requested type: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("value for `{key}` could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type KvResult<T> = Result<T, KvError>;

/// Async key-value store over JSON text values.
///
/// Implementations store values verbatim; typed access goes through
/// [`get_item`] and [`set_item`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Raw JSON stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Store raw JSON under `key`, replacing any previous value.
    async fn set(&self, key: &str, json: String) -> KvResult<()>;

    async fn contains(&self, key: &str) -> KvResult<bool>;

    /// Remove `key`. Returns `true` if it existed.
    async fn remove(&self, key: &str) -> KvResult<bool>;
}

/// Read and decode the value under `key`.
pub async fn get_item<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> KvResult<Option<T>> {
    match store.get(key).await? {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| KvError::Decode {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encode and store `value` under `key`.
pub async fn set_item<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> KvResult<()> {
    let json = serde_json::to_string(value).map_err(|source| KvError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set(key, json).await
}

/// SQLite-backed store. Each key is one row in `kv_entries`.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pub db: Arc<SqlitePool>,
}

impl SqliteKeyValueStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Statements are idempotent.
    pub async fn migrate(&self) -> KvResult<()> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&*self.db)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, json: String) -> KvResult<()> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(json)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        debug!("stored key {}", key);
        Ok(())
    }

    async fn contains(&self, key: &str) -> KvResult<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_one(&*self.db)
            .await?;
        Ok(found > 0)
    }

    async fn remove(&self, key: &str) -> KvResult<bool> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// In-memory store behind a `RwLock`. Contents vanish with the value.
#[derive(Default, Clone)]
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, json: String) -> KvResult<()> {
        self.entries.write().await.insert(key.to_string(), json);
        Ok(())
    }

    async fn contains(&self, key: &str) -> KvResult<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn remove(&self, key: &str) -> KvResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
