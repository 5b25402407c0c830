//! Persisted preferences: a single-value store that mirrors every update to
//! a durable key/value medium.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

/// Minimal durable key/value seam. Implementations are single-writer per
/// key; uncoordinated writers to the same key are last-write-wins.
#[async_trait]
pub trait PreferenceMedium: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>>;
    async fn write(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteMedium {
    pool: Pool<Sqlite>,
}

impl SqliteMedium {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let medium = Self { pool };
        medium.ensure_preferences_table().await?;
        Ok(medium)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_preferences_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure preferences table exists")?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceMedium for SqliteMedium {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        self.ensure_preferences_table().await?;
        let row = sqlx::query("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_preferences_table().await?;
        sqlx::query(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Ephemeral medium for tests and environments without durable storage.
#[derive(Default)]
pub struct MemoryMedium {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceMedium for MemoryMedium {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("failed to serialize preference '{key}': {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },
    #[error("failed to persist preference '{key}': {source}")]
    Write { key: String, source: anyhow::Error },
}

/// One named preference mirrored to a durable medium.
///
/// After any successful [`set`](Self::set) the in-memory and durable values
/// are equal; after a failed write the in-memory value is still updated and
/// the failure is reported to the caller.
pub struct PreferenceStore<T> {
    medium: Arc<dyn PreferenceMedium>,
    key: String,
    current: RwLock<T>,
}

impl<T> PreferenceStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Opens the preference at `key`. An absent, unparseable, or unreadable
    /// stored value falls back to `default`; reads are never fatal.
    pub async fn open(
        medium: Arc<dyn PreferenceMedium>,
        key: impl Into<String>,
        default: T,
    ) -> Self {
        let key = key.into();
        let initial = match medium.read(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    warn!(key = %key, "stored preference is unparseable; using default: {err}");
                    default
                }
            },
            Ok(None) => default,
            Err(err) => {
                warn!(key = %key, "preference read failed; using default: {err}");
                default
            }
        };

        Self {
            medium,
            key,
            current: RwLock::new(initial),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn get(&self) -> T {
        self.current.read().await.clone()
    }

    pub async fn set(&self, value: T) -> Result<(), PreferenceError> {
        *self.current.write().await = value.clone();

        let raw = serde_json::to_string(&value).map_err(|source| PreferenceError::Serialize {
            key: self.key.clone(),
            source,
        })?;
        self.medium
            .write(&self.key, &raw)
            .await
            .map_err(|source| PreferenceError::Write {
                key: self.key.clone(),
                source,
            })?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
