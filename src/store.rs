//! Seen-identity stores backing the dedup filter
//!
//! Two identity spaces exist and never share state:
//! - [`MetadataStore`] — a SQLite-backed durable store keyed by
//!   `{flow_id}:{identity}`, shared by all download pipelines so remote
//!   identities survive restarts.
//! - [`InMemorySeenStore`] — a per-pipeline in-memory set for the local
//!   identity space of upload and archive pipelines.

use async_trait::async_trait;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{DatabaseError, Error, Result};

/// Key-value store recording which candidate identities were already accepted
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Whether the identity was marked before
    async fn seen(&self, key: &str) -> Result<bool>;

    /// Record the identity; idempotent
    async fn mark_seen(&self, key: &str) -> Result<()>;
}

/// Durable SQLite-backed seen store
///
/// Tolerates concurrent access from worker threads across multiple
/// pipelines.
#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Open (creating if missing) the store at `path` and run migrations
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "failed to create store directory: {e}"
                )))
            })?;
        }

        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "failed to parse store path: {e}"
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "failed to connect to store: {e}"
            )))
        })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "failed to acquire connection: {e}"
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "failed to create schema_version table: {e}"
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "failed to query schema version: {e}"
                    )))
                })?
                .flatten();

        if current_version.unwrap_or(0) < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: the seen-identities table
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("applying metadata store migration v1");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_files (
                key TEXT PRIMARY KEY,
                seen_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "failed to create seen_files table: {e}"
            )))
        })?;

        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (1, ?)")
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "failed to record migration v1: {e}"
                )))
            })?;

        Ok(())
    }
}

#[async_trait]
impl SeenStore for MetadataStore {
    async fn seen(&self, key: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seen_files WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "failed to check seen key: {e}"
                )))
            })?;

        Ok(count > 0)
    }

    async fn mark_seen(&self, key: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO seen_files (key, seen_at)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET seen_at = ?
            "#,
        )
        .bind(key)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "failed to mark key as seen: {e}"
            )))
        })?;

        Ok(())
    }
}

/// Per-pipeline in-memory seen store for local identity spaces
///
/// State lives and dies with the pipeline that owns it; restarting the
/// process forgets every local identity.
#[derive(Debug, Default)]
pub struct InMemorySeenStore {
    seen: Mutex<HashSet<String>>,
}

impl InMemorySeenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeenStore for InMemorySeenStore {
    async fn seen(&self, key: &str) -> Result<bool> {
        let seen = self
            .seen
            .lock()
            .map_err(|_| Error::Other("seen store mutex poisoned".into()))?;
        Ok(seen.contains(key))
    }

    async fn mark_seen(&self, key: &str) -> Result<()> {
        let mut seen = self
            .seen
            .lock()
            .map_err(|_| Error::Other("seen store mutex poisoned".into()))?;
        seen.insert(key.to_owned());
        Ok(())
    }
}
