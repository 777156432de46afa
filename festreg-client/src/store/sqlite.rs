//! SQLite-backed session storage

use super::{SessionRecord, SessionStore};
use async_trait::async_trait;
use festreg_common::events::FlowKind;
use festreg_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// One row per flow key
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (creating if missing) the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        debug!("Opening session database: {}", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(path)
                    .busy_timeout(Duration::from_secs(5))
                    .journal_mode(SqliteJournalMode::Wal)
                    .create_if_missing(true),
            )
            .await?;

        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS staged_sessions (
                form_key TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, flow: FlowKind) -> Result<Option<SessionRecord>> {
        let row = sqlx::query("SELECT record FROM staged_sessions WHERE form_key = ?")
            .bind(flow.key())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row.get("record");

        match serde_json::from_str(&json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(flow = %flow, error = %e, "Dropping unreadable session record");
                self.clear(flow).await?;
                Ok(None)
            }
        }
    }

    async fn save(&self, flow: FlowKind, record: &SessionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let saved_at = record.saved_at.to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO staged_sessions (form_key, record, saved_at)
            VALUES (?, ?, ?)
            ON CONFLICT(form_key) DO UPDATE SET
                record = excluded.record,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(flow.key())
        .bind(&json)
        .bind(&saved_at)
        .execute(&self.pool)
        .await?;

        debug!(flow = %flow, "Session record saved");
        Ok(())
    }

    async fn clear(&self, flow: FlowKind) -> Result<()> {
        sqlx::query("DELETE FROM staged_sessions WHERE form_key = ?")
            .bind(flow.key())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
