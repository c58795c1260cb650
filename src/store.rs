//! SQLite-backed [`ReceiptStore`].
//!
//! The pool is opened once at process start and handed to the pipeline and
//! retrieval service; [`SqliteReceiptStore::close`] drains it at shutdown.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::receipt::{AccountId, Receipt, ReceiptStore, StoreError};

const SELECT_COLUMNS: &str = "SELECT id, user_id, filename, text, created_at FROM receipts";

#[derive(Clone)]
pub struct SqliteReceiptStore {
    pool: SqlitePool,
}

impl SqliteReceiptStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(sqlx::Error::Io(e))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Receipt store opened at {}", path.display());
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS receipts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                filename TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_receipts_owner_created ON receipts(user_id, created_at DESC, id DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close the pool, waiting for in-flight queries to finish.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Receipt store closed");
    }
}

#[async_trait::async_trait]
impl ReceiptStore for SqliteReceiptStore {
    async fn insert(
        &self,
        owner: AccountId,
        filename: &str,
        text: &str,
    ) -> Result<Receipt, StoreError> {
        // Single statement: the row is visible with every column set, or not at all.
        // created_at is taken under the write lock and never falls behind the
        // newest row, so timestamp order always matches commit (id) order.
        let row = sqlx::query(
            r#"
            INSERT INTO receipts (user_id, filename, text, created_at)
            VALUES (?, ?, ?, MAX(
                CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER),
                COALESCE((SELECT MAX(created_at) FROM receipts), 0)
            ))
            RETURNING id, created_at
            "#,
        )
        .bind(owner.0)
        .bind(filename)
        .bind(text)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        let created_at_ms: i64 = row.try_get("created_at")?;
        debug!("Inserted receipt {} for account {} ({} chars)", id, owner, text.len());

        Ok(Receipt {
            id,
            user_id: owner,
            filename: filename.to_string(),
            text: text.to_string(),
            created_at: millis_to_utc(id, created_at_ms)?,
        })
    }

    async fn list_by_owner(&self, owner: AccountId) -> Result<Vec<Receipt>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_receipt).collect()
    }

    async fn list_by_owner_matching(
        &self,
        owner: AccountId,
        query: Option<&str>,
    ) -> Result<Vec<Receipt>, StoreError> {
        let query = match query {
            Some(q) if !q.is_empty() => q,
            _ => return self.list_by_owner(owner).await,
        };

        // instr() is a byte-wise substring test; LIKE would fold ASCII case.
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ? AND instr(text, ?) > 0 ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner.0)
        .bind(query)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_receipt).collect()
    }
}

fn row_to_receipt(row: &SqliteRow) -> Result<Receipt, StoreError> {
    let id: i64 = row.try_get("id")?;
    let created_at_ms: i64 = row.try_get("created_at")?;

    Ok(Receipt {
        id,
        user_id: AccountId(row.try_get("user_id")?),
        filename: row.try_get("filename")?,
        text: row.try_get("text")?,
        created_at: millis_to_utc(id, created_at_ms)?,
    })
}

fn millis_to_utc(id: i64, ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::Corrupt {
        id,
        reason: format!("created_at out of range: {}", ms),
    })
}
