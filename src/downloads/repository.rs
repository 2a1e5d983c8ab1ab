// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::format_timestamp;
use crate::downloads::domain::DedupWindow;
use crate::error::RepositoryError;
use crate::state::DbPool;

#[async_trait]
pub trait DownloadRepository: Send + Sync {
    /// Log a download unless the same address fetched the document within the
    /// window. Returns whether a row was inserted.
    async fn record(
        &self,
        document_id: i64,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn count(&self, document_id: i64) -> Result<i64, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteDownloadRepository {
    pool: DbPool,
    window: DedupWindow,
}

impl SqliteDownloadRepository {
    pub fn new(pool: DbPool, window: DedupWindow) -> Self {
        Self { pool, window }
    }
}

#[async_trait]
impl DownloadRepository for SqliteDownloadRepository {
    async fn record(
        &self,
        document_id: i64,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let cutoff = format_timestamp(&self.window.cutoff(at));
        let at = format_timestamp(&at);

        // Check and insert in one statement so concurrent requests can't both count
        let inserted = conn.execute(
            "INSERT INTO document_downloads (document_id, ip, timestamp)
             SELECT ?1, ?2, ?3
             WHERE NOT EXISTS (
                 SELECT 1 FROM document_downloads
                 WHERE document_id = ?1 AND ip = ?2
                   AND timestamp > ?4 AND timestamp <= ?3
             )",
            params![document_id, address, at, cutoff],
        )?;

        if inserted == 0 {
            tracing::debug!(document_id, address, "repeat download not counted");
        }
        Ok(inserted > 0)
    }

    async fn count(&self, document_id: i64) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM document_downloads WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
