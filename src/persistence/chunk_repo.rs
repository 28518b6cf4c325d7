//! Chunk upload state repository for `SQLite` persistence.
//!
//! Rows here are read-modify-write records; callers serialize access per
//! (session, upload-id) key via [`super::locks::KeyedLocks`] so chunk
//! arrivals for the same file never lose updates.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::chunk::ChunkUploadState;
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for chunk upload state.
#[derive(Clone)]
pub struct ChunkRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ChunkRow {
    session_token: String,
    upload_id: String,
    relative_path: String,
    total_chunks: i64,
    received: String,
    expected_checksum: Option<String>,
    expected_size: Option<i64>,
    created_at: String,
}

impl ChunkRow {
    /// Convert a database row into the domain model.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn into_state(self) -> Result<ChunkUploadState> {
        let received: BTreeSet<u32> = serde_json::from_str(&self.received)
            .map_err(|err| AppError::Db(format!("invalid received column: {err}")))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|err| AppError::Db(format!("invalid created_at: {err}")))?
            .with_timezone(&Utc);

        Ok(ChunkUploadState {
            session_token: self.session_token,
            upload_id: self.upload_id,
            relative_path: self.relative_path,
            total_chunks: self.total_chunks as u32,
            received,
            expected_checksum: self.expected_checksum,
            expected_size: self.expected_size.map(|size| size as u64),
            created_at,
        })
    }
}

impl ChunkRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Retrieve chunk state for an upload-id, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, session_token: &str, upload_id: &str) -> Result<Option<ChunkUploadState>> {
        let row: Option<ChunkRow> = sqlx::query_as(
            "SELECT * FROM chunk_upload WHERE session_token = ?1 AND upload_id = ?2",
        )
        .bind(session_token)
        .bind(upload_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ChunkRow::into_state).transpose()
    }

    /// Insert or replace the full chunk state record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    #[allow(clippy::cast_possible_wrap)]
    pub async fn upsert(&self, state: &ChunkUploadState) -> Result<()> {
        let received = serde_json::to_string(&state.received)
            .map_err(|err| AppError::Db(format!("failed to serialize received set: {err}")))?;

        sqlx::query(
            "INSERT OR REPLACE INTO chunk_upload (session_token, upload_id, relative_path,
             total_chunks, received, expected_checksum, expected_size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&state.session_token)
        .bind(&state.upload_id)
        .bind(&state.relative_path)
        .bind(i64::from(state.total_chunks))
        .bind(&received)
        .bind(&state.expected_checksum)
        .bind(state.expected_size.map(|size| size as i64))
        .bind(state.created_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Delete the chunk state for an upload-id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, session_token: &str, upload_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunk_upload WHERE session_token = ?1 AND upload_id = ?2")
            .bind(session_token)
            .bind(upload_id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// List uploads created before `cutoff`, for scratch cleanup.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT session_token, upload_id FROM chunk_upload WHERE created_at < ?1",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(self.db.as_ref())
        .await?;
        Ok(rows)
    }
}
