//! Session repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::session::{TransferredFile, UploadSession};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for upload session records.
#[derive(Clone)]
pub struct SessionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    token: String,
    label: String,
    created_at: String,
    expires_at: String,
    remote_dir: String,
    used: i64,
    used_at: Option<String>,
    reusable: i64,
    files: String,
}

impl SessionRow {
    /// Convert a database row into the domain model.
    fn into_session(self) -> Result<UploadSession> {
        let created_at = parse_timestamp(&self.created_at, "created_at")?;
        let expires_at = parse_timestamp(&self.expires_at, "expires_at")?;
        let used_at = self
            .used_at
            .as_deref()
            .map(|raw| parse_timestamp(raw, "used_at"))
            .transpose()?;
        let files: Vec<TransferredFile> = serde_json::from_str(&self.files)
            .map_err(|err| AppError::Db(format!("invalid files column: {err}")))?;

        Ok(UploadSession {
            token: self.token,
            label: self.label,
            created_at,
            expires_at,
            remote_dir: self.remote_dir,
            used: self.used != 0,
            used_at,
            reusable: self.reusable != 0,
            files,
        })
    }
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| AppError::Db(format!("invalid {column}: {err}")))
}

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new session record.
    ///
    /// A collision with an expired record replaces it; the primary-key
    /// constraint guarantees at most one concurrent insert wins.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateLabel` if a non-expired session
    /// already holds the token, or `AppError::Db` on persistence failure.
    pub async fn create(&self, session: &UploadSession) -> Result<()> {
        match self.insert(session).await {
            Ok(()) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                let existing = self.get(&session.token).await?;
                if existing.is_expired(Utc::now()) {
                    self.delete(&existing.token).await?;
                    self.insert(session).await.map_err(|retry_err| {
                        if is_unique_violation(&retry_err) {
                            AppError::DuplicateLabel(session.token.clone())
                        } else {
                            retry_err
                        }
                    })
                } else {
                    Err(AppError::DuplicateLabel(session.token.clone()))
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn insert(&self, session: &UploadSession) -> Result<()> {
        let files = serde_json::to_string(&session.files)
            .map_err(|err| AppError::Db(format!("failed to serialize files: {err}")))?;

        sqlx::query(
            "INSERT INTO upload_session (token, label, created_at, expires_at,
             remote_dir, used, used_at, reusable, files)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&session.token)
        .bind(&session.label)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .bind(&session.remote_dir)
        .bind(i64::from(session.used))
        .bind(session.used_at.map(|ts| ts.to_rfc3339()))
        .bind(i64::from(session.reusable))
        .bind(&files)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Retrieve a session by token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn get(&self, token: &str) -> Result<UploadSession> {
        self.try_get(token)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no session for token {token}")))
    }

    /// Retrieve a session by token, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn try_get(&self, token: &str) -> Result<Option<UploadSession>> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT * FROM upload_session WHERE token = ?1")
                .bind(token)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// Persist the full current state of a session record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the token no longer exists, or
    /// `AppError::Db` on persistence failure.
    pub async fn update(&self, session: &UploadSession) -> Result<()> {
        let files = serde_json::to_string(&session.files)
            .map_err(|err| AppError::Db(format!("failed to serialize files: {err}")))?;

        let result = sqlx::query(
            "UPDATE upload_session SET label = ?2, created_at = ?3, expires_at = ?4,
             remote_dir = ?5, used = ?6, used_at = ?7, reusable = ?8, files = ?9
             WHERE token = ?1",
        )
        .bind(&session.token)
        .bind(&session.label)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .bind(&session.remote_dir)
        .bind(i64::from(session.used))
        .bind(session.used_at.map(|ts| ts.to_rfc3339()))
        .bind(i64::from(session.reusable))
        .bind(&files)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "no session for token {}",
                session.token
            )));
        }
        Ok(())
    }

    /// Delete a session record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM upload_session WHERE token = ?1")
            .bind(token)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Delete sessions whose expiry predates `cutoff`, returning the
    /// tokens removed so callers can clean up associated scratch space.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn purge_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let cutoff_str = cutoff.to_rfc3339();
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT token FROM upload_session WHERE expires_at < ?1")
                .bind(&cutoff_str)
                .fetch_all(self.db.as_ref())
                .await?;

        sqlx::query("DELETE FROM upload_session WHERE expires_at < ?1")
            .bind(&cutoff_str)
            .execute(self.db.as_ref())
            .await?;

        Ok(rows.into_iter().map(|(token,)| token).collect())
    }
}

/// Whether a database error is a primary-key / unique-index violation.
fn is_unique_violation(err: &AppError) -> bool {
    match err {
        AppError::Db(msg) => {
            let msg = msg.to_ascii_lowercase();
            msg.contains("unique constraint") || msg.contains("primary key constraint")
        }
        _ => false,
    }
}
