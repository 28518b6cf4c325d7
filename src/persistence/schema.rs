//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` — safe to
//! re-run on every server startup. Produces a convergent result.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS upload_session (
    token           TEXT PRIMARY KEY NOT NULL,
    label           TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    expires_at      TEXT NOT NULL,
    remote_dir      TEXT NOT NULL,
    used            INTEGER NOT NULL DEFAULT 0,
    used_at         TEXT,
    reusable        INTEGER NOT NULL DEFAULT 0,
    files           TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS chunk_upload (
    session_token     TEXT NOT NULL,
    upload_id         TEXT NOT NULL,
    relative_path     TEXT NOT NULL,
    total_chunks      INTEGER NOT NULL,
    received          TEXT NOT NULL DEFAULT '[]',
    expected_checksum TEXT,
    expected_size     INTEGER,
    created_at        TEXT NOT NULL,
    PRIMARY KEY (session_token, upload_id)
);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
