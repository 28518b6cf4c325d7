//! Retention service for time-based data purge.
//!
//! Runs as a background task deleting session records whose expiry is
//! older than `retention_days`, together with abandoned chunk scratch
//! directories, so storage growth stays bounded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::Result;

use super::chunk_repo::ChunkRepo;
use super::db::Database;
use super::session_repo::SessionRepo;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention purge background task.
///
/// The task runs hourly. On each tick it deletes sessions expired for
/// longer than `retention_days` and removes scratch directories for
/// chunk uploads older than the same cutoff.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    scratch_root: PathBuf,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = purge(&db, &scratch_root, retention_days).await {
                        error!(?err, "retention purge failed");
                    }
                }
            }
        }
    })
}

async fn purge(db: &Arc<Database>, scratch_root: &Path, retention_days: u32) -> Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));

    let session_repo = SessionRepo::new(Arc::clone(db));
    let chunk_repo = ChunkRepo::new(Arc::clone(db));

    // Abandoned chunk uploads first, so their scratch space goes with them.
    let stale_uploads = chunk_repo.list_created_before(cutoff).await?;
    for (session_token, upload_id) in &stale_uploads {
        let dir = scratch_root.join(session_token).join(upload_id);
        if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                error!(?err, session = %session_token, upload = %upload_id,
                    "failed to remove stale scratch dir");
            }
        }
        chunk_repo.delete(session_token, upload_id).await?;
    }

    let purged_tokens = session_repo.purge_expired_before(cutoff).await?;
    for token in &purged_tokens {
        let dir = scratch_root.join(token);
        if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                error!(?err, session = %token, "failed to remove session scratch dir");
            }
        }
    }

    info!(
        sessions = purged_tokens.len(),
        uploads = stale_uploads.len(),
        retention_days,
        "retention purge completed"
    );
    Ok(())
}
