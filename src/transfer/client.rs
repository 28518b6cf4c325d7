//! Verified, retrying transfer client.
//!
//! Wraps a [`RemoteBackend`] with the delivery policy: bounded retries
//! with exponential backoff on server aborts, a size-derived total
//! timeout, readback integrity verification, and a global cap on
//! concurrent transfers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::checksum::{sha256_file, sha256_hex};
use crate::config::TransferConfig;
use crate::models::transfer::{IntegrityStatus, PushReceipt, TransferOutcome};
use crate::transfer::RemoteBackend;
use crate::{AppError, Result};

/// Delivery engine in front of a single remote backend.
#[derive(Clone)]
pub struct TransferClient {
    backend: Arc<dyn RemoteBackend>,
    config: TransferConfig,
    permits: Arc<Semaphore>,
}

impl TransferClient {
    /// Create a client over `backend` with the given transfer policy.
    #[must_use]
    pub fn new(backend: Arc<dyn RemoteBackend>, config: TransferConfig) -> Self {
        let slots = usize::try_from(config.max_concurrent).unwrap_or(1).max(1);
        let permits = Arc::new(Semaphore::new(slots));
        Self {
            backend,
            config,
            permits,
        }
    }

    /// Deliver a local file to `remote_path` and verify it landed intact.
    ///
    /// Each attempt pushes the file, reads it back, and compares size
    /// and checksum. A server abort or a readback mismatch triggers a
    /// retry after a doubling backoff (1 s, then 2 s, ...), up to
    /// `max_attempts` in total.
    /// A push that completes but cannot be read back is accepted with
    /// [`IntegrityStatus::Unverified`] and a warning.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TransferAborted` when every attempt was cut
    /// short, `AppError::IntegrityFailure` when the final readback still
    /// mismatches, or `AppError::Transfer` on a permanent protocol
    /// failure (not retried).
    pub async fn transfer(&self, local: &Path, remote_path: &str) -> Result<TransferOutcome> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::Transfer("transfer pool closed".into()))?;

        let local_size = tokio::fs::metadata(local).await?.len();
        let local_checksum = sha256_file(local).await?;
        let total_timeout = self.total_timeout(local_size);

        let mut last_err = AppError::TransferAborted("no attempts made".into());
        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                warn!(remote = %remote_path, attempt, delay_s = delay.as_secs(), "retrying transfer");
                tokio::time::sleep(delay).await;
            }

            let receipt = match self.backend.push(local, remote_path, total_timeout).await {
                Ok(receipt) => receipt,
                Err(err @ AppError::TransferAborted(_)) => {
                    last_err = err;
                    continue;
                }
                Err(err) => return Err(err),
            };

            match self
                .verify(remote_path, &local_checksum, local_size, receipt, attempt)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    // Leave nothing half-written behind before retrying.
                    if let Err(cleanup_err) = self.backend.delete_file(remote_path).await {
                        warn!(?cleanup_err, remote = %remote_path,
                            "failed to remove mismatched upload");
                    }
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }

    /// Read the uploaded file back and compare against the local source.
    async fn verify(
        &self,
        remote_path: &str,
        local_checksum: &str,
        local_size: u64,
        receipt: PushReceipt,
        attempt: u32,
    ) -> Result<TransferOutcome> {
        let remote_bytes = match self.backend.fetch(remote_path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(?err, remote = %remote_path, "readback failed; accepting unverified");
                return Ok(TransferOutcome {
                    remote_path: remote_path.to_owned(),
                    bytes_sent: receipt.bytes_sent,
                    attempts: attempt + 1,
                    local_checksum: local_checksum.to_owned(),
                    remote_checksum: None,
                    integrity: IntegrityStatus::Unverified,
                    warning: Some(merge_warnings(
                        receipt.warning,
                        format!("readback failed: {err}"),
                    )),
                });
            }
        };

        let remote_size = remote_bytes.len() as u64;
        let remote_checksum = sha256_hex(&remote_bytes);
        if remote_size == local_size && remote_checksum.eq_ignore_ascii_case(local_checksum) {
            info!(remote = %remote_path, bytes = receipt.bytes_sent, attempts = attempt + 1,
                "transfer verified");
            return Ok(TransferOutcome {
                remote_path: remote_path.to_owned(),
                bytes_sent: receipt.bytes_sent,
                attempts: attempt + 1,
                local_checksum: local_checksum.to_owned(),
                remote_checksum: Some(remote_checksum),
                integrity: IntegrityStatus::Verified,
                warning: receipt.warning,
            });
        }

        Err(AppError::IntegrityFailure {
            local_checksum: local_checksum.to_owned(),
            remote_checksum,
            local_size,
            remote_size,
        })
    }

    /// Whole-operation timeout scaled to the payload size.
    fn total_timeout(&self, size: u64) -> Duration {
        let throughput_floor = size / self.config.min_throughput_bytes_per_sec.max(1);
        Duration::from_secs(throughput_floor.max(self.config.min_total_timeout_seconds))
    }

    /// Create the remote directory tree for a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transfer` if the directory cannot be created.
    pub async fn ensure_dir(&self, remote_dir: &str) -> Result<()> {
        self.backend.ensure_dir(remote_dir).await
    }

    /// Push a file once, without retries or readback.
    ///
    /// Probe traffic uses this so each probe step maps to exactly one
    /// protocol operation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transfer` or `AppError::TransferAborted` if
    /// the upload fails.
    pub async fn push_once(&self, local: &Path, remote_path: &str) -> Result<PushReceipt> {
        let size = tokio::fs::metadata(local).await?.len();
        self.backend
            .push(local, remote_path, self.total_timeout(size))
            .await
    }

    /// Download a remote file, for probes and spot checks.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transfer` if the file cannot be fetched.
    pub async fn fetch(&self, remote_path: &str) -> Result<Vec<u8>> {
        self.backend.fetch(remote_path).await
    }

    /// Delete a remote file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transfer` if the file cannot be deleted.
    pub async fn delete_file(&self, remote_path: &str) -> Result<()> {
        self.backend.delete_file(remote_path).await
    }

    /// Remove an empty remote directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transfer` if the directory cannot be removed.
    pub async fn remove_dir(&self, remote_dir: &str) -> Result<()> {
        self.backend.remove_dir(remote_dir).await
    }
}

fn merge_warnings(existing: Option<String>, new: String) -> String {
    match existing {
        Some(prior) => format!("{prior}; {new}"),
        None => new,
    }
}
