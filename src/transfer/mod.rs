//! Protocol-agnostic remote storage abstraction.
//!
//! The [`RemoteBackend`] trait decouples the transfer client (retry
//! loop, integrity verification, concurrency limiting) from the wire
//! protocol used to reach remote storage (FTP/FTPS or HTTP). All file
//! movement routes through this trait.

pub mod client;
pub mod ftp;
pub mod http;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use crate::models::transfer::PushReceipt;
use crate::Result;

/// Storage-side operations a transfer protocol must provide.
///
/// Implementations open a fresh connection per operation; the client
/// layer owns retries, so a backend call either succeeds, fails with a
/// retryable [`AppError::TransferAborted`](crate::AppError::TransferAborted),
/// or fails permanently with [`AppError::Transfer`](crate::AppError::Transfer).
pub trait RemoteBackend: Send + Sync {
    /// Create `remote_dir` (and missing parents) if it does not exist.
    ///
    /// Idempotent — an already-existing directory is success.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transfer`](crate::AppError::Transfer) if the
    /// directory cannot be created.
    fn ensure_dir(&self, remote_dir: &str)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Upload the file at `local` to `remote_path`, bounded by
    /// `total_timeout` for the whole operation.
    ///
    /// A server-side abort after the full payload was written is not a
    /// failure; the receipt carries a warning instead.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::TransferAborted`](crate::AppError::TransferAborted)
    /// on interruptions worth retrying, or
    /// [`AppError::Transfer`](crate::AppError::Transfer) on permanent failure.
    fn push<'a>(
        &'a self,
        local: &'a Path,
        remote_path: &'a str,
        total_timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<PushReceipt>> + Send + 'a>>;

    /// Download `remote_path` fully into memory, for readback checks.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transfer`](crate::AppError::Transfer) if the
    /// file cannot be fetched.
    fn fetch(&self, remote_path: &str)
        -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>>;

    /// Delete `remote_path`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transfer`](crate::AppError::Transfer) if the
    /// file cannot be deleted.
    fn delete_file(&self, remote_path: &str)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Remove the empty directory `remote_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transfer`](crate::AppError::Transfer) if the
    /// directory cannot be removed.
    fn remove_dir(&self, remote_dir: &str)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
