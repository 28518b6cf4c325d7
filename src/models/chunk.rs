//! Per-file chunk upload state scoped to one upload-id within a session.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Tracking record for one in-progress chunked file upload.
///
/// Created on the first chunk for a given upload-id; `total_chunks` is
/// declared then and immutable afterwards. `received` grows
/// monotonically and deduplicates, so duplicate chunk delivery is a
/// no-op rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChunkUploadState {
    /// Owning session token.
    pub session_token: String,
    /// Client-chosen upload identifier, unique within the session.
    pub upload_id: String,
    /// Destination path relative to the session's remote directory.
    pub relative_path: String,
    /// Number of chunks the client declared on the first chunk.
    pub total_chunks: u32,
    /// Distinct chunk indices received so far.
    pub received: BTreeSet<u32>,
    /// Client-declared whole-file checksum for post-assembly verification.
    pub expected_checksum: Option<String>,
    /// Client-declared whole-file size.
    pub expected_size: Option<u64>,
    /// When the first chunk arrived.
    pub created_at: DateTime<Utc>,
}

impl ChunkUploadState {
    /// Construct state for a fresh upload-id.
    #[must_use]
    pub fn new(
        session_token: String,
        upload_id: String,
        relative_path: String,
        total_chunks: u32,
        expected_checksum: Option<String>,
        expected_size: Option<u64>,
    ) -> Self {
        Self {
            session_token,
            upload_id,
            relative_path,
            total_chunks,
            received: BTreeSet::new(),
            expected_checksum,
            expected_size,
            created_at: Utc::now(),
        }
    }

    /// Record a chunk index idempotently.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the index is outside
    /// `[0, total_chunks)`.
    pub fn record_chunk(&mut self, index: u32) -> Result<()> {
        if index >= self.total_chunks {
            return Err(AppError::Validation(format!(
                "chunk index {index} exceeds declared total {}",
                self.total_chunks
            )));
        }
        self.received.insert(index);
        Ok(())
    }

    /// Number of distinct chunks received.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn received_count(&self) -> u32 {
        self.received.len() as u32
    }

    /// Whether every index in `[0, total_chunks)` has arrived.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.received_count() == self.total_chunks
    }

    /// Scratch file name for a chunk index, zero-padded so natural sort
    /// order equals index order.
    #[must_use]
    pub fn chunk_file_name(index: u32) -> String {
        format!("chunk_{index:06}")
    }
}
