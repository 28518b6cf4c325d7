//! Chunk reassembly engine.
//!
//! Receives individual byte ranges of a file keyed by
//! (session, upload-id, index), persists them to local scratch storage,
//! and reconstructs the full file once every index in
//! `[0, total_chunks)` has arrived. Chunk files carry a zero-padded
//! index in their name, so the combine step is an ordered scan rather
//! than a shared in-memory index.
//!
//! The assembler is the only writer to scratch storage. Read-modify-
//! write of the received-set is serialized per upload-id through
//! [`KeyedLocks`]; different uploads never contend.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::checksum::{sha256_hex, StreamingChecksum};
use crate::models::chunk::ChunkUploadState;
use crate::models::transfer::{AssembledFile, ChunkAck};
use crate::persistence::chunk_repo::ChunkRepo;
use crate::persistence::db::Database;
use crate::persistence::locks::KeyedLocks;
use crate::{AppError, Result};

/// Declared metadata accompanying the first chunk of an upload.
#[derive(Debug, Clone)]
pub struct ChunkUploadMeta {
    /// Destination path relative to the session's remote directory.
    pub relative_path: String,
    /// Number of chunks the client will send.
    pub total_chunks: u32,
    /// Optional whole-file checksum for post-assembly verification.
    pub expected_checksum: Option<String>,
    /// Optional whole-file size.
    pub expected_size: Option<u64>,
}

/// Owns per-upload scratch state and reassembles completed files.
#[derive(Clone)]
pub struct ChunkAssembler {
    scratch_root: PathBuf,
    repo: ChunkRepo,
    locks: KeyedLocks,
}

impl ChunkAssembler {
    /// Create an assembler rooted at `scratch_root`.
    #[must_use]
    pub fn new(scratch_root: PathBuf, db: Arc<Database>) -> Self {
        Self {
            scratch_root,
            repo: ChunkRepo::new(db),
            locks: KeyedLocks::new(),
        }
    }

    /// Store one chunk and merge its index into the upload state.
    ///
    /// Duplicate delivery of an index is a no-op, not an error. When a
    /// per-chunk checksum is supplied and does not match, the chunk is
    /// rejected without being stored — the client must resend it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChunkMismatch` on checksum mismatch,
    /// `AppError::Validation` on an out-of-range index or a declared
    /// total that contradicts earlier chunks, and `AppError::Io` /
    /// `AppError::Db` on storage failures.
    pub async fn put_chunk(
        &self,
        session_token: &str,
        upload_id: &str,
        index: u32,
        meta: ChunkUploadMeta,
        bytes: &[u8],
        chunk_checksum: Option<&str>,
    ) -> Result<ChunkAck> {
        validate_upload_id(upload_id)?;
        if meta.total_chunks == 0 {
            return Err(AppError::Validation("total_chunks must be at least 1".into()));
        }

        if let Some(expected) = chunk_checksum {
            let actual = sha256_hex(bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(AppError::ChunkMismatch(format!(
                    "chunk {index} checksum {actual} does not match declared {expected}"
                )));
            }
        }

        let key = lock_key(session_token, upload_id);
        let _guard = self.locks.acquire(&key).await;

        let mut state = match self.repo.get(session_token, upload_id).await? {
            Some(existing) => {
                if existing.total_chunks != meta.total_chunks {
                    return Err(AppError::Validation(format!(
                        "declared total {} contradicts earlier total {}",
                        meta.total_chunks, existing.total_chunks
                    )));
                }
                existing
            }
            None => ChunkUploadState::new(
                session_token.to_owned(),
                upload_id.to_owned(),
                meta.relative_path,
                meta.total_chunks,
                meta.expected_checksum,
                meta.expected_size,
            ),
        };

        state.record_chunk(index)?;

        let dir = self.upload_dir(session_token, upload_id);
        tokio::fs::create_dir_all(&dir).await?;
        let chunk_path = dir.join(ChunkUploadState::chunk_file_name(index));
        tokio::fs::write(&chunk_path, bytes).await?;

        self.repo.upsert(&state).await?;

        debug!(
            session = %session_token,
            upload = %upload_id,
            index,
            received = state.received_count(),
            total = state.total_chunks,
            "chunk stored"
        );

        Ok(ChunkAck {
            chunks_received: state.received_count(),
            total_chunks: state.total_chunks,
            complete: state.is_complete(),
        })
    }

    /// Reassemble a completed upload into a single file.
    ///
    /// Streams chunks in strict ascending index order while computing
    /// the whole-file checksum. A checksum mismatch against the
    /// client-declared value is reported, not fatal — the caller decides
    /// whether to discard. Scratch state is released on success and on
    /// unrecoverable failure (a chunk file deleted out of band); an
    /// incomplete upload keeps its scratch so the client can finish.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown upload-id,
    /// `AppError::IncompleteUpload` with accurate counts when chunks are
    /// missing from the received-set, and `AppError::MissingChunk` when
    /// a recorded chunk file is absent at assembly time.
    pub async fn finalize_assembly(
        &self,
        session_token: &str,
        upload_id: &str,
    ) -> Result<AssembledFile> {
        let key = lock_key(session_token, upload_id);
        let _guard = self.locks.acquire(&key).await;

        let state = self
            .repo
            .get(session_token, upload_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no chunk upload with id {upload_id}"))
            })?;

        if !state.is_complete() {
            return Err(AppError::IncompleteUpload {
                received: state.received_count(),
                expected: state.total_chunks,
            });
        }

        let dir = self.upload_dir(session_token, upload_id);
        let output_path = self.assembled_path(session_token, upload_id);
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut output = tokio::fs::File::create(&output_path).await?;
        let mut hasher = StreamingChecksum::new();
        let mut size: u64 = 0;

        for index in 0..state.total_chunks {
            let chunk_path = dir.join(ChunkUploadState::chunk_file_name(index));
            let bytes = match tokio::fs::read(&chunk_path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    // The received-set says this chunk arrived, so it was
                    // deleted out of band; the upload can never complete.
                    drop(output);
                    let _ = tokio::fs::remove_file(&output_path).await;
                    self.release_scratch(session_token, upload_id).await;
                    warn!(
                        session = %session_token,
                        upload = %upload_id,
                        index,
                        "chunk file missing at assembly time"
                    );
                    return Err(AppError::MissingChunk(index));
                }
                Err(err) => return Err(err.into()),
            };
            hasher.update(&bytes);
            size += bytes.len() as u64;
            output.write_all(&bytes).await?;
        }
        output.flush().await?;
        drop(output);

        let checksum = hasher.finish();
        let integrity_verified = state
            .expected_checksum
            .as_deref()
            .is_none_or(|expected| expected.eq_ignore_ascii_case(&checksum));

        if !integrity_verified {
            warn!(
                session = %session_token,
                upload = %upload_id,
                computed = %checksum,
                expected = ?state.expected_checksum,
                "assembled file checksum does not match declared checksum"
            );
        }

        self.release_scratch(session_token, upload_id).await;

        info!(
            session = %session_token,
            upload = %upload_id,
            size,
            integrity_verified,
            "assembly complete"
        );

        Ok(AssembledFile {
            path: output_path,
            size,
            checksum,
            expected_checksum: state.expected_checksum,
            relative_path: state.relative_path,
            integrity_verified,
        })
    }

    /// Explicitly abandon an upload, dropping its scratch state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the state row cannot be deleted.
    pub async fn abandon(&self, session_token: &str, upload_id: &str) -> Result<()> {
        let key = lock_key(session_token, upload_id);
        let _guard = self.locks.acquire(&key).await;
        self.release_scratch(session_token, upload_id).await;
        Ok(())
    }

    /// Remove a leftover assembled file once its transfer finished.
    pub async fn discard_assembled(&self, session_token: &str, upload_id: &str) {
        let path = self.assembled_path(session_token, upload_id);
        if let Err(err) = tokio::fs::remove_file(&path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(?err, path = %path.display(), "failed to remove assembled file");
            }
        }
    }

    fn upload_dir(&self, session_token: &str, upload_id: &str) -> PathBuf {
        self.scratch_root.join(session_token).join(upload_id)
    }

    fn assembled_path(&self, session_token: &str, upload_id: &str) -> PathBuf {
        self.scratch_root
            .join(session_token)
            .join(format!("{upload_id}.assembled"))
    }

    async fn release_scratch(&self, session_token: &str, upload_id: &str) {
        let dir = self.upload_dir(session_token, upload_id);
        if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(?err, dir = %dir.display(), "failed to remove chunk scratch dir");
            }
        }
        if let Err(err) = self.repo.delete(session_token, upload_id).await {
            warn!(?err, session = %session_token, upload = %upload_id,
                "failed to delete chunk state row");
        }
    }
}

fn lock_key(session_token: &str, upload_id: &str) -> String {
    format!("{session_token}/{upload_id}")
}

/// Upload identifiers become scratch directory names, so they are held
/// to the same character set as sanitized path segments.
fn validate_upload_id(upload_id: &str) -> Result<()> {
    let ok = !upload_id.is_empty()
        && upload_id.len() <= 128
        && upload_id != "."
        && upload_id != ".."
        && upload_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "invalid upload id {upload_id:?}"
        )))
    }
}
