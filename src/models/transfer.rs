//! Transfer outcome and chunk acknowledgement types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Whether remote content was confirmed byte-identical to the source.
///
/// `Unverified` covers the case where the push succeeded but the
/// verification readback itself failed; it is distinguishable from both
/// verified success and integrity failure all the way up the stack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    /// Readback checksum matched the local checksum.
    Verified,
    /// Push succeeded but the readback could not be performed.
    Unverified,
}

/// Result of a successful transfer.
///
/// A caller may assume that `integrity == Verified` genuinely means the
/// remote copy is byte-identical to the local source; any other
/// successful outcome carries a warning explaining what was skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TransferOutcome {
    /// Full destination path on the remote backend.
    pub remote_path: String,
    /// Bytes pushed on the final attempt.
    pub bytes_sent: u64,
    /// Number of attempts consumed (1-based).
    pub attempts: u32,
    /// Hex SHA-256 of the local source.
    pub local_checksum: String,
    /// Hex SHA-256 observed on the remote copy, when readback worked.
    pub remote_checksum: Option<String>,
    /// Verification status.
    pub integrity: IntegrityStatus,
    /// Non-fatal warning (late server abort, readback failure).
    pub warning: Option<String>,
}

impl TransferOutcome {
    /// Whether remote content was confirmed byte-identical.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.integrity == IntegrityStatus::Verified
    }
}

/// What the backend observed while pushing file bytes.
///
/// Returned on the success path; abort-without-completion surfaces as
/// `AppError::TransferAborted` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReceipt {
    /// Bytes written to the data channel.
    pub bytes_sent: u64,
    /// Warning attached when the server aborted after the data channel
    /// completed (late control-channel close).
    pub warning: Option<String>,
}

/// Acknowledgement returned for every stored chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChunkAck {
    /// Distinct chunks received so far.
    pub chunks_received: u32,
    /// Chunks the client declared.
    pub total_chunks: u32,
    /// Whether the full index set is present.
    pub complete: bool,
}

/// A file reconstructed from chunks, ready for remote transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFile {
    /// Location of the reassembled file in scratch storage.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Hex SHA-256 computed while streaming chunks in index order.
    pub checksum: String,
    /// Client-declared checksum, when one was provided.
    pub expected_checksum: Option<String>,
    /// Destination path relative to the session's remote directory.
    pub relative_path: String,
    /// Whether `checksum` matched `expected_checksum`. True when the
    /// client declared no checksum; a mismatch is reported, not fatal.
    pub integrity_verified: bool,
}
