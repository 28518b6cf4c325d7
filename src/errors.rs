//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Bad input: label, path, extension, size, or missing field.
    Validation(String),
    /// Caller is not authorized to perform the requested action.
    Unauthorized(String),
    /// Requested session or upload does not exist.
    NotFound(String),
    /// Session has passed its expiry time.
    Expired(String),
    /// Session has been finalized and is not reusable.
    AlreadyUsed(String),
    /// A non-expired session already exists for the derived slug.
    DuplicateLabel(String),
    /// Chunk content does not match its declared checksum.
    ChunkMismatch(String),
    /// Assembly requested before every chunk arrived.
    IncompleteUpload {
        /// Number of distinct chunk indices received so far.
        received: u32,
        /// Number of chunks the client declared.
        expected: u32,
    },
    /// A chunk recorded as received is missing from scratch storage.
    MissingChunk(u32),
    /// Remote push or readback failed in a non-retryable way.
    Transfer(String),
    /// Remote server aborted the transfer mid-stream; retryable.
    TransferAborted(String),
    /// Readback checksum never matched within the attempt bound.
    IntegrityFailure {
        /// Checksum of the local source file.
        local_checksum: String,
        /// Checksum observed on the remote copy.
        remote_checksum: String,
        /// Size of the local source file in bytes.
        local_size: u64,
        /// Size of the remote copy in bytes.
        remote_size: u64,
    },
    /// Notification sink failure (always swallowed by the controller).
    Notify(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Expired(msg) => write!(f, "expired: {msg}"),
            Self::AlreadyUsed(msg) => write!(f, "already used: {msg}"),
            Self::DuplicateLabel(msg) => write!(f, "duplicate label: {msg}"),
            Self::ChunkMismatch(msg) => write!(f, "chunk mismatch: {msg}"),
            Self::IncompleteUpload { received, expected } => {
                write!(f, "incomplete upload: {received} of {expected} chunks received")
            }
            Self::MissingChunk(index) => write!(f, "missing chunk {index}"),
            Self::Transfer(msg) => write!(f, "transfer: {msg}"),
            Self::TransferAborted(msg) => write!(f, "transfer aborted: {msg}"),
            Self::IntegrityFailure {
                local_checksum,
                remote_checksum,
                local_size,
                remote_size,
            } => write!(
                f,
                "integrity failure: local {local_checksum} ({local_size} bytes) \
                 vs remote {remote_checksum} ({remote_size} bytes)"
            ),
            Self::Notify(msg) => write!(f, "notify: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
