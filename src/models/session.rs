//! Upload session model and lifecycle helpers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Observable lifecycle state of a session at a point in time.
///
/// `Expired` is an orthogonal guard evaluated on every access and wins
/// over `Used` for reporting purposes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session accepts uploads.
    Active,
    /// Session was finalized and is not reusable; terminal.
    Used,
    /// Session passed its expiry time.
    Expired,
}

/// One successfully transferred file recorded on a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TransferredFile {
    /// Original client-supplied file name.
    pub name: String,
    /// Sanitized path relative to the session's remote directory.
    pub relative_path: String,
    /// Full path on the remote backend.
    pub remote_path: String,
    /// File size in bytes.
    pub size: u64,
    /// When the transfer completed.
    pub uploaded_at: DateTime<Utc>,
    /// Whether this entry was re-pushed via the manual retry flow.
    #[serde(default)]
    pub retried: bool,
}

/// Upload session persisted once per token.
///
/// `files` is an append-only log: entries are added only after the
/// transfer client reports success, and the manual retry flow is the one
/// path allowed to update an existing entry in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct UploadSession {
    /// Token slug; identity key.
    pub token: String,
    /// Human label the token was derived from.
    pub label: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Instant after which the session rejects uploads.
    pub expires_at: DateTime<Utc>,
    /// Target directory on the remote backend, fixed at creation.
    pub remote_dir: String,
    /// One-way flag set by finalize.
    pub used: bool,
    /// When finalize first marked the session used.
    pub used_at: Option<DateTime<Utc>>,
    /// Whether finalize cycles may repeat (append-only sessions).
    pub reusable: bool,
    /// Successfully transferred files, in completion order.
    pub files: Vec<TransferredFile>,
}

impl UploadSession {
    /// Construct a new active session.
    ///
    /// The remote directory embeds the slug and creation timestamp so
    /// concurrent sessions with the same label can never collide on the
    /// backend.
    #[must_use]
    pub fn new(token: String, label: String, remote_root: &str, ttl_hours: u32, reusable: bool) -> Self {
        let now = Utc::now();
        let folder = format!("{token}-{}", now.format("%Y-%m-%d_%H-%M"));
        let remote_dir = format!("{}/{folder}", remote_root.trim_end_matches('/'));
        Self {
            token,
            label,
            created_at: now,
            expires_at: now + Duration::hours(i64::from(ttl_hours)),
            remote_dir,
            used: false,
            used_at: None,
            reusable,
            files: Vec::new(),
        }
    }

    /// Whether the session has passed its expiry time.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Observable state at `now`.
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.is_expired(now) {
            SessionState::Expired
        } else if self.used && !self.reusable {
            SessionState::Used
        } else {
            SessionState::Active
        }
    }

    /// Whether uploads are currently accepted.
    #[must_use]
    pub fn accepts_uploads(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == SessionState::Active
    }

    /// Append a transferred file record.
    pub fn record_file(&mut self, file: TransferredFile) {
        self.files.push(file);
    }

    /// Update an existing file record after a manual retry, or append a
    /// new one when no entry matches the relative path.
    pub fn record_retried_file(&mut self, mut file: TransferredFile) {
        file.retried = true;
        if let Some(existing) = self
            .files
            .iter_mut()
            .find(|f| f.relative_path == file.relative_path)
        {
            *existing = file;
        } else {
            self.files.push(file);
        }
    }

    /// Mark the session used by finalize. Reusable sessions keep
    /// accepting uploads; the timestamp records the latest checkpoint.
    pub fn mark_used(&mut self, now: DateTime<Utc>) {
        self.used = true;
        if self.used_at.is_none() {
            self.used_at = Some(now);
        }
    }
}
