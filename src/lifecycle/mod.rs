//! Session lifecycle controller.
//!
//! Ties the pieces together: creates upload sessions, guards every
//! incoming file against session state and limits, hands payloads to
//! the transfer client, records delivered files, and finalizes
//! sessions with a notification summary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assembler::ChunkAssembler;
use crate::config::GlobalConfig;
use crate::models::session::{SessionState, TransferredFile, UploadSession};
use crate::models::transfer::TransferOutcome;
use crate::notify::Notifier;
use crate::persistence::db::Database;
use crate::persistence::session_repo::SessionRepo;
use crate::sanitize::{extension_allowed, sanitize_rel_path, slugify};
use crate::transfer::client::TransferClient;
use crate::{AppError, Result};

/// Response payload for a freshly created session.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    /// Token identifying the session, derived from its label.
    pub token: String,
    /// Public link the uploader receives.
    pub url: String,
    /// Remote directory files will land in.
    pub remote_dir: String,
    /// Expiry timestamp.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Response payload for one delivered file.
#[derive(Debug, Serialize)]
pub struct UploadReport {
    /// Sanitized path relative to the session directory.
    pub relative_path: String,
    /// Full remote path the file landed at.
    pub remote_path: String,
    /// Size in bytes.
    pub size: u64,
    /// Attempts the transfer took.
    pub attempts: u32,
    /// Whether the readback check confirmed the upload.
    pub verified: bool,
    /// Non-fatal condition encountered during delivery, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Response payload for session finalization.
#[derive(Debug, Serialize)]
pub struct FinalizeReport {
    /// Number of files delivered over the session's lifetime.
    pub file_count: usize,
    /// Whether the notification was delivered.
    pub notified: bool,
}

/// Public view of a session's current state.
#[derive(Debug, Serialize)]
pub struct SessionStatus {
    /// Session token.
    pub token: String,
    /// Human-readable label the session was created from.
    pub label: String,
    /// Current state: `active`, `used`, or `expired`.
    pub state: SessionState,
    /// Creation timestamp.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Expiry timestamp.
    pub expires_at: chrono::DateTime<chrono::Utc>,
    /// Files delivered so far.
    pub files: Vec<TransferredFile>,
}

/// One step of the connectivity probe.
#[derive(Debug, Serialize)]
pub struct ProbeStep {
    /// Step name: `upload`, `download`, `content_match`, `delete`, `remove_dir`.
    pub name: &'static str,
    /// Whether the step succeeded.
    pub ok: bool,
    /// Failure detail when the step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a full connectivity probe run.
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    /// Whether every step passed.
    pub ok: bool,
    /// Individual step results, in execution order.
    pub steps: Vec<ProbeStep>,
}

/// Orchestrates sessions from creation through finalization.
#[derive(Clone)]
pub struct SessionController {
    config: Arc<GlobalConfig>,
    sessions: SessionRepo,
    assembler: ChunkAssembler,
    client: TransferClient,
    notifier: Arc<dyn Notifier>,
}

impl SessionController {
    /// Wire up a controller over shared infrastructure.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        db: Arc<Database>,
        client: TransferClient,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let assembler = ChunkAssembler::new(config.scratch_dir(), Arc::clone(&db));
        Self {
            config,
            sessions: SessionRepo::new(db),
            assembler,
            client,
            notifier,
        }
    }

    /// Access the chunk assembler for chunk ingestion.
    #[must_use]
    pub fn assembler(&self) -> &ChunkAssembler {
        &self.assembler
    }

    /// Create a session for `label` and return its upload link.
    ///
    /// The token is the slugified label, so a label can only have one
    /// live session at a time; creating over an expired session
    /// replaces it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a label that slugifies to
    /// nothing, or `AppError::DuplicateLabel` when a live session
    /// already holds the slug.
    pub async fn create_session(&self, label: &str, reusable: bool) -> Result<SessionSummary> {
        let token = slugify(label);
        if token.is_empty() {
            return Err(AppError::Validation(format!(
                "label {label:?} contains no usable characters"
            )));
        }

        let session = UploadSession::new(
            token.clone(),
            label.to_owned(),
            &self.config.remote.root_dir,
            self.config.limits.token_ttl_hours,
            reusable,
        );
        self.sessions.create(&session).await?;

        info!(token = %token, remote_dir = %session.remote_dir, "session created");
        Ok(SessionSummary {
            url: format!("{}/{token}", self.config.base_url.trim_end_matches('/')),
            token,
            remote_dir: session.remote_dir,
            expires_at: session.expires_at,
        })
    }

    /// Current state of a session, for status queries.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown token.
    pub async fn session_status(&self, token: &str) -> Result<SessionStatus> {
        let session = self.sessions.get(token).await?;
        Ok(SessionStatus {
            state: session.state(Utc::now()),
            token: session.token,
            label: session.label,
            created_at: session.created_at,
            expires_at: session.expires_at,
            files: session.files,
        })
    }

    /// Accept a whole-file upload and deliver it to remote storage.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound`, `AppError::Expired`, or
    /// `AppError::AlreadyUsed` per session state, `AppError::Validation`
    /// for oversize payloads, empty paths, or disallowed extensions, and
    /// transfer errors when delivery ultimately fails.
    pub async fn accept_upload(
        &self,
        token: &str,
        raw_rel_path: &str,
        payload: &[u8],
    ) -> Result<UploadReport> {
        let mut session = self.guarded_session(token).await?;
        let staged = self.stage_payload(token, payload).await?;
        let result = self
            .deliver(&mut session, raw_rel_path, &staged, payload.len() as u64, false)
            .await;
        remove_staged(&staged).await;
        result
    }

    /// Re-deliver a file to a session regardless of used/expired state.
    ///
    /// Recovery path for uploads that failed after their session was
    /// consumed; the session must still exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown token, plus the same
    /// payload validation and transfer errors as a regular upload.
    pub async fn retry_upload(
        &self,
        token: &str,
        raw_rel_path: &str,
        payload: &[u8],
    ) -> Result<UploadReport> {
        let mut session = self.sessions.get(token).await?;
        let staged = self.stage_payload(token, payload).await?;
        let result = self
            .deliver(&mut session, raw_rel_path, &staged, payload.len() as u64, true)
            .await;
        remove_staged(&staged).await;
        result
    }

    /// Assemble a completed chunked upload and deliver the result.
    ///
    /// # Errors
    ///
    /// Returns assembly errors (`AppError::IncompleteUpload`,
    /// `AppError::MissingChunk`), session guard errors, and transfer
    /// errors. A declared-checksum mismatch after assembly surfaces as
    /// `AppError::ChunkMismatch` and drops the assembled file.
    pub async fn finalize_chunked_upload(
        &self,
        token: &str,
        upload_id: &str,
    ) -> Result<UploadReport> {
        let mut session = self.guarded_session(token).await?;
        let assembled = self.assembler.finalize_assembly(token, upload_id).await?;

        if !assembled.integrity_verified {
            self.assembler.discard_assembled(token, upload_id).await;
            return Err(AppError::ChunkMismatch(format!(
                "assembled file checksum {} does not match declared {}",
                assembled.checksum,
                assembled.expected_checksum.unwrap_or_default()
            )));
        }

        let result = self
            .deliver(
                &mut session,
                &assembled.relative_path,
                &assembled.path,
                assembled.size,
                false,
            )
            .await;
        self.assembler.discard_assembled(token, upload_id).await;
        result
    }

    /// Mark a session consumed and send the summary notification.
    ///
    /// Repeatable: the used flag is one-way, and every call re-sends
    /// the current summary, including on expired or already-used
    /// sessions. Notification failure never fails finalization; it is
    /// logged and reported through `notified`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown token.
    pub async fn finalize(&self, token: &str) -> Result<FinalizeReport> {
        let mut session = self.sessions.get(token).await?;
        session.mark_used(Utc::now());
        self.sessions.update(&session).await?;

        let subject = format!("Upload complete: {}", session.label);
        let body = finalize_body(&session);
        let notified = match self.notifier.send(&subject, &body).await {
            Ok(()) => true,
            Err(err) => {
                warn!(?err, token = %session.token, "finalize notification failed");
                false
            }
        };

        info!(token = %session.token, files = session.files.len(), "session finalized");
        Ok(FinalizeReport {
            file_count: session.files.len(),
            notified,
        })
    }

    /// Exercise a session's remote directory end to end: upload, read
    /// back, compare, delete, and remove the scratch directory.
    ///
    /// The session is resolved from `label` the same way creation
    /// derives the token; the probe writes beneath that session's
    /// remote directory, so it validates the exact path uploads use.
    /// Steps run in order and stop at the first failure; cleanup steps
    /// are skipped once a prior step failed so their results stay
    /// meaningful.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown label, or
    /// `AppError::Io` if the local probe file cannot be staged. Remote
    /// failures are reported inside the [`ProbeReport`].
    pub async fn connectivity_probe(&self, label: &str) -> Result<ProbeReport> {
        let token = slugify(label);
        let session = self.sessions.get(&token).await?;
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let probe_dir = format!("{}/_permtest_{stamp}", session.remote_dir);
        let remote_path = format!("{probe_dir}/probe.txt");
        let content = format!("connectivity probe {stamp}\n");

        let staged = self.stage_payload(&token, content.as_bytes()).await?;
        let mut steps = Vec::new();

        let upload = match self.client.ensure_dir(&probe_dir).await {
            Ok(()) => self.client.push_once(&staged, &remote_path).await.map(|_| ()),
            Err(err) => Err(err),
        };
        remove_staged(&staged).await;
        let upload_ok = record_step(&mut steps, "upload", upload);

        let mut content_ok = false;
        if upload_ok {
            let fetched = self.client.fetch(&remote_path).await;
            let download_ok = record_step(&mut steps, "download", fetched.as_ref().map(|_| ()).map_err(AppError::clone));
            if download_ok {
                let matches = fetched.as_deref().ok() == Some(content.as_bytes());
                content_ok = record_step(
                    &mut steps,
                    "content_match",
                    if matches {
                        Ok(())
                    } else {
                        Err(AppError::Transfer("downloaded bytes differ".into()))
                    },
                );
            }
        }

        if upload_ok {
            let deleted = self.client.delete_file(&remote_path).await;
            let delete_ok = record_step(&mut steps, "delete", deleted);
            if delete_ok {
                let removed = self.client.remove_dir(&probe_dir).await;
                record_step(&mut steps, "remove_dir", removed);
            }
        }

        let ok = content_ok && steps.iter().all(|step| step.ok);
        Ok(ProbeReport { ok, steps })
    }

    /// Check that a session exists and still accepts uploads.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound`, `AppError::Expired`, or
    /// `AppError::AlreadyUsed` per session state.
    pub async fn ensure_accepts_uploads(&self, token: &str) -> Result<()> {
        self.guarded_session(token).await.map(|_| ())
    }

    /// Load a session and enforce the upload guards in order.
    async fn guarded_session(&self, token: &str) -> Result<UploadSession> {
        let session = self.sessions.get(token).await?;
        match session.state(Utc::now()) {
            SessionState::Expired => Err(AppError::Expired(token.to_owned())),
            SessionState::Used => Err(AppError::AlreadyUsed(token.to_owned())),
            SessionState::Active => Ok(session),
        }
    }

    /// Validate, transfer, and record one file for a session.
    async fn deliver(
        &self,
        session: &mut UploadSession,
        raw_rel_path: &str,
        local: &Path,
        size: u64,
        retried: bool,
    ) -> Result<UploadReport> {
        if size > self.config.limits.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "payload of {size} bytes exceeds limit of {} bytes",
                self.config.limits.max_upload_bytes
            )));
        }

        let relative_path = sanitize_rel_path(raw_rel_path);
        if relative_path.is_empty() {
            return Err(AppError::Validation(format!(
                "path {raw_rel_path:?} sanitizes to nothing"
            )));
        }
        let name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(relative_path.as_str())
            .to_owned();
        if !extension_allowed(&name, &self.config.limits.allowed_extensions) {
            return Err(AppError::Validation(format!(
                "extension of {name:?} is not allowed"
            )));
        }

        let remote_path = format!("{}/{relative_path}", session.remote_dir);
        let remote_parent = remote_path
            .rsplit_once('/')
            .map_or(session.remote_dir.clone(), |(parent, _)| parent.to_owned());
        self.client.ensure_dir(&remote_parent).await?;

        let outcome = self.client.transfer(local, &remote_path).await?;

        let file = TransferredFile {
            name,
            relative_path: relative_path.clone(),
            remote_path: outcome.remote_path.clone(),
            size,
            uploaded_at: Utc::now(),
            retried,
        };
        if retried {
            session.record_retried_file(file);
        } else {
            session.record_file(file);
        }
        self.sessions.update(session).await?;

        Ok(upload_report(relative_path, size, outcome))
    }

    /// Write an incoming payload to session scratch space.
    async fn stage_payload(&self, token: &str, payload: &[u8]) -> Result<PathBuf> {
        let dir = self.config.scratch_dir().join(token);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("stage-{}", Uuid::new_v4()));
        tokio::fs::write(&path, payload).await?;
        Ok(path)
    }
}

fn upload_report(relative_path: String, size: u64, outcome: TransferOutcome) -> UploadReport {
    UploadReport {
        relative_path,
        size,
        attempts: outcome.attempts,
        verified: outcome.is_verified(),
        remote_path: outcome.remote_path,
        warning: outcome.warning,
    }
}

fn record_step(steps: &mut Vec<ProbeStep>, name: &'static str, result: Result<()>) -> bool {
    let ok = result.is_ok();
    steps.push(ProbeStep {
        name,
        ok,
        error: result.err().map(|err| err.to_string()),
    });
    ok
}

async fn remove_staged(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(?err, path = %path.display(), "failed to remove staged payload");
        }
    }
}

/// Notification body listing delivered files with sizes in megabytes.
fn finalize_body(session: &UploadSession) -> String {
    let mut body = format!(
        "Upload session \"{}\" was finalized with {} file(s).\n\nFiles:\n",
        session.label,
        session.files.len()
    );
    for file in &session.files {
        body.push_str(&format!(
            "- {} ({})\n",
            file.relative_path,
            format_megabytes(file.size)
        ));
    }
    body.push_str(&format!("\nRemote directory: {}\n", session.remote_dir));
    body
}

#[allow(clippy::cast_precision_loss)]
fn format_megabytes(size: u64) -> String {
    format!("{:.2} MB", size as f64 / 1_048_576.0)
}
