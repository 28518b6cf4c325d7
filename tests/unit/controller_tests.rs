use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use dropgate::assembler::ChunkUploadMeta;
use dropgate::checksum::sha256_hex;
use dropgate::lifecycle::SessionController;
use dropgate::models::session::{SessionState, UploadSession};
use dropgate::notify::Notifier;
use dropgate::persistence::db::Database;
use dropgate::persistence::{db, session_repo::SessionRepo};
use dropgate::transfer::client::TransferClient;
use dropgate::transfer::RemoteBackend;
use dropgate::{AppError, GlobalConfig};

use super::support::{test_config, CountingNotifier, MockBackend, PushPlan};

struct Harness {
    controller: SessionController,
    backend: Arc<MockBackend>,
    notifier: Arc<CountingNotifier>,
    sessions: SessionRepo,
    config: Arc<GlobalConfig>,
    _data_dir: TempDir,
}

async fn harness() -> Harness {
    harness_with_backend(MockBackend::new()).await
}

async fn harness_with_backend(backend: MockBackend) -> Harness {
    let data_dir = TempDir::new().expect("tempdir");
    let config = Arc::new(test_config(data_dir.path()));
    let pool: Arc<Database> = Arc::new(db::connect_memory().await.expect("db"));
    let backend = Arc::new(backend);
    let notifier = Arc::new(CountingNotifier::default());

    let remote: Arc<dyn RemoteBackend> = backend.clone();
    let notify: Arc<dyn Notifier> = notifier.clone();
    let client = TransferClient::new(remote, config.transfer.clone());
    let controller = SessionController::new(Arc::clone(&config), Arc::clone(&pool), client, notify);

    Harness {
        controller,
        backend,
        notifier,
        sessions: SessionRepo::new(pool),
        config,
        _data_dir: data_dir,
    }
}

#[tokio::test]
async fn create_session_returns_slug_and_link() {
    let h = harness().await;
    let summary = h
        .controller
        .create_session("ACME Corp Q3", false)
        .await
        .expect("create");

    assert_eq!(summary.token, "acme-corp-q3");
    assert_eq!(summary.url, "https://files.example.com/acme-corp-q3");
    assert!(summary.remote_dir.starts_with("/uploads/acme-corp-q3-"));
}

#[tokio::test]
async fn blank_label_is_rejected() {
    let h = harness().await;
    let err = h.controller.create_session("!!!", false).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn duplicate_label_is_rejected_while_live() {
    let h = harness().await;
    h.controller
        .create_session("acme", false)
        .await
        .expect("first");
    let err = h.controller.create_session("acme", false).await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateLabel(_)));
}

#[tokio::test]
async fn upload_delivers_and_records_the_file() {
    let h = harness().await;
    let summary = h
        .controller
        .create_session("acme", false)
        .await
        .expect("create");

    let report = h
        .controller
        .accept_upload("acme", "docs/report.pdf", b"pdf bytes")
        .await
        .expect("upload");

    assert_eq!(report.relative_path, "docs/report.pdf");
    assert_eq!(report.remote_path, format!("{}/docs/report.pdf", summary.remote_dir));
    assert!(report.verified);
    assert_eq!(
        h.backend.stored(&report.remote_path).as_deref(),
        Some(b"pdf bytes".as_slice())
    );

    let status = h.controller.session_status("acme").await.expect("status");
    assert_eq!(status.files.len(), 1);
    assert!(!status.files[0].retried);
}

#[tokio::test]
async fn traversal_paths_are_confined_to_the_session_dir() {
    let h = harness().await;
    let summary = h
        .controller
        .create_session("acme", false)
        .await
        .expect("create");

    let report = h
        .controller
        .accept_upload("acme", "../../etc/passwd.txt", b"x")
        .await
        .expect("upload");

    assert_eq!(report.relative_path, "etc/passwd.txt");
    assert!(report.remote_path.starts_with(&summary.remote_dir));
}

#[tokio::test]
async fn unknown_expired_and_used_sessions_reject_uploads() {
    let h = harness().await;

    let err = h
        .controller
        .accept_upload("ghost", "a.txt", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let mut stale = UploadSession::new("stale".into(), "stale".into(), "/uploads", 72, false);
    stale.expires_at = Utc::now() - Duration::hours(1);
    h.sessions.create(&stale).await.expect("seed stale");
    let err = h
        .controller
        .accept_upload("stale", "a.txt", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Expired(_)));

    h.controller.create_session("done", false).await.expect("create");
    h.controller.finalize("done").await.expect("finalize");
    let err = h
        .controller
        .accept_upload("done", "a.txt", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyUsed(_)));

    // No guard failure ever reached the backend.
    assert_eq!(h.backend.pushes(), 0);
}

#[tokio::test]
async fn oversize_and_disallowed_uploads_are_rejected() {
    let h = harness().await;
    h.controller.create_session("acme", false).await.expect("create");

    let oversize = vec![0u8; usize::try_from(h.config.limits.max_upload_bytes).unwrap() + 1];
    let err = h
        .controller
        .accept_upload("acme", "big.txt", &oversize)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h
        .controller
        .accept_upload("acme", "tool.exe", b"MZ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(h.backend.pushes(), 0);
}

#[tokio::test]
async fn finalize_marks_used_and_resends_on_repeat() {
    let h = harness().await;
    h.controller.create_session("acme", false).await.expect("create");
    h.controller
        .accept_upload("acme", "report.pdf", b"data")
        .await
        .expect("upload");

    let report = h.controller.finalize("acme").await.expect("finalize");
    assert_eq!(report.file_count, 1);
    assert!(report.notified);

    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Upload complete: acme");
    assert!(sent[0].1.contains("report.pdf"));
    assert!(sent[0].1.contains("MB"));
    drop(sent);

    let status = h.controller.session_status("acme").await.expect("status");
    assert_eq!(status.state, SessionState::Used);

    // Finalizing again re-sends the summary for the used session.
    let repeat = h.controller.finalize("acme").await.expect("repeat finalize");
    assert_eq!(repeat.file_count, 1);
    assert!(repeat.notified);
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn finalize_works_on_expired_sessions_and_rejects_unknown_tokens() {
    let h = harness().await;

    let mut stale = UploadSession::new("stale".into(), "stale".into(), "/uploads", 72, false);
    stale.expires_at = Utc::now() - Duration::hours(1);
    h.sessions.create(&stale).await.expect("seed stale");

    let report = h.controller.finalize("stale").await.expect("finalize expired");
    assert_eq!(report.file_count, 0);
    assert!(report.notified);

    let err = h.controller.finalize("ghost").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn finalize_with_no_files_still_notifies() {
    let h = harness().await;
    h.controller.create_session("acme", false).await.expect("create");

    let report = h.controller.finalize("acme").await.expect("finalize");
    assert_eq!(report.file_count, 0);
    assert!(report.notified);
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn notification_failure_does_not_fail_finalize() {
    let h = harness().await;
    h.notifier.fail.store(true, Ordering::SeqCst);
    h.controller.create_session("acme", false).await.expect("create");

    let report = h.controller.finalize("acme").await.expect("finalize");
    assert_eq!(report.file_count, 0);
    assert!(!report.notified);
}

#[tokio::test]
async fn reusable_sessions_survive_finalize() {
    let h = harness().await;
    h.controller.create_session("acme", true).await.expect("create");
    h.controller.finalize("acme").await.expect("first finalize");

    h.controller
        .accept_upload("acme", "late.txt", b"more")
        .await
        .expect("upload after finalize");
    h.controller.finalize("acme").await.expect("second finalize");

    assert_eq!(h.notifier.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn retry_bypasses_used_state_and_flags_the_file() {
    let h = harness().await;
    h.controller.create_session("acme", false).await.expect("create");
    h.controller
        .accept_upload("acme", "report.pdf", b"v1")
        .await
        .expect("upload");
    h.controller.finalize("acme").await.expect("finalize");

    let report = h
        .controller
        .retry_upload("acme", "report.pdf", b"v2")
        .await
        .expect("retry");
    assert!(report.verified);

    let status = h.controller.session_status("acme").await.expect("status");
    assert_eq!(status.files.len(), 1);
    assert!(status.files[0].retried);
    assert_eq!(status.files[0].size, 2);
    assert_eq!(
        h.backend.stored(&report.remote_path).as_deref(),
        Some(b"v2".as_slice())
    );
}

#[tokio::test]
async fn chunked_upload_flows_into_delivery() {
    let h = harness().await;
    let summary = h
        .controller
        .create_session("acme", false)
        .await
        .expect("create");

    let parts: [&[u8]; 3] = [b"first-", b"second-", b"third"];
    let whole: Vec<u8> = parts.concat();
    let file_hash = sha256_hex(&whole);

    for (index, part) in parts.iter().enumerate() {
        h.controller
            .assembler()
            .put_chunk(
                "acme",
                "u1",
                u32::try_from(index).unwrap(),
                ChunkUploadMeta {
                    relative_path: "big.zip".into(),
                    total_chunks: 3,
                    expected_checksum: Some(file_hash.clone()),
                    expected_size: Some(whole.len() as u64),
                },
                part,
                None,
            )
            .await
            .expect("put chunk");
    }

    let report = h
        .controller
        .finalize_chunked_upload("acme", "u1")
        .await
        .expect("assemble and deliver");

    assert_eq!(report.relative_path, "big.zip");
    assert_eq!(report.size, whole.len() as u64);
    assert!(report.verified);
    assert_eq!(
        h.backend.stored(&format!("{}/big.zip", summary.remote_dir)),
        Some(whole)
    );

    let status = h.controller.session_status("acme").await.expect("status");
    assert_eq!(status.files.len(), 1);
}

#[tokio::test]
async fn connectivity_probe_walks_all_steps_under_the_session_dir() {
    let h = harness().await;
    let summary = h
        .controller
        .create_session("ACME Corp", false)
        .await
        .expect("create");

    let report = h
        .controller
        .connectivity_probe("ACME Corp")
        .await
        .expect("probe");

    assert!(report.ok, "probe failed: {:?}", report.steps);
    let names: Vec<&str> = report.steps.iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec!["upload", "download", "content_match", "delete", "remove_dir"]
    );
    assert!(report.steps.iter().all(|s| s.ok));

    // Probe scratch dir was created inside the session's remote dir and
    // removed again.
    let removed = h.backend.removed_dirs.lock().unwrap();
    assert_eq!(removed.len(), 1);
    assert!(removed[0].starts_with(&summary.remote_dir));
    assert!(removed[0].contains("_permtest_"));
}

#[tokio::test]
async fn probe_reports_failing_push() {
    let h = harness_with_backend(MockBackend::with_plans(vec![PushPlan::Fail])).await;
    h.controller.create_session("acme", false).await.expect("create");
    let report = h
        .controller
        .connectivity_probe("acme")
        .await
        .expect("probe runs");

    assert!(!report.ok);
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].name, "upload");
    assert!(!report.steps[0].ok);
    assert!(report.steps[0].error.as_deref().unwrap().contains("scripted"));
}

#[tokio::test]
async fn probe_for_an_unknown_label_is_not_found() {
    let h = harness().await;
    let err = h.controller.connectivity_probe("ghost").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(h.backend.pushes(), 0);
}
