use std::sync::Arc;

use chrono::{Duration, Utc};

use dropgate::models::session::{TransferredFile, UploadSession};
use dropgate::persistence::{db, session_repo::SessionRepo};
use dropgate::AppError;

async fn repo() -> SessionRepo {
    let pool = db::connect_memory().await.expect("in-memory db");
    SessionRepo::new(Arc::new(pool))
}

fn session(token: &str) -> UploadSession {
    UploadSession::new(token.into(), token.to_uppercase(), "/uploads", 72, false)
}

#[tokio::test]
async fn create_and_fetch_roundtrip() {
    let repo = repo().await;
    let session = session("acme");
    repo.create(&session).await.expect("create");

    let fetched = repo.get("acme").await.expect("get");
    assert_eq!(fetched.token, "acme");
    assert_eq!(fetched.label, "ACME");
    assert_eq!(fetched.remote_dir, session.remote_dir);
    assert!(!fetched.used);
    assert!(fetched.files.is_empty());
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let repo = repo().await;
    assert!(matches!(
        repo.get("nope").await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(repo.try_get("nope").await.expect("try_get").is_none());
}

#[tokio::test]
async fn duplicate_live_token_is_rejected() {
    let repo = repo().await;
    repo.create(&session("acme")).await.expect("first create");

    let err = repo.create(&session("acme")).await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateLabel(_)));
}

#[tokio::test]
async fn expired_session_is_replaced_on_create() {
    let repo = repo().await;
    let mut stale = session("acme");
    stale.expires_at = Utc::now() - Duration::hours(1);
    repo.create(&stale).await.expect("create stale");

    let fresh = session("acme");
    repo.create(&fresh).await.expect("replace expired");

    let fetched = repo.get("acme").await.expect("get");
    assert_eq!(fetched.remote_dir, fresh.remote_dir);
    assert!(!fetched.is_expired(Utc::now()));
}

#[tokio::test]
async fn update_persists_files_and_used_state() {
    let repo = repo().await;
    let mut session = session("acme");
    repo.create(&session).await.expect("create");

    session.record_file(TransferredFile {
        name: "report.pdf".into(),
        relative_path: "docs/report.pdf".into(),
        remote_path: format!("{}/docs/report.pdf", session.remote_dir),
        size: 1024,
        uploaded_at: Utc::now(),
        retried: false,
    });
    session.mark_used(Utc::now());
    repo.update(&session).await.expect("update");

    let fetched = repo.get("acme").await.expect("get");
    assert_eq!(fetched.files.len(), 1);
    assert_eq!(fetched.files[0].relative_path, "docs/report.pdf");
    assert!(fetched.used);
    assert!(fetched.used_at.is_some());
}

#[tokio::test]
async fn update_of_missing_session_is_not_found() {
    let repo = repo().await;
    let ghost = session("ghost");
    assert!(matches!(
        repo.update(&ghost).await.unwrap_err(),
        AppError::NotFound(_)
    ));
}

#[tokio::test]
async fn purge_removes_only_sessions_past_cutoff() {
    let repo = repo().await;

    let mut old = session("old");
    old.expires_at = Utc::now() - Duration::days(60);
    repo.create(&old).await.expect("create old");
    repo.create(&session("live")).await.expect("create live");

    let cutoff = Utc::now() - Duration::days(30);
    let purged = repo.purge_expired_before(cutoff).await.expect("purge");

    assert_eq!(purged, vec!["old".to_owned()]);
    assert!(repo.try_get("old").await.expect("try_get").is_none());
    assert!(repo.try_get("live").await.expect("try_get").is_some());
}
