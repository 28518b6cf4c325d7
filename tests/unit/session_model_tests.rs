use chrono::{Duration, Utc};

use dropgate::models::session::{SessionState, TransferredFile, UploadSession};

fn session(reusable: bool) -> UploadSession {
    UploadSession::new(
        "acme-q3".into(),
        "ACME Q3".into(),
        "/uploads",
        72,
        reusable,
    )
}

fn file(rel: &str) -> TransferredFile {
    TransferredFile {
        name: rel.rsplit('/').next().unwrap_or(rel).to_owned(),
        relative_path: rel.to_owned(),
        remote_path: format!("/uploads/acme/{rel}"),
        size: 42,
        uploaded_at: Utc::now(),
        retried: false,
    }
}

#[test]
fn new_session_embeds_slug_and_timestamp_in_remote_dir() {
    let session = session(false);
    assert!(session.remote_dir.starts_with("/uploads/acme-q3-"));
    // slug-YYYY-MM-DD_HH-MM
    let folder = session.remote_dir.rsplit('/').next().unwrap();
    assert_eq!(folder.len(), "acme-q3-".len() + 16);
    assert_eq!(session.expires_at - session.created_at, Duration::hours(72));
}

#[test]
fn fresh_session_is_active() {
    let session = session(false);
    let now = Utc::now();
    assert_eq!(session.state(now), SessionState::Active);
    assert!(session.accepts_uploads(now));
}

#[test]
fn expiry_wins_over_used() {
    let mut session = session(false);
    session.mark_used(Utc::now());
    let after_expiry = session.expires_at + Duration::seconds(1);
    assert_eq!(session.state(after_expiry), SessionState::Expired);
    assert!(!session.accepts_uploads(after_expiry));
}

#[test]
fn used_session_rejects_uploads_unless_reusable() {
    let now = Utc::now();

    let mut once = session(false);
    once.mark_used(now);
    assert_eq!(once.state(now), SessionState::Used);
    assert!(!once.accepts_uploads(now));

    let mut reusable = session(true);
    reusable.mark_used(now);
    assert_eq!(reusable.state(now), SessionState::Active);
    assert!(reusable.accepts_uploads(now));
}

#[test]
fn mark_used_records_first_timestamp_only() {
    let mut session = session(true);
    let first = Utc::now();
    session.mark_used(first);
    session.mark_used(first + Duration::hours(1));
    assert_eq!(session.used_at, Some(first));
}

#[test]
fn retried_file_replaces_existing_record_by_path() {
    let mut session = session(false);
    session.record_file(file("docs/report.pdf"));
    session.record_file(file("docs/other.pdf"));

    let mut replacement = file("docs/report.pdf");
    replacement.size = 99;
    session.record_retried_file(replacement);

    assert_eq!(session.files.len(), 2);
    let report = session
        .files
        .iter()
        .find(|f| f.relative_path == "docs/report.pdf")
        .unwrap();
    assert_eq!(report.size, 99);
    assert!(report.retried);
}

#[test]
fn retried_file_appends_when_path_is_new() {
    let mut session = session(false);
    session.record_retried_file(file("late.txt"));
    assert_eq!(session.files.len(), 1);
    assert!(session.files[0].retried);
}
